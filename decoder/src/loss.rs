//! Objectives and read-outs computed from a finished loop state.
//!
//! Cross entropies are time-major `[time, batch]` with one column per
//! executed step; positions past the end of a sequence contribute zero.

use burn::tensor::{activation::log_softmax, backend::Backend, Int, Tensor};

use crate::error::Result;
use crate::state::{time_major_rows, LoopState};
use crate::vocabulary::PAD_TOKEN_INDEX;

/// Per-position cross entropy of a teacher-forced run against its targets,
/// optionally label smoothed. Multiplied by the output mask.
pub fn train_xents<B: Backend, F, H>(state: &LoopState<B, F, H>, label_smoothing: f64) -> Tensor<B, 2> {
    let logits = state.logits();
    let [time, batch, _] = logits.dims();
    let targets = aligned_targets(state.constants.train_inputs.clone(), time, batch, &state.device());
    let weights = state.output_mask().float();

    sequence_xents(logits, targets, weights, label_smoothing)
}

/// Sum of the cross entropies over the number of valid positions.
pub fn train_loss<B: Backend, F, H>(state: &LoopState<B, F, H>, label_smoothing: f64) -> Tensor<B, 1> {
    let xents = train_xents(state, label_smoothing);
    xents.sum() / state.output_mask().float().sum()
}

/// `[time, batch, vocabulary]` log-probabilities of the recorded logits.
pub fn logprobs<B: Backend, F, H>(state: &LoopState<B, F, H>) -> Tensor<B, 3> {
    log_softmax(state.logits(), 2)
}

/// Cross entropy of a free-running output against reference targets.
///
/// Both sides are cropped to the shorter length; pad targets are ignored.
/// No label smoothing is applied.
pub fn runtime_xents<B: Backend, F, H>(
    state: &LoopState<B, F, H>,
    targets: Tensor<B, 2, Int>,
) -> Tensor<B, 2> {
    let logits = state.logits();
    let [time, batch, vocabulary] = logits.dims();
    let length = time.min(targets.dims()[0]);

    let logits = logits.slice([0..length, 0..batch, 0..vocabulary]);
    let targets = targets.slice([0..length, 0..batch]);
    let weights = targets.clone().equal_elem(PAD_TOKEN_INDEX as i64).bool_not().float();

    sequence_xents(logits, targets, weights, 0.0)
}

/// Cropped runtime cross entropy over the number of valid output positions.
pub fn runtime_loss<B: Backend, F, H>(
    state: &LoopState<B, F, H>,
    targets: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    runtime_xents(state, targets).sum() / state.output_mask().float().sum()
}

/// `[time, batch]` best scoring symbols, never the pad symbol.
pub fn decoded<B: Backend, F, H>(state: &LoopState<B, F, H>) -> Tensor<B, 2, Int> {
    let logits = state.logits();
    let [time, batch, vocabulary] = logits.dims();
    if time == 0 || vocabulary <= 1 {
        return Tensor::zeros([time, batch], &state.device());
    }

    logits
        .slice([0..time, 0..batch, 1..vocabulary])
        .argmax(2)
        .reshape([time, batch])
        .add_scalar(1)
}

/// [`decoded`] read back as one row per sequence.
pub fn decoded_batch_major<B: Backend, F, H>(state: &LoopState<B, F, H>) -> Result<Vec<Vec<usize>>> {
    let decoded = decoded(state);
    let [time, batch] = decoded.dims();
    let rows = time_major_rows(
        (0..time).map(|t| decoded.clone().slice([t..t + 1, 0..batch]).reshape([batch])),
    )?;

    Ok((0..batch)
        .map(|b| rows.iter().map(|row| row[b] as usize).collect())
        .collect())
}

/// Time-major targets with exactly `time` rows: cropped when longer,
/// padded when shorter or missing.
fn aligned_targets<B: Backend>(
    train_inputs: Option<Tensor<B, 2, Int>>,
    time: usize,
    batch: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let Some(inputs) = train_inputs else {
        return Tensor::zeros([time, batch], device);
    };

    let width = inputs.dims()[0];
    if width >= time {
        return inputs.slice([0..time, 0..batch]);
    }
    Tensor::cat(vec![inputs, Tensor::zeros([time - width, batch], device)], 0)
}

fn sequence_xents<B: Backend>(
    logits: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    weights: Tensor<B, 2>,
    label_smoothing: f64,
) -> Tensor<B, 2> {
    let [time, batch, _] = logits.dims();
    if time == 0 {
        return Tensor::zeros([0, batch], &logits.device());
    }

    let log_probs = log_softmax(logits, 2);
    let nll = log_probs
        .clone()
        .gather(2, targets.reshape([time, batch, 1]))
        .reshape([time, batch])
        .neg();

    let xents = if label_smoothing > 0.0 {
        let uniform = log_probs.mean_dim(2).reshape([time, batch]).neg();
        nll.mul_scalar(1.0 - label_smoothing) + uniform.mul_scalar(label_smoothing)
    } else {
        nll
    };

    xents * weights
}
