use burn::tensor::{backend::Backend, Bool, Distribution, Int, Tensor};

use crate::state::{DecoderConstants, LoopState};
use crate::vocabulary::PAD_TOKEN_INDEX;

/// How the next input symbol is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingMode {
    /// Feed the reference symbol of the current step.
    TeacherForced,
    /// Feed the highest scoring symbol.
    Greedy,
    /// Feed a symbol drawn from the output distribution.
    Sampled,
}

impl DecodingMode {
    /// # Panics
    ///
    /// When both `train_mode` and `sample` are set; teacher forcing ignores
    /// the scores, so there is nothing to sample from.
    pub fn from_flags(train_mode: bool, sample: bool) -> Self {
        assert!(
            !(train_mode && sample),
            "sampling cannot be combined with teacher forcing"
        );
        match (train_mode, sample) {
            (true, _) => DecodingMode::TeacherForced,
            (false, true) => DecodingMode::Sampled,
            (false, false) => DecodingMode::Greedy,
        }
    }

    pub fn is_training(self) -> bool {
        self == DecodingMode::TeacherForced
    }
}

/// Choose the next `[batch]` symbols from `[batch, vocabulary]` logits.
///
/// Rows of sequences that are already finished always get the pad symbol.
pub fn logits_to_symbols<B: Backend, F, H>(
    logits: Tensor<B, 2>,
    state: &LoopState<B, F, H>,
    mode: DecodingMode,
) -> Tensor<B, 1, Int> {
    let [batch, _] = logits.dims();
    let next_symbols = match mode {
        DecodingMode::TeacherForced => {
            teacher_symbols(&state.constants, state.feedables.step, batch, &logits.device())
        }
        DecodingMode::Greedy => logits.argmax(1).reshape([batch]),
        DecodingMode::Sampled => sample_symbols(logits),
    };

    force_padding(next_symbols, state.feedables.finished.clone())
}

/// Reference symbols for `step`; padding past the end of the targets.
pub fn teacher_symbols<B: Backend>(
    constants: &DecoderConstants<B>,
    step: usize,
    batch: usize,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    match &constants.train_inputs {
        Some(inputs) if step < inputs.dims()[0] => {
            inputs.clone().slice([step..step + 1, 0..batch]).reshape([batch])
        }
        _ => Tensor::zeros([batch], device),
    }
}

/// One categorical draw per row, using the Gumbel-max trick so the whole
/// batch is sampled with tensor operations.
pub fn sample_symbols<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [batch, vocabulary_size] = logits.dims();
    let uniform = Tensor::<B, 2>::random(
        [batch, vocabulary_size],
        Distribution::Uniform(1e-7, 0.999_999),
        &logits.device(),
    );
    let gumbel = uniform.log().neg().log().neg();
    (logits + gumbel).argmax(1).reshape([batch])
}

/// Replace symbols of finished sequences with the pad symbol.
pub fn force_padding<B: Backend>(
    symbols: Tensor<B, 1, Int>,
    finished: Tensor<B, 1, Bool>,
) -> Tensor<B, 1, Int> {
    symbols.mask_fill(finished, PAD_TOKEN_INDEX as i64)
}
