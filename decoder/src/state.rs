//! The value threaded through the decoding loop.
//!
//! A [`LoopState`] has three disjoint parts: constants fixed before the loop
//! starts, feedables that hold the input of a single step (batch-major) and
//! histories that grow by one time slice per step (time-major).

use burn::tensor::{backend::Backend, Bool, ElementConversion, Int, Tensor, TensorData};

use crate::error::{DecoderError, Result};
use crate::vocabulary::PAD_TOKEN_INDEX;

/// Tensors that do not change during the entire decoder run.
#[derive(Debug, Clone)]
pub struct DecoderConstants<B: Backend> {
    /// Target token ids, time-major `[time, batch]`. Present whenever
    /// reference sentences were fed.
    pub train_inputs: Option<Tensor<B, 2, Int>>,
}

impl<B: Backend> DecoderConstants<B> {
    pub fn new(train_inputs: Option<Tensor<B, 2, Int>>) -> Self {
        Self { train_inputs }
    }

    /// Width of the target matrix along the time axis.
    pub fn target_len(&self) -> usize {
        self.train_inputs
            .as_ref()
            .map(|inputs| inputs.dims()[0])
            .unwrap_or(0)
    }
}

/// The input of a single decoder step, batch-major.
#[derive(Debug, Clone)]
pub struct DecoderFeedables<B: Backend, F> {
    pub step: usize,
    /// `[batch]`, whether the end symbol has already been produced.
    pub finished: Tensor<B, 1, Bool>,
    /// `[batch, embedding]`, the embedded previous symbol (or the start
    /// symbol at step 0).
    pub embedded_input: Tensor<B, 2>,
    pub other: F,
}

impl<B: Backend, F> DecoderFeedables<B, F> {
    pub fn initial(batch_size: usize, embedded_start: Tensor<B, 2>, other: F) -> Self {
        let device = embedded_start.device();
        Self {
            step: 0,
            finished: Tensor::<B, 1, Int>::zeros([batch_size], &device).bool(),
            embedded_input: embedded_start,
            other,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.finished.dims()[0]
    }

    /// Number of sequences that have produced the end symbol.
    pub fn finished_count(&self) -> usize {
        self.finished
            .clone()
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize
    }

    pub fn all_finished(&self) -> bool {
        self.finished_count() == self.batch_size()
    }
}

/// Everything produced so far, one entry per executed step.
///
/// Slices are kept in a `Vec` and stacked on demand, which keeps appending
/// cheap and never rewrites past steps.
#[derive(Debug, Clone)]
pub struct DecoderHistories<B: Backend, H> {
    /// `[batch, vocabulary]` unnormalized scores per step.
    pub logits: Vec<Tensor<B, 2>>,
    /// `[batch, hidden]` decoder states before the output projection.
    pub output_states: Vec<Tensor<B, 2>>,
    /// `[batch]` emitted symbols per step.
    pub output_symbols: Vec<Tensor<B, 1, Int>>,
    /// `[batch]` valid positions per step.
    pub output_mask: Vec<Tensor<B, 1, Bool>>,
    pub other: H,
    batch_size: usize,
    vocabulary_size: usize,
    state_size: usize,
}

impl<B: Backend, H> DecoderHistories<B, H> {
    pub fn empty(batch_size: usize, vocabulary_size: usize, state_size: usize, other: H) -> Self {
        Self {
            logits: Vec::new(),
            output_states: Vec::new(),
            output_symbols: Vec::new(),
            output_mask: Vec::new(),
            other,
            batch_size,
            vocabulary_size,
            state_size,
        }
    }

    /// Record one decoder step.
    pub fn append(
        &mut self,
        logits: Tensor<B, 2>,
        output_state: Tensor<B, 2>,
        symbols: Tensor<B, 1, Int>,
        mask: Tensor<B, 1, Bool>,
        other: H,
    ) {
        debug_assert_eq!(logits.dims(), [self.batch_size, self.vocabulary_size]);
        debug_assert_eq!(output_state.dims(), [self.batch_size, self.state_size]);
        debug_assert_eq!(symbols.dims(), [self.batch_size]);
        debug_assert_eq!(mask.dims(), [self.batch_size]);

        self.logits.push(logits);
        self.output_states.push(output_state);
        self.output_symbols.push(symbols);
        self.output_mask.push(mask);
        self.other = other;
    }

    pub fn len(&self) -> usize {
        self.output_symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.output_symbols.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }
}

/// Full snapshot of decoder progress.
#[derive(Debug, Clone)]
pub struct LoopState<B: Backend, F, H> {
    pub histories: DecoderHistories<B, H>,
    pub constants: DecoderConstants<B>,
    pub feedables: DecoderFeedables<B, F>,
}

impl<B: Backend, F, H> LoopState<B, F, H> {
    /// Number of executed steps.
    pub fn steps(&self) -> usize {
        self.histories.len()
    }

    pub fn batch_size(&self) -> usize {
        self.histories.batch_size()
    }

    pub fn device(&self) -> B::Device {
        self.feedables.finished.device()
    }

    /// `[time, batch, vocabulary]`
    pub fn logits(&self) -> Tensor<B, 3> {
        if self.histories.logits.is_empty() {
            return Tensor::zeros(
                [0, self.batch_size(), self.histories.vocabulary_size],
                &self.device(),
            );
        }
        Tensor::stack(self.histories.logits.clone(), 0)
    }

    /// `[time, batch, hidden]`
    pub fn output_states(&self) -> Tensor<B, 3> {
        if self.histories.output_states.is_empty() {
            return Tensor::zeros(
                [0, self.batch_size(), self.histories.state_size],
                &self.device(),
            );
        }
        Tensor::stack(self.histories.output_states.clone(), 0)
    }

    /// `[time, batch]`
    pub fn output_symbols(&self) -> Tensor<B, 2, Int> {
        if self.histories.output_symbols.is_empty() {
            return Tensor::zeros([0, self.batch_size()], &self.device());
        }
        Tensor::stack(self.histories.output_symbols.clone(), 0)
    }

    /// `[time, batch]`
    pub fn output_mask(&self) -> Tensor<B, 2, Bool> {
        if self.histories.output_mask.is_empty() {
            return Tensor::<B, 2, Int>::zeros([0, self.batch_size()], &self.device()).bool();
        }
        Tensor::stack(self.histories.output_mask.clone(), 0)
    }

    /// Emitted symbols per sequence, padded with the pad id up to `width`
    /// steps. Steps the loop never ran (because every sequence had already
    /// finished) read as padding.
    pub fn symbols_batch_major(&self, width: usize) -> Result<Vec<Vec<usize>>> {
        let rows = time_major_rows(self.histories.output_symbols.iter().cloned())?;
        Ok(transpose_padded(&rows, self.batch_size(), width, PAD_TOKEN_INDEX as i64))
    }

    /// Output mask per sequence as 0/1, padded with zeros up to `width`.
    pub fn mask_batch_major(&self, width: usize) -> Result<Vec<Vec<usize>>> {
        let rows = time_major_rows(self.histories.output_mask.iter().map(|m| m.clone().int()))?;
        Ok(transpose_padded(&rows, self.batch_size(), width, 0))
    }
}

/// Read each `[batch]` slice back to host memory.
pub(crate) fn time_major_rows<B: Backend>(
    slices: impl Iterator<Item = Tensor<B, 1, Int>>,
) -> Result<Vec<Vec<i64>>> {
    slices.map(|slice| int_data_to_vec(slice.into_data())).collect()
}

pub(crate) fn int_data_to_vec(data: TensorData) -> Result<Vec<i64>> {
    data.convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| DecoderError::Data(format!("{err:?}")))
}

fn transpose_padded(rows: &[Vec<i64>], batch_size: usize, width: usize, fill: i64) -> Vec<Vec<usize>> {
    (0..batch_size)
        .map(|b| {
            (0..width)
                .map(|t| rows.get(t).map_or(fill, |row| row[b]) as usize)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{int_matrix, TestBackend};

    fn empty_state(batch: usize) -> LoopState<TestBackend, (), ()> {
        let device = Default::default();
        let start = Tensor::<TestBackend, 2>::zeros([batch, 4], &device);
        LoopState {
            histories: DecoderHistories::empty(batch, 5, 3, ()),
            constants: DecoderConstants::new(None),
            feedables: DecoderFeedables::initial(batch, start, ()),
        }
    }

    #[test]
    fn initial_state_is_empty() {
        let state = empty_state(2);
        assert_eq!(state.steps(), 0);
        assert_eq!(state.feedables.step, 0);
        assert_eq!(state.feedables.finished_count(), 0);
        assert!(!state.feedables.all_finished());
        assert_eq!(state.logits().dims(), [0, 2, 5]);
        assert_eq!(state.output_states().dims(), [0, 2, 3]);
        assert_eq!(state.output_symbols().dims(), [0, 2]);
        assert_eq!(state.output_mask().dims(), [0, 2]);
        assert_eq!(state.constants.target_len(), 0);
    }

    #[test]
    fn append_grows_every_history() {
        let device = Default::default();
        let mut state = empty_state(2);
        for _ in 0..3 {
            state.histories.append(
                Tensor::zeros([2, 5], &device),
                Tensor::zeros([2, 3], &device),
                Tensor::from_data(TensorData::new(vec![4i64, 2], [2]), &device),
                Tensor::<TestBackend, 1, Int>::ones([2], &device).bool(),
                (),
            );
        }
        assert_eq!(state.steps(), 3);
        assert_eq!(state.logits().dims(), [3, 2, 5]);
        assert_eq!(state.output_states().dims(), [3, 2, 3]);
        assert_eq!(state.output_symbols().dims(), [3, 2]);
    }

    #[test]
    fn batch_major_views_pad_missing_steps() {
        let device = Default::default();
        let mut state = empty_state(2);
        let symbols = int_matrix(&[vec![3, 3], vec![2, 4]], &device);
        for t in 0..2 {
            state.histories.append(
                Tensor::zeros([2, 5], &device),
                Tensor::zeros([2, 3], &device),
                symbols.clone().slice([t..t + 1, 0..2]).reshape([2]),
                Tensor::<TestBackend, 1, Int>::ones([2], &device).bool(),
                (),
            );
        }
        assert_eq!(
            state.symbols_batch_major(4).unwrap(),
            vec![vec![3, 2, 0, 0], vec![3, 4, 0, 0]]
        );
        assert_eq!(
            state.mask_batch_major(4).unwrap(),
            vec![vec![1, 1, 0, 0], vec![1, 1, 0, 0]]
        );
    }
}
