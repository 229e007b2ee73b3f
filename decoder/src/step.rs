use burn::tensor::{backend::Backend, Tensor};

use crate::selection::DecodingMode;
use crate::state::LoopState;

/// Precomputed encoder outputs a step function may attend over.
///
/// States are `[batch, time, dim]`, masks are `[batch, time]` with ones at
/// valid positions. Nothing in the decoder mutates them.
#[derive(Debug, Clone)]
pub struct EncoderContext<B: Backend> {
    pub states: Vec<Tensor<B, 3>>,
    pub masks: Vec<Tensor<B, 2>>,
}

impl<B: Backend> Default for EncoderContext<B> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<B: Backend> EncoderContext<B> {
    pub fn empty() -> Self {
        Self {
            states: Vec::new(),
            masks: Vec::new(),
        }
    }

    pub fn new(states: Vec<Tensor<B, 3>>, masks: Vec<Tensor<B, 2>>) -> Self {
        debug_assert_eq!(states.len(), masks.len());
        Self { states, masks }
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Masked mean over the time axis of the first encoder, `[batch, dim]`.
    pub fn pooled(&self) -> Option<Tensor<B, 2>> {
        let states = self.states.first()?;
        let mask = self.masks.first()?;
        let [batch, time, dim] = states.dims();

        let weights = mask.clone().reshape([batch, time, 1]);
        let summed = (states.clone() * weights.clone()).sum_dim(1).reshape([batch, dim]);
        let counts = weights.sum_dim(1).reshape([batch, 1]).clamp_min(1.0);
        Some(summed / counts)
    }
}

/// What a step function hands back to the loop.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend, F, H> {
    /// `[batch, output_dimension]`
    pub output_state: Tensor<B, 2>,
    /// Stored in the next feedables' `other` slot.
    pub feedable_ext: F,
    /// Stored in the histories' `other` slot.
    pub history_ext: H,
}

/// Architecture-specific part of an autoregressive decoder.
///
/// Implementations compute the next hidden state from the loop state alone,
/// so re-running a step on the same state gives the same result.
pub trait StepFunction<B: Backend> {
    type FeedableExt: Clone;
    type HistoryExt;

    /// Width of the produced hidden state.
    fn output_dimension(&self) -> usize;

    fn initial_feedable_ext(
        &self,
        batch_size: usize,
        encoder: &EncoderContext<B>,
        device: &B::Device,
    ) -> Self::FeedableExt;

    fn initial_history_ext(&self, batch_size: usize, device: &B::Device) -> Self::HistoryExt;

    fn next_state(
        &self,
        state: &LoopState<B, Self::FeedableExt, Self::HistoryExt>,
        encoder: &EncoderContext<B>,
    ) -> StepOutput<B, Self::FeedableExt, Self::HistoryExt>;

    /// Post-process the terminal loop state.
    fn finalize(
        &self,
        state: LoopState<B, Self::FeedableExt, Self::HistoryExt>,
        _mode: DecodingMode,
    ) -> LoopState<B, Self::FeedableExt, Self::HistoryExt> {
        state
    }
}
