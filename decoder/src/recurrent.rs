use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{activation::tanh, backend::Backend, Tensor};

use crate::state::LoopState;
use crate::step::{EncoderContext, StepFunction, StepOutput};

#[derive(Config, Debug)]
pub struct RecurrentStepConfig {
    /// Width of the embedded input symbol.
    pub input_size: usize,
    pub hidden_size: usize,
    /// Width of the pooled encoder state appended to the input, 0 to ignore
    /// the encoder.
    #[config(default = 0)]
    pub context_size: usize,
}

impl RecurrentStepConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RecurrentStep<B> {
        RecurrentStep {
            input: LinearConfig::new(self.input_size + self.context_size, self.hidden_size)
                .init(device),
            recurrent: LinearConfig::new(self.hidden_size, self.hidden_size)
                .with_bias(false)
                .init(device),
            context_size: self.context_size,
            hidden_size: self.hidden_size,
        }
    }
}

/// Elman cell: `h' = tanh(W_x [x; c] + W_h h + b)`.
///
/// `c` is the masked mean of the first encoder state, or zeros when no
/// encoder is attached.
#[derive(Module, Debug)]
pub struct RecurrentStep<B: Backend> {
    input: Linear<B>,
    recurrent: Linear<B>,
    context_size: usize,
    hidden_size: usize,
}

impl<B: Backend> RecurrentStep<B> {
    fn context(&self, encoder: &EncoderContext<B>, batch_size: usize, device: &B::Device) -> Tensor<B, 2> {
        match encoder.pooled() {
            Some(pooled) => {
                debug_assert_eq!(pooled.dims(), [batch_size, self.context_size]);
                pooled
            }
            None => Tensor::zeros([batch_size, self.context_size], device),
        }
    }
}

impl<B: Backend> StepFunction<B> for RecurrentStep<B> {
    /// Previous hidden state.
    type FeedableExt = Tensor<B, 2>;
    type HistoryExt = ();

    fn output_dimension(&self) -> usize {
        self.hidden_size
    }

    fn initial_feedable_ext(
        &self,
        batch_size: usize,
        _encoder: &EncoderContext<B>,
        device: &B::Device,
    ) -> Self::FeedableExt {
        Tensor::zeros([batch_size, self.hidden_size], device)
    }

    fn initial_history_ext(&self, _batch_size: usize, _device: &B::Device) -> Self::HistoryExt {}

    fn next_state(
        &self,
        state: &LoopState<B, Tensor<B, 2>, ()>,
        encoder: &EncoderContext<B>,
    ) -> StepOutput<B, Tensor<B, 2>, ()> {
        let input = state.feedables.embedded_input.clone();
        let input = if self.context_size > 0 {
            let [batch_size, _] = input.dims();
            let context = self.context(encoder, batch_size, &input.device());
            Tensor::cat(vec![input, context], 1)
        } else {
            input
        };

        let hidden = tanh(
            self.input.forward(input) + self.recurrent.forward(state.feedables.other.clone()),
        );

        StepOutput {
            output_state: hidden.clone(),
            feedable_ext: hidden,
            history_ext: (),
        }
    }
}
