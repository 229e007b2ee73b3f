use std::sync::Arc;

use burn::module::Param;
use burn::nn::{DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Bool, Int, Tensor, TensorData};

use crate::config::DecoderConfig;
use crate::decoder::AutoregressiveDecoder;
use crate::projection::DecoderWeights;
use crate::state::LoopState;
use crate::step::{EncoderContext, StepFunction, StepOutput};
use crate::vocabulary::Vocabulary;

pub type TestBackend = burn::backend::NdArray;
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;

pub fn int_matrix<B: Backend>(rows: &[Vec<i64>], device: &B::Device) -> Tensor<B, 2, Int> {
    let width = rows.first().map_or(0, Vec::len);
    let values: Vec<i64> = rows.iter().flatten().copied().collect();
    Tensor::from_data(TensorData::new(values, [rows.len(), width]), device)
}

pub fn float_matrix<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    let width = rows.first().map_or(0, Vec::len);
    let values: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_data(TensorData::new(values, [rows.len(), width]), device)
}

pub fn bool_vector<B: Backend>(values: &[bool], device: &B::Device) -> Tensor<B, 1, Bool> {
    let ints: Vec<i64> = values.iter().map(|&v| v as i64).collect();
    Tensor::<B, 1, Int>::from_data(TensorData::new(ints, [values.len()]), device).bool()
}

pub fn int_to_vec<B: Backend>(tensor: Tensor<B, 1, Int>) -> Vec<i64> {
    tensor.into_data().convert::<i64>().to_vec::<i64>().unwrap()
}

pub fn float_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap()
}

/// Weights with a hand-written `[hidden, vocabulary]` projection. The
/// embedding matrix is random with the hidden width as embedding size.
pub fn weights_from<B: Backend>(
    w_rows: &[Vec<f32>],
    bias: &[f32],
    device: &B::Device,
) -> DecoderWeights<B> {
    let hidden = w_rows.len();
    let vocabulary_size = bias.len();
    let embedding: Embedding<B> = EmbeddingConfig::new(vocabulary_size, hidden).init(device);

    let mut output: Linear<B> = LinearConfig::new(hidden, vocabulary_size).init(device);
    output.weight = Param::from_tensor(float_matrix(w_rows, device));
    output.bias = Some(Param::from_tensor(Tensor::from_data(
        TensorData::new(bias.to_vec(), [vocabulary_size]),
        device,
    )));

    DecoderWeights {
        embedding,
        output: Some(output),
        dropout: DropoutConfig::new(0.0).init(),
    }
}

/// Step function whose state is a one-hot vector at column `step`
/// (saturating at the last column). Counts its own calls in the history.
#[derive(Debug, Clone)]
pub struct CountingStep {
    width: usize,
}

impl CountingStep {
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl<B: Backend> StepFunction<B> for CountingStep {
    type FeedableExt = ();
    type HistoryExt = usize;

    fn output_dimension(&self) -> usize {
        self.width
    }

    fn initial_feedable_ext(
        &self,
        _batch_size: usize,
        _encoder: &EncoderContext<B>,
        _device: &B::Device,
    ) -> Self::FeedableExt {
    }

    fn initial_history_ext(&self, _batch_size: usize, _device: &B::Device) -> Self::HistoryExt {
        0
    }

    fn next_state(
        &self,
        state: &LoopState<B, (), usize>,
        _encoder: &EncoderContext<B>,
    ) -> StepOutput<B, (), usize> {
        let batch = state.batch_size();
        let hot = state.feedables.step.min(self.width - 1);
        let mut values = vec![0.0f32; batch * self.width];
        for row in 0..batch {
            values[row * self.width + hot] = 1.0;
        }

        StepOutput {
            output_state: Tensor::from_data(TensorData::new(values, [batch, self.width]), &state.device()),
            feedable_ext: (),
            history_ext: state.histories.other + 1,
        }
    }
}

/// pad, start, end, unk, a, b
pub fn test_vocabulary() -> Arc<Vocabulary> {
    Arc::new(Vocabulary::from_wordlist(["a", "b"]))
}

/// Counting decoder over the six symbol test vocabulary with random weights.
pub fn scenario_decoder(max_output_len: usize) -> AutoregressiveDecoder<TestBackend, CountingStep> {
    DecoderConfig::new(max_output_len)
        .with_embedding_size(Some(4))
        .init::<TestBackend, _>(test_vocabulary(), CountingStep::new(4), &Default::default())
        .unwrap()
}

/// Counting decoder with a fixed projection.
pub fn decoder_from(
    max_output_len: usize,
    w_rows: &[Vec<f32>],
    bias: &[f32],
    label_smoothing: Option<f64>,
) -> AutoregressiveDecoder<TestBackend, CountingStep> {
    let device: <TestBackend as Backend>::Device = Default::default();
    let decoder = DecoderConfig::new(max_output_len)
        .with_embedding_size(Some(w_rows.len()))
        .with_label_smoothing(label_smoothing)
        .init::<TestBackend, _>(test_vocabulary(), CountingStep::new(w_rows.len()), &device)
        .unwrap();
    decoder.with_weights(weights_from(w_rows, bias, &device))
}

/// Counting decoder that emits `script[t]` at step `t` under greedy
/// decoding (and keeps emitting the last entry afterwards).
pub fn scripted_decoder(
    max_output_len: usize,
    script: &[usize],
) -> AutoregressiveDecoder<TestBackend, CountingStep> {
    let rows: Vec<Vec<f32>> = script
        .iter()
        .map(|&symbol| {
            let mut row = vec![0.0f32; 6];
            row[symbol] = 10.0;
            row
        })
        .collect();
    decoder_from(max_output_len, &rows, &[0.0; 6], None)
}
