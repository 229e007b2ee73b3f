use burn::module::Module;
use burn::nn::{Dropout, Embedding, Linear};
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use crate::vocabulary::UNK_TOKEN_INDEX;

/// Added to the unknown symbol's logit when it is suppressed.
pub const UNK_PENALTY: f32 = -1e9;

/// Parameters shared by the training and the inference run of a decoder.
#[derive(Module, Debug)]
pub struct DecoderWeights<B: Backend> {
    /// `[vocabulary, embedding]`
    pub embedding: Embedding<B>,
    /// State to word projection; `None` when tied to the embedding matrix.
    pub output: Option<Linear<B>>,
    pub dropout: Dropout,
}

impl<B: Backend> DecoderWeights<B> {
    pub fn vocabulary_size(&self) -> usize {
        self.embedding.weight.val().dims()[0]
    }

    pub fn embedding_size(&self) -> usize {
        self.embedding.weight.val().dims()[1]
    }

    /// `[hidden, vocabulary]`
    pub fn decoding_w(&self) -> Tensor<B, 2> {
        match &self.output {
            Some(linear) => linear.weight.val(),
            None => self.embedding.weight.val().transpose(),
        }
    }

    /// `[vocabulary]`
    pub fn decoding_b(&self) -> Tensor<B, 1> {
        match self.output.as_ref().and_then(|linear| linear.bias.as_ref()) {
            Some(bias) => bias.val(),
            None => Tensor::zeros([self.vocabulary_size()], &self.embedding.weight.val().device()),
        }
    }

    /// Map `[batch, hidden]` decoder states to `[batch, vocabulary]` scores.
    pub fn state_to_logits(&self, state: Tensor<B, 2>, supress_unk: bool) -> Tensor<B, 2> {
        let logits = state.matmul(self.decoding_w()) + self.decoding_b().unsqueeze::<2>();

        if supress_unk {
            return suppress_unknown(logits);
        }
        logits
    }

    /// Embed a `[batch]` vector of symbols. Dropout is applied in training
    /// mode only.
    pub fn embed_input_symbols(&self, symbols: Tensor<B, 1, Int>, train_mode: bool) -> Tensor<B, 2> {
        let [batch] = symbols.dims();
        let embedded = self
            .embedding
            .forward(symbols.reshape([batch, 1]))
            .reshape([batch, self.embedding_size()]);

        if train_mode {
            return self.dropout.forward(embedded);
        }
        embedded
    }
}

/// Push the unknown symbol's logit towards minus infinity so neither argmax
/// nor sampling can pick it.
pub fn suppress_unknown<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 2> {
    let [_, vocabulary_size] = logits.dims();
    if vocabulary_size <= UNK_TOKEN_INDEX {
        return logits;
    }

    let mut penalty = vec![0.0f32; vocabulary_size];
    penalty[UNK_TOKEN_INDEX] = UNK_PENALTY;
    let penalty = Tensor::<B, 1>::from_data(
        TensorData::new(penalty, [vocabulary_size]),
        &logits.device(),
    );
    logits + penalty.unsqueeze::<2>()
}

/// Divide logits by the softmax temperature.
pub fn apply_temperature<B: Backend>(logits: Tensor<B, 2>, temperature: f32) -> Tensor<B, 2> {
    if temperature == 1.0 {
        return logits;
    }
    logits.div_scalar(temperature)
}
