use burn::config::Config;

use crate::error::DecoderError;

/// Options shared by every autoregressive decoder.
#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// Maximum length of an output sequence.
    pub max_output_len: usize,
    /// Probability of keeping a value during dropout.
    #[config(default = 1.0)]
    pub dropout_keep_prob: f64,
    /// Size of the target word embeddings. Ignored when an embedding
    /// matrix is reused from another model part.
    pub embedding_size: Option<usize>,
    /// Use the transposed embedding matrix as the output projection.
    #[config(default = false)]
    pub tie_embeddings: bool,
    pub label_smoothing: Option<f64>,
    /// Never produce the unknown symbol.
    #[config(default = false)]
    pub supress_unk: bool,
}

impl DecoderConfig {
    /// Check the values that do not depend on the rest of the model.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.max_output_len == 0 {
            return Err(DecoderError::InvalidMaxOutputLen);
        }

        if let Some(size) = self.embedding_size {
            if size == 0 {
                return Err(DecoderError::InvalidEmbeddingSize(size));
            }
        }

        if !(0.0..=1.0).contains(&self.dropout_keep_prob) {
            return Err(DecoderError::InvalidDropout(self.dropout_keep_prob));
        }

        if let Some(smoothing) = self.label_smoothing {
            if !(0.0..=1.0).contains(&smoothing) {
                return Err(DecoderError::InvalidLabelSmoothing(smoothing));
            }
        }

        Ok(())
    }

    /// Label smoothing coefficient, 0 when disabled.
    pub fn smoothing(&self) -> f64 {
        self.label_smoothing.unwrap_or(0.0)
    }
}
