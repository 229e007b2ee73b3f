use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("maximum sequence length must be a positive integer")]
    InvalidMaxOutputLen,

    #[error("embedding size must be a positive integer, got {0}")]
    InvalidEmbeddingSize(usize),

    #[error("dropout keep probability must be a real number in the interval [0,1], got {0}")]
    InvalidDropout(f64),

    #[error("label smoothing must be a real number in the interval [0,1], got {0}")]
    InvalidLabelSmoothing(f64),

    #[error("either `embedding_size` or an embedding source to reuse must be given")]
    MissingEmbeddingSize,

    #[error(
        "embedding size ({embedding_size}) must be equal to the output projection size \
         ({output_dimension}) when using tied embeddings"
    )]
    TiedEmbeddingMismatch {
        embedding_size: usize,
        output_dimension: usize,
    },

    #[error(
        "reused embedding matrix has {embedding_rows} rows but the vocabulary has \
         {vocabulary_size} words"
    )]
    EmbeddingVocabularyMismatch {
        embedding_rows: usize,
        vocabulary_size: usize,
    },

    #[error("when training, reference sentences must be fed")]
    MissingTrainingData,

    #[error("temperature must be a positive finite number, got {0}")]
    InvalidTemperature(f32),

    #[error("tensor data error: {0}")]
    Data(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, DecoderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_tied_mismatch() {
        let e = DecoderError::TiedEmbeddingMismatch {
            embedding_size: 16,
            output_dimension: 32,
        };
        assert_eq!(
            e.to_string(),
            "embedding size (16) must be equal to the output projection size (32) \
             when using tied embeddings"
        );
    }

    #[test]
    fn error_display_dropout() {
        let e = DecoderError::InvalidDropout(1.5);
        assert_eq!(
            e.to_string(),
            "dropout keep probability must be a real number in the interval [0,1], got 1.5"
        );
    }

    #[test]
    fn error_display_missing_training_data() {
        assert_eq!(
            DecoderError::MissingTrainingData.to_string(),
            "when training, reference sentences must be fed"
        );
    }
}
