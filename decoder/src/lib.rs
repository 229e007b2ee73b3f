//! Autoregressive sequence decoder on top of burn.
//!
//! The loop in [`decoder`] is architecture agnostic: a [`StepFunction`]
//! computes the next hidden state, everything else (projection to the
//! vocabulary, symbol choice, termination, histories and losses) lives here.

pub mod config;
pub mod data;
pub mod decoder;
pub mod error;
pub mod loss;
pub mod projection;
pub mod recurrent;
pub mod selection;
pub mod state;
pub mod step;
pub mod vocabulary;

#[cfg(test)]
mod test_utils;

pub use config::DecoderConfig;
pub use data::{CaptionBatch, CaptionBatcher, CaptionSample, JsonlDataset};
pub use decoder::{AutoregressiveDecoder, DecoderInputs, DecoderLoopState};
pub use error::{DecoderError, Result};
pub use projection::DecoderWeights;
pub use recurrent::{RecurrentStep, RecurrentStepConfig};
pub use selection::DecodingMode;
pub use state::{DecoderConstants, DecoderFeedables, DecoderHistories, LoopState};
pub use step::{EncoderContext, StepFunction, StepOutput};
pub use vocabulary::Vocabulary;
