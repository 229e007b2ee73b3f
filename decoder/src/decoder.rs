//! The decoding loop shared by every autoregressive decoder.
//!
//! A decoder is an [`AutoregressiveDecoder`] parameterized by a
//! [`StepFunction`]. The loop is run once in teacher-forced mode for
//! training and once in greedy or sampled mode for inference; both runs
//! borrow the same [`DecoderWeights`].

use std::sync::Arc;

use burn::module::Param;
use burn::nn::{DropoutConfig, Embedding, EmbeddingConfig, Initializer, LinearConfig};
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use tracing::{debug, trace, warn};

use crate::config::DecoderConfig;
use crate::data::CaptionBatch;
use crate::error::{DecoderError, Result};
use crate::loss;
use crate::projection::{apply_temperature, DecoderWeights};
use crate::selection::{logits_to_symbols, DecodingMode};
use crate::state::{DecoderConstants, DecoderFeedables, DecoderHistories, LoopState};
use crate::step::{EncoderContext, StepFunction, StepOutput};
use crate::vocabulary::{pad_batch, Vocabulary, END_TOKEN_INDEX, PAD_TOKEN_INDEX, START_TOKEN_INDEX};

/// Loop state of the decoder driven by step function `S`.
pub type DecoderLoopState<B, S> = LoopState<
    B,
    <S as StepFunction<B>>::FeedableExt,
    <S as StepFunction<B>>::HistoryExt,
>;

/// Everything a single decoder run needs besides the model parameters.
#[derive(Debug, Clone)]
pub struct DecoderInputs<B: Backend> {
    pub batch_size: usize,
    /// Target ids, time-major `[time, batch]`.
    pub train_inputs: Option<Tensor<B, 2, Int>>,
    pub encoder: EncoderContext<B>,
}

impl<B: Backend> DecoderInputs<B> {
    /// Inputs for a run without reference sentences.
    pub fn inference(batch_size: usize) -> Self {
        Self {
            batch_size,
            train_inputs: None,
            encoder: EncoderContext::empty(),
        }
    }

    /// Inputs for a run on time-major target ids.
    pub fn with_targets(train_inputs: Tensor<B, 2, Int>) -> Self {
        Self {
            batch_size: train_inputs.dims()[1],
            train_inputs: Some(train_inputs),
            encoder: EncoderContext::empty(),
        }
    }

    pub fn with_encoder(mut self, encoder: EncoderContext<B>) -> Self {
        self.encoder = encoder;
        self
    }

    /// `[time, batch]`, ones at non-pad target positions.
    pub fn train_mask(&self) -> Option<Tensor<B, 2>> {
        self.train_inputs
            .as_ref()
            .map(|inputs| inputs.clone().equal_elem(PAD_TOKEN_INDEX as i64).bool_not().float())
    }
}

impl DecoderConfig {
    /// Build a decoder with its own embedding matrix.
    pub fn init<B: Backend, S: StepFunction<B>>(
        &self,
        vocabulary: Arc<Vocabulary>,
        step: S,
        device: &B::Device,
    ) -> Result<AutoregressiveDecoder<B, S>> {
        self.build(vocabulary, None, step, device)
    }

    /// Build a decoder that reuses the embedding matrix of another model
    /// part (usually the encoder). The configured `embedding_size` is
    /// overridden by the size of the reused matrix.
    pub fn init_with_embeddings<B: Backend, S: StepFunction<B>>(
        &self,
        vocabulary: Arc<Vocabulary>,
        embeddings_source: Embedding<B>,
        step: S,
        device: &B::Device,
    ) -> Result<AutoregressiveDecoder<B, S>> {
        self.build(vocabulary, Some(embeddings_source), step, device)
    }

    fn build<B: Backend, S: StepFunction<B>>(
        &self,
        vocabulary: Arc<Vocabulary>,
        embeddings_source: Option<Embedding<B>>,
        step: S,
        device: &B::Device,
    ) -> Result<AutoregressiveDecoder<B, S>> {
        self.validate()?;

        let embedding = match embeddings_source {
            Some(source) => {
                if let Some(size) = self.embedding_size {
                    warn!(
                        configured = size,
                        "overriding the embedding_size parameter with the size of the reused embeddings"
                    );
                }
                source
            }
            None => {
                let size = self.embedding_size.ok_or(DecoderError::MissingEmbeddingSize)?;
                EmbeddingConfig::new(vocabulary.len(), size).init(device)
            }
        };
        let [embedding_rows, embedding_size] = embedding.weight.val().dims();
        if embedding_rows != vocabulary.len() {
            return Err(DecoderError::EmbeddingVocabularyMismatch {
                embedding_rows,
                vocabulary_size: vocabulary.len(),
            });
        }

        let output_dimension = step.output_dimension();
        if self.tie_embeddings && embedding_size != output_dimension {
            return Err(DecoderError::TiedEmbeddingMismatch {
                embedding_size,
                output_dimension,
            });
        }

        let output = if self.tie_embeddings {
            None
        } else {
            let mut linear = LinearConfig::new(output_dimension, vocabulary.len())
                .with_initializer(Initializer::Uniform { min: -0.5, max: 0.5 })
                .init(device);
            linear.bias = Some(Param::from_tensor(Tensor::zeros([vocabulary.len()], device)));
            Some(linear)
        };

        let weights = DecoderWeights {
            embedding,
            output,
            dropout: DropoutConfig::new(1.0 - self.dropout_keep_prob).init(),
        };

        debug!(
            vocabulary = vocabulary.len(),
            embedding_size,
            output_dimension,
            max_output_len = self.max_output_len,
            "initialized autoregressive decoder"
        );

        Ok(AutoregressiveDecoder {
            config: self.clone(),
            vocabulary,
            weights,
            step,
            device: device.clone(),
        })
    }
}

pub struct AutoregressiveDecoder<B: Backend, S: StepFunction<B>> {
    config: DecoderConfig,
    vocabulary: Arc<Vocabulary>,
    weights: DecoderWeights<B>,
    step: S,
    device: B::Device,
}

impl<B: Backend, S: StepFunction<B>> AutoregressiveDecoder<B, S> {
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn weights(&self) -> &DecoderWeights<B> {
        &self.weights
    }

    /// Replace the parameters, e.g. after an optimizer step.
    pub fn with_weights(mut self, weights: DecoderWeights<B>) -> Self {
        self.weights = weights;
        self
    }

    pub fn step_function(&self) -> &S {
        &self.step
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn max_output_len(&self) -> usize {
        self.config.max_output_len
    }

    pub fn embedding_size(&self) -> usize {
        self.weights.embedding_size()
    }

    /// Turn a batch into decoder inputs.
    ///
    /// Reference sentences are padded to at most `max_output_len` symbols
    /// with an end symbol appended, and stored time-major.
    pub fn feed(&self, batch: &CaptionBatch, is_training: bool) -> Result<DecoderInputs<B>> {
        let sentences = batch.sentences();
        if sentences.is_none() && is_training {
            return Err(DecoderError::MissingTrainingData);
        }

        let train_inputs = sentences.map(|sentences| {
            let padded = pad_batch(sentences, self.config.max_output_len, false, true);
            time_major_ids(&self.vocabulary.sentences_to_indices(&padded), &self.device)
        });

        Ok(DecoderInputs {
            batch_size: batch.len(),
            train_inputs,
            encoder: EncoderContext::empty(),
        })
    }

    /// Run the decoding loop.
    ///
    /// `train_mode` feeds the reference symbols, otherwise the decoder feeds
    /// its own predictions, either the argmax or, with `sample`, a draw from
    /// the output distribution scaled by `temperature`.
    ///
    /// # Panics
    ///
    /// When both `train_mode` and `sample` are set.
    pub fn decode(
        &self,
        inputs: &DecoderInputs<B>,
        train_mode: bool,
        sample: bool,
        temperature: f32,
    ) -> Result<DecoderLoopState<B, S>> {
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(DecoderError::InvalidTemperature(temperature));
        }
        let mode = DecodingMode::from_flags(train_mode, sample);
        self.decoding_loop(inputs, mode, temperature)
    }

    pub fn train_loop_result(&self, inputs: &DecoderInputs<B>) -> Result<DecoderLoopState<B, S>> {
        self.decoding_loop(inputs, DecodingMode::TeacherForced, 1.0)
    }

    pub fn runtime_loop_result(&self, inputs: &DecoderInputs<B>) -> DecoderLoopState<B, S> {
        self.run_loop(inputs, DecodingMode::Greedy, 1.0)
    }

    /// Training objective: masked cross entropy of the teacher-forced run.
    pub fn cost(&self, inputs: &DecoderInputs<B>) -> Result<Tensor<B, 1>> {
        Ok(self.train_loss(&self.train_loop_result(inputs)?))
    }

    pub fn train_xents(&self, state: &DecoderLoopState<B, S>) -> Tensor<B, 2> {
        loss::train_xents(state, self.config.smoothing())
    }

    pub fn train_loss(&self, state: &DecoderLoopState<B, S>) -> Tensor<B, 1> {
        loss::train_loss(state, self.config.smoothing())
    }

    pub fn runtime_loss(
        &self,
        state: &DecoderLoopState<B, S>,
        inputs: &DecoderInputs<B>,
    ) -> Option<Tensor<B, 1>> {
        let targets = inputs.train_inputs.as_ref()?;
        Some(loss::runtime_loss(state, targets.clone()))
    }

    pub fn train_logprobs(&self, state: &DecoderLoopState<B, S>) -> Tensor<B, 3> {
        loss::logprobs(state)
    }

    pub fn runtime_logprobs(&self, state: &DecoderLoopState<B, S>) -> Tensor<B, 3> {
        loss::logprobs(state)
    }

    /// `[time, batch]` best non-pad symbols of an inference run.
    pub fn decoded(&self, state: &DecoderLoopState<B, S>) -> Tensor<B, 2, Int> {
        loss::decoded(state)
    }

    /// Decoded symbols of an inference run as sentences.
    pub fn decoded_sentences(&self, state: &DecoderLoopState<B, S>) -> Result<Vec<Vec<String>>> {
        let rows = loss::decoded_batch_major(state)?;
        Ok(self.vocabulary.indices_to_sentences(&rows))
    }

    pub fn initial_loop_state(
        &self,
        inputs: &DecoderInputs<B>,
        mode: DecodingMode,
    ) -> DecoderLoopState<B, S> {
        let batch_size = inputs.batch_size;
        let go_symbols =
            Tensor::<B, 1, Int>::full([batch_size], START_TOKEN_INDEX as i64, &self.device);
        let embedded_start = self
            .weights
            .embed_input_symbols(go_symbols, mode.is_training());

        LoopState {
            feedables: DecoderFeedables::initial(
                batch_size,
                embedded_start,
                self.step
                    .initial_feedable_ext(batch_size, &inputs.encoder, &self.device),
            ),
            histories: DecoderHistories::empty(
                batch_size,
                self.weights.vocabulary_size(),
                self.step.output_dimension(),
                self.step.initial_history_ext(batch_size, &self.device),
            ),
            constants: DecoderConstants::new(inputs.train_inputs.clone()),
        }
    }

    /// Keep going while some sequence is unfinished and the maximum length
    /// has not been reached.
    pub fn loop_continue_criterion(&self, state: &DecoderLoopState<B, S>) -> bool {
        !state.feedables.all_finished() && state.feedables.step < self.config.max_output_len
    }

    /// Teacher forcing needs reference symbols for every run.
    pub fn decoding_loop(
        &self,
        inputs: &DecoderInputs<B>,
        mode: DecodingMode,
        temperature: f32,
    ) -> Result<DecoderLoopState<B, S>> {
        if mode.is_training() && inputs.train_inputs.is_none() {
            return Err(DecoderError::MissingTrainingData);
        }
        Ok(self.run_loop(inputs, mode, temperature))
    }

    fn run_loop(
        &self,
        inputs: &DecoderInputs<B>,
        mode: DecodingMode,
        temperature: f32,
    ) -> DecoderLoopState<B, S> {
        let mut state = self.initial_loop_state(inputs, mode);

        while self.loop_continue_criterion(&state) {
            state = self.body(state, &inputs.encoder, mode, temperature);
        }

        debug!(
            ?mode,
            steps = state.steps(),
            finished = state.feedables.finished_count(),
            batch_size = state.batch_size(),
            "decoding loop done"
        );

        self.step.finalize(state, mode)
    }

    fn body(
        &self,
        state: DecoderLoopState<B, S>,
        encoder: &EncoderContext<B>,
        mode: DecodingMode,
        temperature: f32,
    ) -> DecoderLoopState<B, S> {
        let StepOutput {
            output_state,
            feedable_ext,
            history_ext,
        } = self.step.next_state(&state, encoder);

        let logits = self
            .weights
            .state_to_logits(output_state.clone(), self.config.supress_unk);
        let logits = apply_temperature(logits, temperature);

        let next_symbols = logits_to_symbols(logits.clone(), &state, mode);

        let LoopState {
            feedables,
            mut histories,
            constants,
        } = state;

        let has_just_finished = next_symbols.clone().equal_elem(END_TOKEN_INDEX as i64);
        let finished = (feedables.finished.clone().int() + has_just_finished.int()).greater_elem(0);
        // valid iff the sequence was unfinished when the symbol was emitted
        let output_mask = feedables.finished.bool_not();

        trace!(step = feedables.step, "decoder step");

        histories.append(
            logits,
            output_state,
            next_symbols.clone(),
            output_mask,
            history_ext,
        );

        LoopState {
            feedables: DecoderFeedables {
                step: feedables.step + 1,
                finished,
                embedded_input: self
                    .weights
                    .embed_input_symbols(next_symbols, mode.is_training()),
                other: feedable_ext,
            },
            histories,
            constants,
        }
    }
}

/// Lay out padded id rows as a time-major `[time, batch]` tensor.
pub fn time_major_ids<B: Backend>(rows: &[Vec<usize>], device: &B::Device) -> Tensor<B, 2, Int> {
    let batch = rows.len();
    let width = rows.first().map_or(0, Vec::len);
    let mut ids = Vec::with_capacity(batch * width);
    for t in 0..width {
        for row in rows {
            ids.push(row[t] as i64);
        }
    }
    Tensor::from_data(TensorData::new(ids, [width, batch]), device)
}
