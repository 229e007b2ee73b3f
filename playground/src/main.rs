use std::sync::Arc;

use autoregressive_decoder::{
    CaptionBatch, CaptionBatcher, CaptionSample, DecoderConfig, DecoderInputs, JsonlDataset,
    RecurrentStepConfig, Result, Vocabulary,
};
use burn::backend::{wgpu::Wgpu, Autodiff};
use burn::config::Config;
use burn::data::dataloader::DataLoaderBuilder;
use burn::tensor::ElementConversion;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type BackendType = Autodiff<Wgpu>;

const HIDDEN_SIZE: usize = 128;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true))
        .init();

    let mut args = std::env::args().skip(1);
    let data_path = args.next().unwrap_or_else(|| "captions.jsonl".to_string());
    let config_path = args.next().unwrap_or_else(|| "decoder.json".to_string());

    let config = match DecoderConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %config_path, ?err, "using the default decoder config");
            DecoderConfig::new(20).with_embedding_size(Some(64))
        }
    };

    let device = Default::default();

    let dataset = JsonlDataset::<CaptionSample>::new(&data_path)?;
    let vocabulary = Arc::new(Vocabulary::from_tokenized_text(
        dataset.items().iter().filter_map(CaptionSample::tokens).flatten(),
    ));
    info!(samples = dataset.items().len(), vocabulary = vocabulary.len(), "loaded captions");

    let embedding_size = config.embedding_size.unwrap_or(64);
    let step = RecurrentStepConfig::new(embedding_size, HIDDEN_SIZE).init::<BackendType>(&device);
    let decoder = config
        .with_embedding_size(Some(embedding_size))
        .init(vocabulary, step, &device)?;

    let dataloader = DataLoaderBuilder::<BackendType, CaptionSample, CaptionBatch>::new(CaptionBatcher)
        .set_device(device.clone())
        .batch_size(8)
        .shuffle(3214382438)
        .num_workers(2)
        .build(dataset);

    for (index, batch) in dataloader.iter().enumerate() {
        if batch.sentences().is_some() {
            let inputs = decoder.feed(&batch, true)?;
            let loss = decoder.cost(&inputs)?.into_scalar().elem::<f32>();
            info!(batch = index, loss, "teacher-forced loss");
        }

        let state = decoder.runtime_loop_result(&DecoderInputs::inference(batch.len()));
        for (id, caption) in batch.ids.iter().zip(decoder.decoded_sentences(&state)?) {
            info!(batch = index, %id, caption = caption.join(" "), "greedy caption");
        }
    }

    Ok(())
}
