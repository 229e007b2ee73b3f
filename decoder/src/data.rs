use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DecoderError, Result};
use crate::vocabulary::simple_tokenize;

/// One line of a JSON-lines file, e.g. `{"id": "img1", "caption": "a dog"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSample {
    pub id: String,
    /// Reference sentence; absent at inference time.
    #[serde(default)]
    pub caption: Option<String>,
}

impl CaptionSample {
    pub fn new(id: &str, caption: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            caption: caption.map(str::to_string),
        }
    }

    pub fn tokens(&self) -> Option<Vec<String>> {
        self.caption.as_deref().map(simple_tokenize)
    }
}

pub struct JsonlDataset<T> {
    items: Vec<T>,
}

impl<T: DeserializeOwned> JsonlDataset<T> {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// Parse one item per non-empty line.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut items = Vec::new();
        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let item = serde_json::from_str(&line).map_err(|source| DecoderError::Json {
                line: index + 1,
                source,
            })?;
            items.push(item);
        }

        Ok(Self { items })
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T: DeserializeOwned + Clone + Send + Sync> Dataset<T> for JsonlDataset<T> {
    fn get(&self, index: usize) -> Option<T> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Tokenized captions of a batch. `sentences` is `None` unless every
/// sample of the batch carries a caption.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionBatch {
    pub ids: Vec<String>,
    pub sentences: Option<Vec<Vec<String>>>,
}

impl CaptionBatch {
    pub fn new(ids: Vec<String>, sentences: Option<Vec<Vec<String>>>) -> Self {
        Self { ids, sentences }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn sentences(&self) -> Option<&[Vec<String>]> {
        self.sentences.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptionBatcher;

impl<B: Backend> Batcher<B, CaptionSample, CaptionBatch> for CaptionBatcher {
    fn batch(&self, items: Vec<CaptionSample>, _device: &B::Device) -> CaptionBatch {
        let sentences = items.iter().map(CaptionSample::tokens).collect();
        let ids = items.into_iter().map(|item| item.id).collect();

        CaptionBatch::new(ids, sentences)
    }
}
