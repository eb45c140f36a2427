//! Boundary with the inference and embedding engines
//!
//! The harness never looks inside a model. It loads one through a
//! [`ModelLoader`], asks the resulting [`ModelHandle`] for a lazy stream of
//! [`StreamIncrement`]s and tokenizes inputs against the handle's vocabulary.
//! Free-form scoring additionally needs an [`Embedder`].

use crate::{
    config::{GenerationParams, ModelConfig},
    BenchError, Result,
};
use std::path::Path;

/// One unit produced during generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamIncrement {
    /// Arrival order, strictly increasing within one generation
    pub index: usize,
    /// Text fragment
    pub text: String,
}

/// Lazy, finite, non-restartable sequence of increments
pub type IncrementStream<'a> = Box<dyn Iterator<Item = Result<StreamIncrement>> + 'a>;

/// A single generation call. Built once from a battery's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    max_tokens: usize,
    temperature: f32,
    stop: Vec<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, params: &GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stop: params.stop_sequences.clone(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn stop_sequences(&self) -> &[String] {
        &self.stop
    }
}

/// A loaded model. Dropping the handle releases its native resources.
pub trait ModelHandle {
    /// Display name (file name of the artifact)
    fn name(&self) -> &str;

    /// On-disk size of the artifact in bytes
    fn size_bytes(&self) -> u64;

    /// Configuration the model was loaded with
    fn config(&self) -> &ModelConfig;

    /// Start a streaming generation
    fn generate(&self, request: &GenerationRequest) -> Result<IncrementStream<'_>>;

    /// Tokenize text against the model's vocabulary
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Id of the process the model runs in when it is served out of process.
    /// Memory is sampled from that process instead of the running one.
    fn process_id(&self) -> Option<u32> {
        None
    }
}

/// Initializes models from artifacts on disk
pub trait ModelLoader {
    type Handle: ModelHandle;

    fn load(&self, path: &Path, config: &ModelConfig) -> Result<Self::Handle>;
}

/// Text embedding capability used for semantic similarity
pub trait Embedder: Send + Sync {
    /// Embed text into a fixed-size vector
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Tracks arrival indices of a stream and rejects out-of-order increments
#[derive(Debug, Default)]
pub(crate) struct ArrivalOrder {
    last: Option<usize>,
}

impl ArrivalOrder {
    pub(crate) fn check(&mut self, increment: &StreamIncrement) -> Result<()> {
        if let Some(last) = self.last {
            if increment.index <= last {
                return Err(BenchError::generation(
                    "STREAM_INDEX_NOT_MONOTONIC",
                    format!(
                        "Increment index {} arrived after index {}",
                        increment.index, last
                    ),
                    "Validating streamed generation output",
                    "The inference backend must number increments in arrival order",
                ));
            }
        }
        self.last = Some(increment.index);
        Ok(())
    }
}

/// Run a generation to completion and return the concatenated text
pub fn generate_text<H: ModelHandle + ?Sized>(
    handle: &H,
    request: &GenerationRequest,
) -> Result<String> {
    let mut order = ArrivalOrder::default();
    let mut text = String::new();
    for increment in handle.generate(request)? {
        let increment = increment?;
        order.check(&increment)?;
        text.push_str(&increment.text);
    }
    Ok(text)
}
