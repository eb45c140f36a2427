//! Immutable configuration values passed into each harness invocation

use crate::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// How a model is initialized by the inference backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Context window size in tokens
    pub context_size: usize,

    /// Number of CPU threads
    pub num_threads: usize,

    /// Number of layers offloaded to the GPU (0 = CPU only)
    pub gpu_layers: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            context_size: 2048,
            num_threads: 4,
            gpu_layers: 0,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.context_size == 0 {
            return Err(BenchError::invalid_parameter(
                "INVALID_CONTEXT_SIZE",
                "Context size must be greater than zero",
                "Model configuration validation",
                "Use the context length the model was trained with, e.g. 2048",
                "context_size",
                "0",
                "1 or more",
            ));
        }
        if self.num_threads == 0 {
            return Err(BenchError::invalid_parameter(
                "INVALID_THREAD_COUNT",
                "Thread count must be greater than zero",
                "Model configuration validation",
                "Set num_threads to the number of physical cores to use",
                "num_threads",
                "0",
                "1 or more",
            ));
        }
        Ok(())
    }
}

/// Sampling parameters shared by every request of a battery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate
    pub max_tokens: usize,

    /// Sampling temperature (0.0 = greedy)
    pub temperature: f32,

    /// Stop sequences that end generation
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl GenerationParams {
    /// Parameters for the resource (latency/throughput) battery
    pub fn resource() -> Self {
        Self {
            max_tokens: 128,
            temperature: 0.7,
            stop_sequences: Vec::new(),
        }
    }

    /// Parameters for free-form question answering
    pub fn free_form() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.1,
            stop_sequences: vec!["Question:".to_string(), "\n\n".to_string()],
        }
    }

    /// Parameters for single-letter multiple-choice answers
    pub fn multiple_choice() -> Self {
        Self {
            max_tokens: 10,
            temperature: 0.0,
            stop_sequences: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(BenchError::invalid_parameter(
                "INVALID_MAX_TOKENS",
                "max_tokens must be greater than zero",
                "Generation parameter validation",
                "Request at least one output token",
                "max_tokens",
                "0",
                "1 or more",
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(BenchError::invalid_parameter(
                "TEMPERATURE_NEGATIVE",
                "Temperature must be a non-negative number",
                "Generation parameter validation",
                "Use 0.0 for deterministic output or positive values for randomness",
                "temperature",
                self.temperature.to_string(),
                "0.0 to 2.0 (typical range)",
            ));
        }
        Ok(())
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::resource()
    }
}

/// What to do when loading a model or running a generation fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Propagate the first failure
    #[default]
    FailFast,

    /// Retry transient failures with exponential backoff
    Retry {
        /// Total attempts including the first one
        max_attempts: u32,
        /// Delay before the second attempt; doubled after each retry
        initial_backoff_ms: u64,
    },
}

impl FailurePolicy {
    pub fn validate(&self) -> Result<()> {
        if let Self::Retry { max_attempts, .. } = self {
            if *max_attempts == 0 {
                return Err(BenchError::invalid_parameter(
                    "INVALID_RETRY_ATTEMPTS",
                    "Retry policy needs at least one attempt",
                    "Failure policy validation",
                    "Use fail_fast or set max_attempts to 2 or more",
                    "max_attempts",
                    "0",
                    "1 or more",
                ));
            }
        }
        Ok(())
    }

    /// Maximum number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::FailFast => 1,
            Self::Retry { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Run `op` under this policy. Non-transient errors are never retried.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.max_attempts();
        let mut backoff = match self {
            Self::FailFast => Duration::ZERO,
            Self::Retry {
                initial_backoff_ms, ..
            } => Duration::from_millis(*initial_backoff_ms),
        };

        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_transient() => {
                    warn!(
                        "{} failed (attempt {}/{}): [{}] retrying in {:?}",
                        label,
                        attempt,
                        max_attempts,
                        e.code(),
                        backoff
                    );
                    if !backoff.is_zero() {
                        std::thread::sleep(backoff);
                    }
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
