//! Quantbench Core - measurement and aggregation harness
//!
//! This crate drives loaded language models through fixed batteries of
//! prompts, samples timing and memory while tokens stream in, judges answers
//! for accuracy batteries and reduces everything into comparable per-model
//! statistics. Inference and embedding engines are reached only through the
//! traits in [`backend`].

// Module declarations
pub mod aggregate;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod evaluate;
pub mod harness;
pub mod records;
pub mod report;
pub mod runner;
pub mod sampler;
pub mod scorer;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    /// A listed model artifact does not exist on disk
    #[error("Missing artifact [{code}]: {message}\nPath: {path:?}\nSuggestion: {suggestion}")]
    MissingArtifact {
        code: &'static str,
        message: String,
        path: PathBuf,
        suggestion: String,
    },

    /// The inference backend could not initialize a model
    #[error("Load failure [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    LoadFailure {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        model: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A generation failed or produced an invalid stream
    #[error("Generation error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Generation {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        model: Option<String>,
    },

    /// Tokenizing an input against the active vocabulary failed
    #[error("Tokenizer error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Tokenizer {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// The embedding capability failed or returned unusable vectors
    #[error("Embedding error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Embedding {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Dataset or model list parsing errors
    #[error("Dataset error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Dataset {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        path: Option<PathBuf>,
    },

    /// Input validation and parameter errors
    #[error("Invalid input [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    InvalidInput {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        parameter_name: Option<String>,
        value: Option<String>,
        valid_range: Option<String>,
    },

    /// Configuration parsing and validation errors
    #[error("Configuration error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Configuration {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        field_name: Option<String>,
    },

    /// File system and I/O errors
    #[error("IO error [{code}]: {message}\nPath: {path:?}\nSuggestion: {suggestion}")]
    Io {
        code: &'static str,
        message: String,
        path: Option<PathBuf>,
        suggestion: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding errors
    #[error("Serialization error [{code}]: {message}\nSuggestion: {suggestion}")]
    Serialization {
        code: &'static str,
        message: String,
        suggestion: String,
        #[source]
        source: serde_json::Error,
    },

    /// Other unexpected errors
    #[error("Internal error [{code}]: {message}\nContext: {context}")]
    Internal {
        code: &'static str,
        message: String,
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

pub type Result<T> = std::result::Result<T, BenchError>;

impl BenchError {
    /// Create a missing artifact error for a model path
    pub fn missing_artifact<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        Self::MissingArtifact {
            code: "MODEL_NOT_FOUND",
            message: format!("Model not found: {}", path.display()),
            path,
            suggestion: "Check the entry in the model list or remove it".to_string(),
        }
    }

    /// Create a load failure for a named model
    pub fn load_failure<S1, S2, S3, S4>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        model: S4,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        Self::LoadFailure {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            model: model.into(),
            source: None,
        }
    }

    /// Create a generation error
    pub fn generation<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Generation {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            model: None,
        }
    }

    /// Create a tokenizer error
    pub fn tokenizer<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Tokenizer {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Embedding {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a dataset error, optionally tied to a file
    pub fn dataset<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        path: Option<PathBuf>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Dataset {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            path,
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: None,
            value: None,
            valid_range: None,
        }
    }

    /// Create an invalid input error with parameter validation details
    pub fn invalid_parameter<S1, S2, S3, S4, S5, S6>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        param_name: S4,
        value: S5,
        valid_range: S6,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
        S5: Into<String>,
        S6: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: Some(param_name.into()),
            value: Some(value.into()),
            valid_range: Some(valid_range.into()),
        }
    }

    /// Create a configuration error for a named field
    pub fn configuration<S1, S2, S3, S4>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        field_name: S4,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            field_name: Some(field_name.into()),
        }
    }

    /// Attach the model identity to generation and load errors
    pub fn for_model(self, name: &str) -> Self {
        match self {
            Self::Generation {
                code,
                message,
                context,
                suggestion,
                model: None,
            } => Self::Generation {
                code,
                message,
                context,
                suggestion,
                model: Some(name.to_string()),
            },
            other => other,
        }
    }

    /// Attach a file path to I/O errors
    pub fn with_path<P: Into<PathBuf>>(self, path: P) -> Self {
        match self {
            Self::Io {
                code,
                message,
                suggestion,
                source,
                ..
            } => Self::Io {
                code,
                message,
                path: Some(path.into()),
                suggestion,
                source,
            },
            other => other,
        }
    }

    /// Whether retrying the failed operation could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LoadFailure { .. }
                | Self::Generation { .. }
                | Self::Tokenizer { .. }
                | Self::Embedding { .. }
                | Self::Io { .. }
                | Self::Internal { .. }
        )
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingArtifact { code, .. } => code,
            Self::LoadFailure { code, .. } => code,
            Self::Generation { code, .. } => code,
            Self::Tokenizer { code, .. } => code,
            Self::Embedding { code, .. } => code,
            Self::Dataset { code, .. } => code,
            Self::InvalidInput { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::Io { code, .. } => code,
            Self::Serialization { code, .. } => code,
            Self::Internal { code, .. } => code,
        }
    }
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        let (code, suggestion) = match err.kind() {
            std::io::ErrorKind::NotFound => (
                "IO_FILE_NOT_FOUND",
                "Check that the file path is correct and the file exists",
            ),
            std::io::ErrorKind::PermissionDenied => (
                "IO_PERMISSION_DENIED",
                "Check file permissions or run with appropriate privileges",
            ),
            std::io::ErrorKind::InvalidData => (
                "IO_INVALID_DATA",
                "The file may be corrupted or in an unexpected format",
            ),
            _ => (
                "IO_UNKNOWN",
                "Check the file system and try the operation again",
            ),
        };

        Self::Io {
            code,
            message: err.to_string(),
            path: None,
            suggestion: suggestion.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            code: "JSON_INVALID",
            message: err.to_string(),
            suggestion: "Check that the document is valid JSON with the expected fields"
                .to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for BenchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            code: "INTERNAL_UNKNOWN",
            message: err.to_string(),
            context: "An unexpected error occurred".to_string(),
            source: Some(err),
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        aggregate::{
            rank, summarize, ComparisonRow, ComparisonTable, Direction, EvaluationAggregate,
            PerformanceAggregate, Rankable, Statistic,
        },
        backend::{
            Embedder, GenerationRequest, IncrementStream, ModelHandle, ModelLoader,
            StreamIncrement,
        },
        config::{FailurePolicy, GenerationParams, ModelConfig},
        dataset::{MmluDataset, MmluQuestion, QaPair, SubjectScope},
        evaluate::{evaluate_free_form, evaluate_multiple_choice},
        harness::{Harness, ModelRun, RunOutcome, SkippedModel},
        records::{EvaluationRecord, LoadStats, SummaryRecord, TrialRecord},
        report::{AnyReport, EvaluationReport, ReportKind, ResourceReport},
        runner::{BatteryProgress, TrialRunner},
        sampler::{MemoryProbe, MetricSampler, ProcessMemoryProbe, TrialClock, TrialMetrics},
        scorer::{ChoiceScorer, Judgment, SimilarityScorer},
        BenchError, Result,
    };
}

pub use harness::Harness;
pub use runner::TrialRunner;
pub use sampler::MetricSampler;
