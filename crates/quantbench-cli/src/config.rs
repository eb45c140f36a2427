//! Configuration management for the Quantbench CLI

use anyhow::{Context, Result};
use quantbench_core::{
    config::{FailurePolicy, GenerationParams, ModelConfig},
    dataset::{Split, SubjectScope},
};
use quantbench_llama::{EmbeddingConfig, LlamaServerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Newline-delimited list of model paths
    pub model_list: PathBuf,

    /// Directory result documents are written to
    pub output_dir: PathBuf,

    /// How each model is initialized
    pub model: ModelConfig,

    /// llama-server launch settings
    pub server: LlamaServerConfig,

    /// Embedding endpoint for similarity scoring
    pub embedding: EmbeddingConfig,

    /// Resource battery settings
    pub resource: ResourceConfig,

    /// Free-form accuracy battery settings
    pub accuracy: AccuracyConfig,

    /// Multiple-choice battery settings
    pub mmlu: MmluConfig,

    /// Behavior on load and generation failures
    pub failure_policy: FailurePolicy,
}

/// Resource battery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub repetitions: usize,
    pub prompts: Vec<String>,
}

/// Free-form accuracy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyConfig {
    /// JSON array of question/answer pairs
    pub dataset: PathBuf,
    pub similarity_threshold: f64,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// MMLU configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmluConfig {
    /// Root of `<split>/<subject>.jsonl` files
    pub data_dir: PathBuf,
    /// `all` or a comma-separated subject list
    pub subjects: String,
    pub split: Split,
    /// First N questions per subject; all when unset
    pub samples_per_subject: Option<usize>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_list: PathBuf::from("models.txt"),
            output_dir: PathBuf::from("."),
            model: ModelConfig::default(),
            server: LlamaServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            resource: ResourceConfig::default(),
            accuracy: AccuracyConfig::default(),
            mmlu: MmluConfig::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        let params = GenerationParams::resource();
        Self {
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            repetitions: 3,
            prompts: vec![
                "Write a short poem about AI.".to_string(),
                "Explain quantum computing in simple terms.".to_string(),
                "What are the benefits of exercise?".to_string(),
            ],
        }
    }
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        let params = GenerationParams::free_form();
        Self {
            dataset: PathBuf::from("evaluation_set.json"),
            similarity_threshold: 0.7,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        }
    }
}

impl Default for MmluConfig {
    fn default() -> Self {
        let params = GenerationParams::multiple_choice();
        Self {
            data_dir: PathBuf::from("data/mmlu"),
            subjects: "all".to_string(),
            split: Split::Test,
            samples_per_subject: Some(100),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        }
    }
}

impl ResourceConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..GenerationParams::resource()
        }
    }
}

impl AccuracyConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..GenerationParams::free_form()
        }
    }
}

impl MmluConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..GenerationParams::multiple_choice()
        }
    }

    pub fn scope(&self) -> Result<SubjectScope> {
        Ok(self.subjects.parse()?)
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?;

            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
            .join("quantbench")
            .join("config.toml")
    }

    /// Check every section before a run starts
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.server.validate()?;
        self.failure_policy.validate()?;
        self.resource.params().validate()?;
        self.accuracy.params().validate()?;
        self.mmlu.params().validate()?;
        self.mmlu.scope()?;
        if self.resource.repetitions == 0 {
            anyhow::bail!("INVALID_REPETITIONS: resource.repetitions must be at least 1");
        }
        if !(-1.0..=1.0).contains(&self.accuracy.similarity_threshold) {
            anyhow::bail!(
                "INVALID_SIMILARITY_THRESHOLD: accuracy.similarity_threshold must lie in [-1, 1], got {}",
                self.accuracy.similarity_threshold
            );
        }
        Ok(())
    }
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand shell variables in path: {}", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
