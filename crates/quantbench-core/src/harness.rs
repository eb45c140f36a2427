//! Model-by-model driver
//!
//! The harness walks a list of artifact paths. Each model is loaded, handed
//! to a battery closure and dropped before the next path is touched, so at
//! most one model is resident at a time. Missing artifacts, load failures and
//! battery failures skip the affected model and the run moves on.

use crate::{
    backend::{ModelHandle, ModelLoader},
    config::{FailurePolicy, ModelConfig},
    dataset::model_identity,
    records::LoadStats,
    runner::TrialRunner,
    sampler::{bytes_to_mb, MetricSampler},
    BenchError, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Result of one model's battery
#[derive(Debug, Clone)]
pub struct ModelRun<T> {
    pub model_name: String,
    pub path: PathBuf,
    pub model_size_mb: f64,
    pub load: LoadStats,
    pub result: T,
}

/// A model that produced no results, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedModel {
    pub model_name: String,
    pub path: PathBuf,
    pub code: String,
    pub message: String,
}

impl SkippedModel {
    fn new(path: &Path, error: &BenchError) -> Self {
        Self {
            model_name: model_identity(path),
            path: path.to_path_buf(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Completed runs in list order plus everything that was skipped
#[derive(Debug, Clone)]
pub struct RunOutcome<T> {
    pub runs: Vec<ModelRun<T>>,
    pub skipped: Vec<SkippedModel>,
}

impl<T> Default for RunOutcome<T> {
    fn default() -> Self {
        Self {
            runs: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> RunOutcome<T> {
    pub fn attempted(&self) -> usize {
        self.runs.len() + self.skipped.len()
    }

    pub fn completed(&self) -> usize {
        self.runs.len()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Loads each model in turn and runs a battery against it
pub struct Harness<L> {
    loader: L,
    config: ModelConfig,
    policy: FailurePolicy,
    sampler: MetricSampler,
}

impl<L: ModelLoader> Harness<L> {
    pub fn new(
        loader: L,
        config: ModelConfig,
        policy: FailurePolicy,
        sampler: MetricSampler,
    ) -> Result<Self> {
        config.validate()?;
        policy.validate()?;
        Ok(Self {
            loader,
            config,
            policy,
            sampler,
        })
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Trial runner sharing this harness's sampler and failure policy
    pub fn runner(&self) -> TrialRunner {
        TrialRunner::new(self.sampler.clone(), self.policy.clone())
    }

    /// Load one model and measure the cost of loading it.
    ///
    /// A model served by its own process did not exist before the load, so
    /// its load memory is that process's whole resident size. In-process
    /// models report the growth of the running process.
    pub fn load(&self, path: &Path) -> Result<(L::Handle, LoadStats)> {
        if !path.is_file() {
            return Err(BenchError::missing_artifact(path));
        }

        let before_mb = self.sampler.current_memory_mb();
        let started = Instant::now();
        let handle = self
            .policy
            .run("model load", || self.loader.load(path, &self.config))?;
        let load_time_s = started.elapsed().as_secs_f64();
        let load_memory_mb = match handle.process_id() {
            Some(pid) => self.sampler.for_process(Some(pid)).current_memory_mb(),
            None => self.sampler.current_memory_mb() - before_mb,
        };
        let stats = LoadStats {
            load_time_s,
            load_memory_mb,
        };

        info!("Model loaded in {:.2}s", stats.load_time_s);
        info!("Model memory usage: {:.2} MB", stats.load_memory_mb);
        Ok((handle, stats))
    }

    /// Run `battery` against every model in `paths`, in order.
    ///
    /// A path whose identity already produced results is skipped. Identities
    /// that were missing or failed stay free for later paths.
    pub fn run<T, F>(&self, paths: &[PathBuf], mut battery: F) -> RunOutcome<T>
    where
        F: FnMut(&L::Handle) -> Result<T>,
    {
        let mut outcome = RunOutcome::default();
        let mut completed = HashSet::new();

        for path in paths {
            let model_name = model_identity(path);
            if completed.contains(&model_name) {
                let err = BenchError::invalid_input(
                    "DUPLICATE_MODEL",
                    format!("{} appears more than once in the model list", model_name),
                    format!("Model path {}", path.display()),
                    "Results are keyed by file name; list each model once",
                );
                warn!("Skipping {}: {}", path.display(), err);
                outcome.skipped.push(SkippedModel::new(path, &err));
                continue;
            }

            info!("Loading model: {}", model_name);
            let (handle, load) = match self.load(path) {
                Ok(loaded) => loaded,
                Err(err) => {
                    warn!("Skipping {}: {}", model_name, err);
                    outcome.skipped.push(SkippedModel::new(path, &err));
                    continue;
                }
            };

            let model_size_mb = bytes_to_mb(handle.size_bytes());
            let result = battery(&handle);
            drop(handle);

            match result {
                Ok(result) => {
                    completed.insert(model_name.clone());
                    outcome.runs.push(ModelRun {
                        model_name,
                        path: path.clone(),
                        model_size_mb,
                        load,
                        result,
                    });
                }
                Err(err) => {
                    warn!("Battery for {} aborted: {}", model_name, err);
                    outcome.skipped.push(SkippedModel::new(path, &err));
                }
            }
        }

        info!(
            "Completed {} of {} models",
            outcome.completed(),
            outcome.attempted()
        );
        outcome
    }
}
