//! Command implementations for the Quantbench CLI

pub mod accuracy;
pub mod mmlu;
pub mod resource;
pub mod show;

use anyhow::{Context, Result};
use quantbench_core::{
    dataset::read_model_list, harness::Harness, report::ReportKind, sampler::MetricSampler,
};
use quantbench_llama::LlamaServerLoader;
use std::path::{Path, PathBuf};

use crate::config::{expand_path, Config};
use crate::utils::{print_warning, Ui};

/// Trait for CLI command execution
pub trait Command {
    /// Execute the command
    fn execute(&self, config: &Config, ui: Ui) -> Result<()>;
}

/// Model paths from `--models` or the configured list
fn model_paths(config: &Config, list_override: Option<&Path>) -> Result<Vec<PathBuf>> {
    let list = expand_path(list_override.unwrap_or(config.model_list.as_path()))?;
    let paths = read_model_list(&list)
        .with_context(|| format!("Failed to read model list: {}", list.display()))?;
    if paths.is_empty() {
        anyhow::bail!("No models listed in {}", list.display());
    }
    Ok(paths)
}

fn build_harness(config: &Config) -> Result<Harness<LlamaServerLoader>> {
    let loader = LlamaServerLoader::new(config.server.clone())?;
    Ok(Harness::new(
        loader,
        config.model.clone(),
        config.failure_policy.clone(),
        MetricSampler::for_current_process(),
    )?)
}

/// Where to write the document of `kind`
fn output_path(config: &Config, path_override: Option<&Path>, kind: ReportKind) -> Result<PathBuf> {
    match path_override {
        Some(path) => expand_path(path),
        None => Ok(expand_path(&config.output_dir)?.join(kind.default_file_name())),
    }
}

/// A run where every model was skipped is a failure
fn ensure_completed(completed: usize, attempted: usize) -> Result<()> {
    if completed == 0 {
        anyhow::bail!("No model completed its battery ({} attempted)", attempted);
    }
    if completed < attempted {
        print_warning(&format!(
            "{} of {} models were skipped; see the result document for reasons",
            attempted - completed,
            attempted
        ));
    }
    Ok(())
}
