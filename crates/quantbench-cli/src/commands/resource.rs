//! Resource battery: TTFT, throughput and memory per model

use anyhow::Result;
use clap::Args;
use quantbench_core::report::{ReportKind, ResourceReport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{build_harness, ensure_completed, model_paths, output_path, Command};
use crate::config::Config;
use crate::render;
use crate::utils::{format_duration, print_json, print_success, BarProgress, Ui};

#[derive(Args, Debug, Default)]
pub struct ResourceCommand {
    /// Model list file (one GGUF path per line)
    #[arg(short, long)]
    pub models: Option<PathBuf>,

    /// Prompt to benchmark; repeat for several
    #[arg(short, long = "prompt")]
    pub prompts: Vec<String>,

    /// Runs per prompt
    #[arg(short, long)]
    pub repetitions: Option<usize>,

    /// Maximum tokens per generation
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Output document path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ResourceCommand {
    /// Configuration with command-line overrides applied
    fn effective_config(&self, config: &Config) -> Config {
        let mut config = config.clone();
        if !self.prompts.is_empty() {
            config.resource.prompts = self.prompts.clone();
        }
        if let Some(repetitions) = self.repetitions {
            config.resource.repetitions = repetitions;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.resource.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.resource.temperature = temperature;
        }
        config
    }
}

impl Command for ResourceCommand {
    fn execute(&self, config: &Config, ui: Ui) -> Result<()> {
        debug!("Executing resource command: {:?}", self);

        let config = self.effective_config(config);
        config.validate()?;
        if config.resource.prompts.is_empty() {
            anyhow::bail!("No prompts configured. Use --prompt or set resource.prompts in config.");
        }

        let paths = model_paths(&config, self.models.as_deref())?;
        let output = output_path(&config, self.output.as_deref(), ReportKind::Resource)?;
        info!(
            "Benchmarking {} models on {} prompts x {} repetitions",
            paths.len(),
            config.resource.prompts.len(),
            config.resource.repetitions
        );

        let harness = build_harness(&config)?;
        let runner = harness
            .runner()
            .with_progress(Arc::new(BarProgress::new(ui)));
        let params = config.resource.params();
        let started = Instant::now();

        let outcome = harness.run(&paths, |handle| {
            runner.run_battery(
                handle,
                &config.resource.prompts,
                &params,
                config.resource.repetitions,
            )
        });

        let report = ResourceReport::from_outcome(outcome)?;
        report.save_json(&output)?;

        if ui.json {
            print_json(&report)?;
        } else if !ui.quiet {
            render::print_resource_report(&report);
            print_success(&format!(
                "Results saved to: {} ({})",
                output.display(),
                format_duration(started.elapsed())
            ));
        }

        ensure_completed(report.completed(), report.attempted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let command = ResourceCommand {
            prompts: vec!["Hi".to_string()],
            repetitions: Some(5),
            max_tokens: Some(32),
            ..Default::default()
        };
        let config = command.effective_config(&Config::default());
        assert_eq!(config.resource.prompts, vec!["Hi"]);
        assert_eq!(config.resource.repetitions, 5);
        assert_eq!(config.resource.params().max_tokens, 32);
        assert_eq!(config.resource.temperature, 0.7);
    }

    #[test]
    fn test_no_overrides_keeps_default_prompts() {
        let config = ResourceCommand::default().effective_config(&Config::default());
        assert_eq!(config.resource.prompts.len(), 3);
    }
}
