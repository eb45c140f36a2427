//! Multiple-choice battery over an MMLU-style question bank

use anyhow::{Context, Result};
use clap::Args;
use quantbench_core::{
    dataset::{load_mmlu, Split},
    evaluate::evaluate_multiple_choice,
    report::{EvaluationReport, ReportKind},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{build_harness, ensure_completed, model_paths, output_path, Command};
use crate::config::{expand_path, Config};
use crate::render;
use crate::utils::{format_duration, print_json, print_success, BarProgress, Ui};

#[derive(Args, Debug, Default)]
pub struct MmluCommand {
    /// Model list file (one GGUF path per line)
    #[arg(short, long)]
    pub models: Option<PathBuf>,

    /// Root holding `<split>/<subject>.jsonl`
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// `all` or a comma-separated list of subjects
    #[arg(short, long)]
    pub subjects: Option<String>,

    /// Dataset split (test, validation, dev)
    #[arg(long)]
    pub split: Option<Split>,

    /// Questions per subject, in file order
    #[arg(short = 'n', long)]
    pub samples: Option<usize>,

    /// Use every question of each subject
    #[arg(long, conflicts_with = "samples")]
    pub all_samples: bool,

    /// Output document path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl MmluCommand {
    fn effective_config(&self, config: &Config) -> Config {
        let mut config = config.clone();
        if let Some(dir) = &self.data_dir {
            config.mmlu.data_dir = dir.clone();
        }
        if let Some(subjects) = &self.subjects {
            config.mmlu.subjects = subjects.clone();
        }
        if let Some(split) = self.split {
            config.mmlu.split = split;
        }
        if self.all_samples {
            config.mmlu.samples_per_subject = None;
        } else if let Some(samples) = self.samples {
            config.mmlu.samples_per_subject = Some(samples);
        }
        config
    }
}

impl Command for MmluCommand {
    fn execute(&self, config: &Config, ui: Ui) -> Result<()> {
        debug!("Executing mmlu command: {:?}", self);

        let config = self.effective_config(config);
        config.validate()?;

        let data_dir = expand_path(&config.mmlu.data_dir)?;
        let dataset = load_mmlu(
            &data_dir,
            &config.mmlu.scope()?,
            config.mmlu.split,
            config.mmlu.samples_per_subject,
        )
        .with_context(|| format!("Failed to load MMLU data from {}", data_dir.display()))?;
        if dataset.is_empty() {
            anyhow::bail!("No MMLU questions found under {}", data_dir.display());
        }
        if ui.interactive() {
            println!(
                "Loaded {} questions from {} subjects",
                dataset.len(),
                dataset.subject_count()
            );
        }

        let paths = model_paths(&config, self.models.as_deref())?;
        let output = output_path(&config, self.output.as_deref(), ReportKind::Mmlu)?;
        info!(
            "Evaluating {} models on {} {} questions",
            paths.len(),
            dataset.len(),
            config.mmlu.split
        );

        let harness = build_harness(&config)?;
        let runner = harness
            .runner()
            .with_progress(Arc::new(BarProgress::new(ui)));
        let params = config.mmlu.params();
        let started = Instant::now();

        let outcome = harness.run(&paths, |handle| {
            evaluate_multiple_choice(&runner, handle, &dataset, &params)
        });

        let report = EvaluationReport::from_outcome(ReportKind::Mmlu, outcome, None)?;
        report.save_json(&output)?;

        if ui.json {
            print_json(&report)?;
        } else if !ui.quiet {
            render::print_evaluation_report(&report);
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
    fn test_sample_overrides() {
        let command = MmluCommand {
            subjects: Some("astronomy,virology".to_string()),
            split: Some(Split::Dev),
            samples: Some(5),
            ..Default::default()
        };
        let config = command.effective_config(&Config::default());
        assert_eq!(config.mmlu.split, Split::Dev);
        assert_eq!(config.mmlu.samples_per_subject, Some(5));
        assert!(config.validate().is_ok());

        let command = MmluCommand {
            all_samples: true,
            ..Default::default()
        };
        let config = command.effective_config(&Config::default());
        assert_eq!(config.mmlu.samples_per_subject, None);
    }
}
