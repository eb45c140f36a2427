//! Free-form accuracy battery scored by semantic similarity

use anyhow::{Context, Result};
use clap::Args;
use quantbench_core::{
    dataset::load_qa_dataset,
    evaluate::evaluate_free_form,
    report::{EvaluationReport, ReportKind},
    scorer::SimilarityScorer,
};
use quantbench_llama::HttpEmbedder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{build_harness, ensure_completed, model_paths, output_path, Command};
use crate::config::{expand_path, Config};
use crate::render;
use crate::utils::{format_duration, print_json, print_success, BarProgress, Ui};

#[derive(Args, Debug, Default)]
pub struct AccuracyCommand {
    /// Model list file (one GGUF path per line)
    #[arg(short, long)]
    pub models: Option<PathBuf>,

    /// Q&A dataset (JSON array of question/answer objects)
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Minimum cosine similarity counted as correct
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Embedding server base URL
    #[arg(long)]
    pub embedding_endpoint: Option<String>,

    /// Maximum tokens per answer
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Output document path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl AccuracyCommand {
    fn effective_config(&self, config: &Config) -> Config {
        let mut config = config.clone();
        if let Some(dataset) = &self.dataset {
            config.accuracy.dataset = dataset.clone();
        }
        if let Some(threshold) = self.threshold {
            config.accuracy.similarity_threshold = threshold;
        }
        if let Some(endpoint) = &self.embedding_endpoint {
            config.embedding.endpoint = endpoint.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.accuracy.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.accuracy.temperature = temperature;
        }
        config
    }
}

impl Command for AccuracyCommand {
    fn execute(&self, config: &Config, ui: Ui) -> Result<()> {
        debug!("Executing accuracy command: {:?}", self);

        let config = self.effective_config(config);
        config.validate()?;

        let dataset_path = expand_path(&config.accuracy.dataset)?;
        let pairs = load_qa_dataset(&dataset_path)
            .with_context(|| format!("Failed to load Q&A dataset: {}", dataset_path.display()))?;
        if pairs.is_empty() {
            anyhow::bail!("Q&A dataset {} is empty", dataset_path.display());
        }

        let paths = model_paths(&config, self.models.as_deref())?;
        let output = output_path(&config, self.output.as_deref(), ReportKind::Accuracy)?;
        let threshold = config.accuracy.similarity_threshold;
        info!(
            "Evaluating {} models on {} questions (threshold {})",
            paths.len(),
            pairs.len(),
            threshold
        );

        let embedder = HttpEmbedder::new(&config.embedding)?;
        info!("Using embedding endpoint: {}", embedder.url());
        let scorer = SimilarityScorer::new(Arc::new(embedder), threshold)?;

        let harness = build_harness(&config)?;
        let runner = harness
            .runner()
            .with_progress(Arc::new(BarProgress::new(ui)));
        let params = config.accuracy.params();
        let started = Instant::now();

        let outcome = harness.run(&paths, |handle| {
            evaluate_free_form(&runner, handle, &pairs, &params, &scorer)
        });

        let report =
            EvaluationReport::from_outcome(ReportKind::Accuracy, outcome, Some(threshold))?;
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
