//! Result documents
//!
//! One JSON document per benchmark kind. Entries are keyed by model
//! identity and carry both the derived aggregate fields and the full record
//! set; `model_order` remembers the order the models were run in so that
//! ties in a comparison resolve the same way after a reload.

use crate::{
    aggregate::{
        ComparisonTable, EvaluationAggregate, PerformanceAggregate, Rankable, Statistic,
    },
    harness::{RunOutcome, SkippedModel},
    records::{EvaluationRecord, SummaryRecord},
    BenchError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Which battery produced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Resource,
    Accuracy,
    Mmlu,
}

impl ReportKind {
    /// Default output file name
    pub fn default_file_name(&self) -> &'static str {
        match self {
            Self::Resource => "benchmark_results.json",
            Self::Accuracy => "accuracy_results.json",
            Self::Mmlu => "mmlu_results.json",
        }
    }
}

/// Per-model part of a document
pub trait ReportEntry {
    type Aggregate: Rankable + Clone;

    fn aggregate(&self) -> &Self::Aggregate;
}

/// Resource battery results of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    #[serde(flatten)]
    pub aggregate: PerformanceAggregate,
    pub results: Vec<SummaryRecord>,
}

impl ReportEntry for ResourceEntry {
    type Aggregate = PerformanceAggregate;

    fn aggregate(&self) -> &PerformanceAggregate {
        &self.aggregate
    }
}

/// Accuracy or MMLU results of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationEntry {
    #[serde(flatten)]
    pub aggregate: EvaluationAggregate,
    pub results: Vec<EvaluationRecord>,
}

impl ReportEntry for EvaluationEntry {
    type Aggregate = EvaluationAggregate;

    fn aggregate(&self) -> &EvaluationAggregate {
        &self.aggregate
    }
}

/// A complete result document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report<E> {
    pub kind: ReportKind,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
    pub model_order: Vec<String>,
    pub models: BTreeMap<String, E>,
    #[serde(default)]
    pub skipped: Vec<SkippedModel>,
}

pub type ResourceReport = Report<ResourceEntry>;
pub type EvaluationReport = Report<EvaluationEntry>;

impl<E: ReportEntry> Report<E> {
    fn assemble(
        kind: ReportKind,
        entries: Vec<(String, E)>,
        skipped: Vec<SkippedModel>,
    ) -> Self {
        let model_order = entries.iter().map(|(name, _)| name.clone()).collect();
        Self {
            kind,
            generated_at: Utc::now(),
            similarity_threshold: None,
            model_order,
            models: entries.into_iter().collect(),
            skipped,
        }
    }

    /// Entries in the order the models were run
    pub fn entries(&self) -> impl Iterator<Item = (&str, &E)> {
        self.model_order
            .iter()
            .filter_map(|name| self.models.get(name).map(|e| (name.as_str(), e)))
    }

    /// Aggregates in the order the models were run
    pub fn aggregates(&self) -> Vec<E::Aggregate> {
        self.entries().map(|(_, e)| e.aggregate().clone()).collect()
    }

    /// Rank models by `by` in its preferred direction
    pub fn comparison(&self, by: Statistic) -> Result<ComparisonTable> {
        ComparisonTable::preferred(&self.aggregates(), by)
    }

    /// Number of models with results
    pub fn completed(&self) -> usize {
        self.models.len()
    }

    pub fn attempted(&self) -> usize {
        self.models.len() + self.skipped.len()
    }
}

impl ResourceReport {
    pub fn from_outcome(outcome: RunOutcome<Vec<SummaryRecord>>) -> Result<Self> {
        let entries = outcome
            .runs
            .into_iter()
            .map(|run| {
                let aggregate =
                    PerformanceAggregate::from_summaries(&run.model_name, run.load, &run.result)?;
                Ok((
                    run.model_name,
                    ResourceEntry {
                        aggregate,
                        results: run.result,
                    },
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::assemble(ReportKind::Resource, entries, outcome.skipped))
    }
}

impl EvaluationReport {
    pub fn from_outcome(
        kind: ReportKind,
        outcome: RunOutcome<Vec<EvaluationRecord>>,
        similarity_threshold: Option<f64>,
    ) -> Result<Self> {
        if kind == ReportKind::Resource {
            return Err(BenchError::invalid_input(
                "REPORT_KIND_MISMATCH",
                "Evaluation results cannot form a resource report",
                "Building an evaluation report",
                "Use ReportKind::Accuracy or ReportKind::Mmlu",
            ));
        }
        let entries = outcome
            .runs
            .into_iter()
            .map(|run| {
                let aggregate = EvaluationAggregate::from_records(&run.model_name, &run.result);
                (
                    run.model_name,
                    EvaluationEntry {
                        aggregate,
                        results: run.result,
                    },
                )
            })
            .collect();
        let mut report = Self::assemble(kind, entries, outcome.skipped);
        report.similarity_threshold = similarity_threshold;
        Ok(report)
    }
}

impl<E: Serialize> Report<E> {
    /// Write the document as pretty JSON, creating parent directories
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BenchError::from(e).with_path(parent))?;
        }
        let file = File::create(path).map_err(|e| BenchError::from(e).with_path(path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer
            .flush()
            .map_err(|e| BenchError::from(e).with_path(path))?;

        info!("Results saved to: {}", path.display());
        Ok(())
    }
}

/// A document of any kind, as found on disk
#[derive(Debug, Clone, PartialEq)]
pub enum AnyReport {
    Resource(ResourceReport),
    Evaluation(EvaluationReport),
}

#[derive(Deserialize)]
struct KindProbe {
    kind: ReportKind,
}

impl AnyReport {
    /// Load a document, dispatching on its `kind` field
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| BenchError::from(e).with_path(path))?;
        let probe: KindProbe = serde_json::from_str(&content)?;
        Ok(match probe.kind {
            ReportKind::Resource => Self::Resource(serde_json::from_str(&content)?),
            ReportKind::Accuracy | ReportKind::Mmlu => {
                Self::Evaluation(serde_json::from_str(&content)?)
            }
        })
    }

    pub fn kind(&self) -> ReportKind {
        match self {
            Self::Resource(r) => r.kind,
            Self::Evaluation(r) => r.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::ModelRun;
    use crate::records::LoadStats;
    use std::path::PathBuf;

    fn summary(model: &str, tps: f64) -> SummaryRecord {
        SummaryRecord {
            model_name: model.to_string(),
            model_size_mb: 700.0,
            prompt_tokens: 7,
            generated_tokens: 64,
            ttft_ms: 80.0,
            total_time_s: 2.0,
            tokens_per_second: tps,
            memory_used_mb: 3.0,
            peak_memory_mb: 12.0,
            prompt: "Write a short poem about AI.".to_string(),
            response: "Silicon dreams".to_string(),
            repetitions: 3,
        }
    }

    fn resource_outcome() -> RunOutcome<Vec<SummaryRecord>> {
        let run = |name: &str, tps: f64| ModelRun {
            model_name: name.to_string(),
            path: PathBuf::from(format!("/models/{}", name)),
            model_size_mb: 700.0,
            load: LoadStats {
                load_time_s: 1.5,
                load_memory_mb: 650.0,
            },
            result: vec![summary(name, tps)],
        };
        RunOutcome {
            runs: vec![run("zeta-q4_0.gguf", 20.0), run("alpha-q8_0.gguf", 20.0)],
            skipped: vec![SkippedModel {
                model_name: "gone.gguf".to_string(),
                path: PathBuf::from("/models/gone.gguf"),
                code: "MODEL_NOT_FOUND".to_string(),
                message: "Model not found: /models/gone.gguf".to_string(),
            }],
        }
    }

    #[test]
    fn test_resource_report_keeps_run_order_for_ties() {
        let report = ResourceReport::from_outcome(resource_outcome()).unwrap();
        assert_eq!(report.attempted(), 3);
        assert_eq!(report.completed(), 2);

        let table = report.comparison(Statistic::MeanThroughput).unwrap();
        assert_eq!(table.best(), Some("zeta-q4_0.gguf"));
        assert_eq!(table.rows[1].model_name, "alpha-q8_0.gguf");
    }

    #[test]
    fn test_save_and_reload_any_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(ReportKind::Resource.default_file_name());
        let report = ResourceReport::from_outcome(resource_outcome()).unwrap();
        report.save_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["kind"], "resource");
        assert_eq!(json["models"]["zeta-q4_0.gguf"]["mean_tokens_per_second"], 20.0);
        assert_eq!(json["models"]["zeta-q4_0.gguf"]["results"][0]["repetitions"], 3);
        assert_eq!(json["skipped"][0]["code"], "MODEL_NOT_FOUND");

        match AnyReport::load(&path).unwrap() {
            AnyReport::Resource(reloaded) => assert_eq!(reloaded, report),
            other => panic!("unexpected report {:?}", other.kind()),
        }
    }

    #[test]
    fn test_evaluation_report_records_threshold() {
        let records = vec![EvaluationRecord {
            model_name: "m.gguf".to_string(),
            subject: None,
            question: "What is the capital of France?".to_string(),
            expected_answer: "Paris".to_string(),
            predicted_answer: "Paris".to_string(),
            extracted_choice: None,
            similarity_score: 1.0,
            correct: true,
        }];
        let outcome = RunOutcome {
            runs: vec![ModelRun {
                model_name: "m.gguf".to_string(),
                path: PathBuf::from("m.gguf"),
                model_size_mb: 1.0,
                load: LoadStats::default(),
                result: records,
            }],
            skipped: Vec::new(),
        };
        let report =
            EvaluationReport::from_outcome(ReportKind::Accuracy, outcome, Some(0.7)).unwrap();
        assert_eq!(report.similarity_threshold, Some(0.7));
        assert_eq!(report.models["m.gguf"].aggregate.accuracy, 100.0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["models"]["m.gguf"]["median_similarity"], 1.0);
    }

    #[test]
    fn test_resource_kind_rejected_for_evaluations() {
        let err = EvaluationReport::from_outcome(ReportKind::Resource, RunOutcome::default(), None)
            .unwrap_err();
        assert_eq!(err.code(), "REPORT_KIND_MISMATCH");
    }
}
