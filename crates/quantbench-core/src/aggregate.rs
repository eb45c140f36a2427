//! Reduction of raw records into summaries and cross-model comparisons
//!
//! All reductions are plain arithmetic means with no outlier trimming, so a
//! single stalled generation shows up in the reported average. Rankings use a
//! stable sort: models whose statistic compares exactly equal keep the order
//! in which their batteries ran.

use crate::{
    records::{EvaluationRecord, LoadStats, SummaryRecord, TrialRecord},
    BenchError, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Arithmetic mean, `None` for an empty input
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Median (mean of the two middle values for even counts)
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn rounded_mean<I>(counts: I) -> usize
where
    I: IntoIterator<Item = usize>,
{
    mean(counts.into_iter().map(|c| c as f64))
        .map(|m| m.round() as usize)
        .unwrap_or(0)
}

/// Reduce the repetitions of one (model, input) pair into a summary
pub fn summarize(records: &[TrialRecord]) -> Result<SummaryRecord> {
    let first = records.first().ok_or_else(|| {
        BenchError::invalid_input(
            "SUMMARY_EMPTY",
            "Cannot summarize an empty set of trials",
            "Reducing repetitions into a summary record",
            "Run at least one repetition per input",
        )
    })?;

    let field_mean = |f: fn(&TrialRecord) -> f64| mean(records.iter().map(f)).unwrap_or(0.0);

    Ok(SummaryRecord {
        model_name: first.model_name.clone(),
        model_size_mb: first.model_size_mb,
        prompt_tokens: rounded_mean(records.iter().map(|r| r.prompt_tokens)),
        generated_tokens: rounded_mean(records.iter().map(|r| r.generated_tokens)),
        ttft_ms: field_mean(|r| r.ttft_ms),
        total_time_s: field_mean(|r| r.total_time_s),
        tokens_per_second: field_mean(|r| r.tokens_per_second),
        memory_used_mb: field_mean(|r| r.memory_used_mb),
        peak_memory_mb: field_mean(|r| r.peak_memory_mb),
        prompt: first.prompt.clone(),
        response: first.response.clone(),
        repetitions: records.len(),
    })
}

/// Statistic a comparison can be ranked by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    AccuracyRate,
    MeanSimilarity,
    MeanThroughput,
    MeanTtft,
    MeanPeakMemory,
}

impl Statistic {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AccuracyRate => "Accuracy",
            Self::MeanSimilarity => "Mean Similarity",
            Self::MeanThroughput => "Avg Speed (t/s)",
            Self::MeanTtft => "Avg TTFT (ms)",
            Self::MeanPeakMemory => "Avg Memory (MB)",
        }
    }

    /// Direction in which the statistic improves
    pub fn preferred_direction(&self) -> Direction {
        match self {
            Self::AccuracyRate | Self::MeanSimilarity | Self::MeanThroughput => {
                Direction::Descending
            }
            Self::MeanTtft | Self::MeanPeakMemory => Direction::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    Descending,
}

/// Per-model aggregate that exposes rankable statistics
pub trait Rankable {
    fn model_name(&self) -> &str;

    /// Value of `statistic`, `None` when this aggregate does not track it
    fn statistic(&self, statistic: Statistic) -> Option<f64>;
}

/// Resource battery results of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAggregate {
    pub model_name: String,
    pub model_size_mb: f64,
    pub load: LoadStats,
    pub prompts: usize,
    pub mean_ttft_ms: f64,
    pub mean_tokens_per_second: f64,
    pub mean_memory_used_mb: f64,
    pub mean_peak_memory_mb: f64,
}

impl PerformanceAggregate {
    pub fn from_summaries(
        model_name: &str,
        load: LoadStats,
        summaries: &[SummaryRecord],
    ) -> Result<Self> {
        let first = summaries.first().ok_or_else(|| {
            BenchError::invalid_input(
                "AGGREGATE_EMPTY",
                format!("No summaries recorded for {}", model_name),
                "Aggregating a model's resource battery",
                "Provide at least one prompt in the battery",
            )
        })?;

        Ok(Self {
            model_name: model_name.to_string(),
            model_size_mb: first.model_size_mb,
            load,
            prompts: summaries.len(),
            mean_ttft_ms: mean(summaries.iter().map(|s| s.ttft_ms)).unwrap_or(0.0),
            mean_tokens_per_second: mean(summaries.iter().map(|s| s.tokens_per_second))
                .unwrap_or(0.0),
            mean_memory_used_mb: mean(summaries.iter().map(|s| s.memory_used_mb)).unwrap_or(0.0),
            mean_peak_memory_mb: mean(summaries.iter().map(|s| s.peak_memory_mb)).unwrap_or(0.0),
        })
    }
}

impl Rankable for PerformanceAggregate {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn statistic(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::MeanThroughput => Some(self.mean_tokens_per_second),
            Statistic::MeanTtft => Some(self.mean_ttft_ms),
            Statistic::MeanPeakMemory => Some(self.mean_peak_memory_mb),
            Statistic::AccuracyRate | Statistic::MeanSimilarity => None,
        }
    }
}

/// Accuracy within one MMLU subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAccuracy {
    pub correct: usize,
    pub total: usize,
    pub accuracy: f64,
}

/// Accuracy battery results of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationAggregate {
    pub model_name: String,
    pub correct: usize,
    pub total: usize,
    /// Percentage of correct answers
    pub accuracy: f64,
    pub mean_similarity: f64,
    pub median_similarity: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subjects: BTreeMap<String, SubjectAccuracy>,
}

impl EvaluationAggregate {
    pub fn from_records(model_name: &str, records: &[EvaluationRecord]) -> Self {
        let total = records.len();
        let correct = records.iter().filter(|r| r.correct).count();
        let scores: Vec<f64> = records.iter().map(|r| r.similarity_score).collect();

        let mut subjects: BTreeMap<String, SubjectAccuracy> = BTreeMap::new();
        for record in records {
            if let Some(subject) = &record.subject {
                let entry = subjects.entry(subject.clone()).or_insert(SubjectAccuracy {
                    correct: 0,
                    total: 0,
                    accuracy: 0.0,
                });
                entry.total += 1;
                if record.correct {
                    entry.correct += 1;
                }
            }
        }
        for entry in subjects.values_mut() {
            entry.accuracy = percentage(entry.correct, entry.total);
        }

        Self {
            model_name: model_name.to_string(),
            correct,
            total,
            accuracy: percentage(correct, total),
            mean_similarity: mean(scores.iter().copied()).unwrap_or(0.0),
            median_similarity: median(&scores).unwrap_or(0.0),
            subjects,
        }
    }

    /// Fraction of correct answers in [0, 1]
    pub fn accuracy_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl Rankable for EvaluationAggregate {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn statistic(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::AccuracyRate => Some(self.accuracy_rate()),
            Statistic::MeanSimilarity => Some(self.mean_similarity),
            _ => None,
        }
    }
}

fn percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

fn ranked_values<T: Rankable>(
    items: &[T],
    by: Statistic,
    direction: Direction,
) -> Result<Vec<(&T, f64)>> {
    let mut values = items
        .iter()
        .map(|item| {
            item.statistic(by).map(|v| (item, v)).ok_or_else(|| {
                BenchError::invalid_parameter(
                    "STATISTIC_UNAVAILABLE",
                    format!("{} is not tracked for {}", by.label(), item.model_name()),
                    "Ranking per-model aggregates",
                    "Rank resource results by speed, TTFT or memory and accuracy results by accuracy or similarity",
                    "statistic",
                    format!("{:?}", by),
                    "a statistic tracked by every aggregate",
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // sort_by is stable; equal values keep battery order
    match direction {
        Direction::Ascending => values.sort_by(|a, b| a.1.total_cmp(&b.1)),
        Direction::Descending => values.sort_by(|a, b| b.1.total_cmp(&a.1)),
    }
    Ok(values)
}

/// Order model identities by a statistic
pub fn rank<T: Rankable>(items: &[T], by: Statistic, direction: Direction) -> Result<Vec<String>> {
    Ok(ranked_values(items, by, direction)?
        .into_iter()
        .map(|(item, _)| item.model_name().to_string())
        .collect())
}

/// One row of a comparison table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub rank: usize,
    pub model_name: String,
    pub value: f64,
    /// Value divided by the leading model's value
    pub relative_to_best: Option<f64>,
}

/// Derived ranking view; recomputed on demand and never authoritative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub statistic: Statistic,
    pub direction: Direction,
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn build<T: Rankable>(items: &[T], by: Statistic, direction: Direction) -> Result<Self> {
        let values = ranked_values(items, by, direction)?;
        let best = values.first().map(|(_, v)| *v);

        let rows = values
            .into_iter()
            .enumerate()
            .map(|(i, (item, value))| ComparisonRow {
                rank: i + 1,
                model_name: item.model_name().to_string(),
                value,
                relative_to_best: best.filter(|b| *b != 0.0).map(|b| value / b),
            })
            .collect();

        Ok(Self {
            statistic: by,
            direction,
            rows,
        })
    }

    /// Rank in the statistic's preferred direction
    pub fn preferred<T: Rankable>(items: &[T], by: Statistic) -> Result<Self> {
        Self::build(items, by, by.preferred_direction())
    }

    pub fn best(&self) -> Option<&str> {
        self.rows.first().map(|r| r.model_name.as_str())
    }

    /// Generate markdown report
    pub fn to_markdown(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!("# Model Comparison by {}\n\n", self.statistic.label()));
        if let Some(best) = self.best() {
            report.push_str(&format!("**Best**: {}\n\n", best));
        }

        report.push_str(&format!(
            "| Rank | Model | {} | Relative to Best |\n",
            self.statistic.label()
        ));
        report.push_str("|------|-------|-------|------------------|\n");

        for row in &self.rows {
            let relative = row
                .relative_to_best
                .map(|r| format!("{:.2}x", r))
                .unwrap_or_else(|| "-".to_string());
            report.push_str(&format!(
                "| {} | {} | {:.3} | {} |\n",
                row.rank, row.model_name, row.value, relative
            ));
        }

        report
    }
}
