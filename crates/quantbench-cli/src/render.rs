//! Console rendering of result documents

use crate::utils::truncate;
use console::style;
use quantbench_core::{
    aggregate::{ComparisonTable, Statistic},
    harness::SkippedModel,
    report::{EvaluationReport, ReportKind, ResourceReport},
};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct PromptRow {
    #[tabled(rename = "Prompt")]
    prompt: String,
    #[tabled(rename = "TTFT (ms)")]
    ttft_ms: String,
    #[tabled(rename = "Speed (t/s)")]
    speed: String,
    #[tabled(rename = "Peak memory (MB)")]
    peak_mb: String,
}

#[derive(Tabled)]
struct ResourceComparisonRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Size (MB)")]
    size_mb: String,
    #[tabled(rename = "Avg TTFT (ms)")]
    ttft_ms: String,
    #[tabled(rename = "Avg speed (t/s)")]
    speed: String,
    #[tabled(rename = "Avg peak (MB)")]
    peak_mb: String,
    #[tabled(rename = "Load (s)")]
    load_s: String,
}

#[derive(Tabled)]
struct EvaluationComparisonRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Correct")]
    correct: String,
    #[tabled(rename = "Mean score")]
    mean: String,
    #[tabled(rename = "Median score")]
    median: String,
}

#[derive(Tabled)]
struct SubjectRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Correct")]
    correct: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
}

#[derive(Tabled)]
struct RankingRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Relative to best")]
    relative: String,
}

fn heading(text: &str) {
    println!();
    println!("{}", style(text).bold().cyan());
    println!("{}", "=".repeat(80));
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::modern()).to_string();
    println!("{}", table);
}

pub fn print_resource_report(report: &ResourceReport) {
    heading("BENCHMARK RESULTS SUMMARY");

    for (name, entry) in report.entries() {
        let aggregate = &entry.aggregate;
        println!();
        println!("{} {}", style("Model:").bold(), style(name).green().bold());
        println!(
            "Size: {:.2} MB | Load: {:.2}s, {:.1} MB",
            aggregate.model_size_mb, aggregate.load.load_time_s, aggregate.load.load_memory_mb
        );

        let mut rows: Vec<PromptRow> = entry
            .results
            .iter()
            .map(|r| PromptRow {
                prompt: truncate(&r.prompt, 40),
                ttft_ms: format!("{:.0}", r.ttft_ms),
                speed: format!("{:.2}", r.tokens_per_second),
                peak_mb: format!("{:.0}", r.peak_memory_mb),
            })
            .collect();
        rows.push(PromptRow {
            prompt: "AVERAGE".to_string(),
            ttft_ms: format!("{:.0}", aggregate.mean_ttft_ms),
            speed: format!("{:.2}", aggregate.mean_tokens_per_second),
            peak_mb: format!("{:.0}", aggregate.mean_peak_memory_mb),
        });
        print_table(rows);
    }

    if let Ok(ranking) = report.comparison(Statistic::MeanThroughput) {
        heading("MODEL COMPARISON");
        let rows: Vec<ResourceComparisonRow> = ranking
            .rows
            .iter()
            .filter_map(|row| report.models.get(&row.model_name).map(|e| (row, e)))
            .map(|(row, entry)| ResourceComparisonRow {
                rank: row.rank,
                model: truncate(&row.model_name, 40),
                size_mb: format!("{:.0}", entry.aggregate.model_size_mb),
                ttft_ms: format!("{:.0}", entry.aggregate.mean_ttft_ms),
                speed: format!("{:.2}", entry.aggregate.mean_tokens_per_second),
                peak_mb: format!("{:.0}", entry.aggregate.mean_peak_memory_mb),
                load_s: format!("{:.2}", entry.aggregate.load.load_time_s),
            })
            .collect();
        print_table(rows);
    }

    print_skipped(&report.skipped, report.attempted());
}

pub fn print_evaluation_report(report: &EvaluationReport) {
    let title = match report.kind {
        ReportKind::Mmlu => "MMLU RESULTS SUMMARY",
        _ => "EVALUATION RESULTS SUMMARY",
    };
    heading(title);
    if let Some(threshold) = report.similarity_threshold {
        println!("Similarity threshold: {}", threshold);
    }

    for (name, entry) in report.entries() {
        let aggregate = &entry.aggregate;
        println!();
        println!("{} {}", style("Model:").bold(), style(name).green().bold());
        println!(
            "Accuracy: {:.2}% ({}/{})",
            aggregate.accuracy, aggregate.correct, aggregate.total
        );
        if report.kind == ReportKind::Accuracy {
            println!(
                "Mean similarity: {:.3} | Median similarity: {:.3}",
                aggregate.mean_similarity, aggregate.median_similarity
            );
        }
        if !aggregate.subjects.is_empty() {
            let rows: Vec<SubjectRow> = aggregate
                .subjects
                .iter()
                .map(|(subject, acc)| SubjectRow {
                    subject: subject.clone(),
                    correct: format!("{}/{}", acc.correct, acc.total),
                    accuracy: format!("{:.2}%", acc.accuracy),
                })
                .collect();
            print_table(rows);
        }
    }

    if let Ok(ranking) = report.comparison(Statistic::AccuracyRate) {
        heading("MODEL COMPARISON");
        let rows: Vec<EvaluationComparisonRow> = ranking
            .rows
            .iter()
            .filter_map(|row| report.models.get(&row.model_name).map(|e| (row, e)))
            .map(|(row, entry)| EvaluationComparisonRow {
                rank: row.rank,
                model: truncate(&row.model_name, 40),
                accuracy: format!("{:.2}%", entry.aggregate.accuracy),
                correct: format!("{}/{}", entry.aggregate.correct, entry.aggregate.total),
                mean: format!("{:.3}", entry.aggregate.mean_similarity),
                median: format!("{:.3}", entry.aggregate.median_similarity),
            })
            .collect();
        print_table(rows);
    }

    print_skipped(&report.skipped, report.attempted());
}

/// Generic ranking view of any comparison
pub fn print_ranking(table: &ComparisonTable) {
    heading(&format!("Ranking by {}", table.statistic.label()));
    let rows: Vec<RankingRow> = table
        .rows
        .iter()
        .map(|row| RankingRow {
            rank: row.rank,
            model: row.model_name.clone(),
            value: format!("{:.3}", row.value),
            relative: row
                .relative_to_best
                .map(|r| format!("{:.2}x", r))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    print_table(rows);
}

pub fn print_skipped(skipped: &[SkippedModel], attempted: usize) {
    let completed = attempted - skipped.len();
    println!();
    println!(
        "{} Completed {} of {} models",
        style("Summary:").bold(),
        completed,
        attempted
    );
    for model in skipped {
        println!(
            "  {} {} [{}] {}",
            style("skipped").yellow(),
            model.model_name,
            model.code,
            model.message
        );
    }
}
