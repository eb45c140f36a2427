//! Render a saved result document

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use quantbench_core::{aggregate::Statistic, report::AnyReport};
use std::path::PathBuf;
use tracing::debug;

use super::Command;
use crate::config::{expand_path, Config};
use crate::render;
use crate::utils::{print_json, Ui};

#[derive(Args, Debug)]
pub struct ShowCommand {
    /// Result document written by `resource`, `accuracy` or `mmlu`
    pub path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: ShowFormat,

    /// Rank models by this statistic
    #[arg(short, long, value_enum)]
    pub by: Option<RankBy>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShowFormat {
    Table,
    Markdown,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RankBy {
    Throughput,
    Ttft,
    Memory,
    Accuracy,
    Similarity,
}

impl From<RankBy> for Statistic {
    fn from(by: RankBy) -> Self {
        match by {
            RankBy::Throughput => Statistic::MeanThroughput,
            RankBy::Ttft => Statistic::MeanTtft,
            RankBy::Memory => Statistic::MeanPeakMemory,
            RankBy::Accuracy => Statistic::AccuracyRate,
            RankBy::Similarity => Statistic::MeanSimilarity,
        }
    }
}

fn default_statistic(report: &AnyReport) -> Statistic {
    match report {
        AnyReport::Resource(_) => Statistic::MeanThroughput,
        AnyReport::Evaluation(_) => Statistic::AccuracyRate,
    }
}

impl Command for ShowCommand {
    fn execute(&self, _config: &Config, ui: Ui) -> Result<()> {
        debug!("Executing show command: {:?}", self);

        let path = expand_path(&self.path)?;
        let report = AnyReport::load(&path)
            .with_context(|| format!("Failed to load result document: {}", path.display()))?;
        debug!("Loaded {:?} document", report.kind());

        let statistic = self
            .by
            .map(Statistic::from)
            .unwrap_or_else(|| default_statistic(&report));
        let comparison = match &report {
            AnyReport::Resource(r) => r.comparison(statistic),
            AnyReport::Evaluation(r) => r.comparison(statistic),
        };

        if ui.json || self.format == ShowFormat::Json {
            return match &report {
                AnyReport::Resource(r) => print_json(r),
                AnyReport::Evaluation(r) => print_json(r),
            };
        }

        match self.format {
            ShowFormat::Markdown => print!("{}", comparison?.to_markdown()),
            _ => {
                match &report {
                    AnyReport::Resource(r) => render::print_resource_report(r),
                    AnyReport::Evaluation(r) => render::print_evaluation_report(r),
                }
                if self.by.is_some() {
                    render::print_ranking(&comparison?);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_by_maps_to_statistic() {
        assert_eq!(Statistic::from(RankBy::Ttft), Statistic::MeanTtft);
        assert_eq!(Statistic::from(RankBy::Memory), Statistic::MeanPeakMemory);
        assert_eq!(Statistic::from(RankBy::Similarity), Statistic::MeanSimilarity);
    }

    #[test]
    fn test_missing_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let command = ShowCommand {
            path: dir.path().join("absent.json"),
            format: ShowFormat::Table,
            by: None,
        };
        assert!(command.execute(&Config::default(), Ui::default()).is_err());
    }
}
