//! Utility functions for the Quantbench CLI

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use quantbench_core::runner::BatteryProgress;
use serde::Serialize;
use std::time::Duration;

/// Output switches shared by every command
#[derive(Debug, Clone, Copy, Default)]
pub struct Ui {
    pub json: bool,
    pub quiet: bool,
}

impl Ui {
    /// Whether human-oriented decoration should be drawn
    pub fn interactive(&self) -> bool {
        !self.json && !self.quiet
    }
}

/// Create a progress bar with standard styling
pub fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Battery progress drawn as one bar per model
pub struct BarProgress {
    enabled: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new(ui: Ui) -> Self {
        Self {
            enabled: ui.interactive(),
            bar: Mutex::new(None),
        }
    }
}

impl BatteryProgress for BarProgress {
    fn on_start(&self, model: &str, total: usize) {
        if self.enabled {
            *self.bar.lock() = Some(create_progress_bar(total as u64, model));
        }
    }

    fn on_item(&self, completed: usize, message: &str) {
        if let Some(bar) = self.bar.lock().as_ref() {
            bar.set_position(completed as u64);
            bar.set_message(message.to_string());
        }
    }

    fn on_finish(&self) {
        if let Some(bar) = self.bar.lock().take() {
            bar.finish_and_clear();
        }
    }
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if seconds > 0 {
        format!("{}.{:03}s", seconds, millis)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Shorten text to `max` characters for table cells
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        single_line
    } else {
        let head: String = single_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print warning with styling
pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), message);
}

/// Print success message with styling
pub fn print_success(message: &str) {
    println!("{} {}", style("Success:").green().bold(), message);
}
