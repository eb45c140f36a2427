//! Measurement and evaluation records

use serde::{Deserialize, Serialize};

/// Outcome of one repetition of one input against one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub model_name: String,
    pub model_size_mb: f64,
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
    pub ttft_ms: f64,
    pub total_time_s: f64,
    pub tokens_per_second: f64,
    pub memory_used_mb: f64,
    pub peak_memory_mb: f64,
    pub prompt: String,
    pub response: String,
}

/// Mean of all repetitions of one input against one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub model_name: String,
    pub model_size_mb: f64,
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
    pub ttft_ms: f64,
    pub total_time_s: f64,
    pub tokens_per_second: f64,
    pub memory_used_mb: f64,
    pub peak_memory_mb: f64,
    pub prompt: String,
    /// Response of the first repetition
    pub response: String,
    pub repetitions: usize,
}

/// One judged question for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub question: String,
    pub expected_answer: String,
    pub predicted_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_choice: Option<String>,
    /// Cosine similarity, or 1.0/0.0 for multiple choice
    pub similarity_score: f64,
    pub correct: bool,
}

/// Cost of bringing a model into memory
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadStats {
    pub load_time_s: f64,
    /// Resident memory growth across the load
    pub load_memory_mb: f64,
}
