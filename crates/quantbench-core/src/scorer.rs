//! Judging generated answers against references

use crate::{backend::Embedder, BenchError, Result};
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Continuous score plus the pass/fail decision derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Judgment {
    pub score: f64,
    pub correct: bool,
}

/// Cosine similarity of two embedding vectors.
///
/// Vectors must have the same, non-zero dimension. A zero vector is
/// orthogonal to everything and scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() || a.is_empty() {
        return Err(BenchError::embedding(
            "EMBEDDING_DIMENSION_MISMATCH",
            format!("Cannot compare vectors of dimension {} and {}", a.len(), b.len()),
            "Computing cosine similarity",
            "Embed both texts with the same embedding model",
        ));
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Free-form answer judge based on embedding similarity
#[derive(Clone)]
pub struct SimilarityScorer {
    embedder: Arc<dyn Embedder>,
    threshold: f64,
}

impl SimilarityScorer {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(BenchError::invalid_parameter(
                "INVALID_SIMILARITY_THRESHOLD",
                "Similarity threshold must lie within the cosine range",
                "Similarity scorer configuration",
                "Use a value such as 0.7",
                "similarity_threshold",
                threshold.to_string(),
                "-1.0 to 1.0",
            ));
        }
        Ok(Self { embedder, threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Embed both answers and compare; passes when the score meets the threshold.
    ///
    /// An empty prediction scores 0 and fails without reaching the embedder.
    pub fn score(&self, predicted: &str, expected: &str) -> Result<Judgment> {
        if predicted.trim().is_empty() {
            return Ok(Judgment {
                score: 0.0,
                correct: false,
            });
        }
        let predicted = self.embedder.embed(predicted)?;
        let expected = self.embedder.embed(expected)?;
        let score = cosine_similarity(&predicted, &expected)?;
        Ok(Judgment {
            score,
            correct: score >= self.threshold,
        })
    }
}

fn letter_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[A-Za-z]\b").expect("letter token pattern is valid"))
}

/// Multiple-choice judge
pub struct ChoiceScorer;

impl ChoiceScorer {
    /// Letter naming the choice at `index` (0 → 'A')
    pub fn letter(index: usize) -> Option<char> {
        (index < 26).then(|| (b'A' + index as u8) as char)
    }

    /// First standalone letter in `text` that names one of `num_choices` choices
    pub fn extract(text: &str, num_choices: usize) -> Option<char> {
        letter_token()
            .find_iter(text)
            .filter_map(|m| m.as_str().chars().next())
            .map(|c| c.to_ascii_uppercase())
            .find(|c| ((*c as u8 - b'A') as usize) < num_choices)
    }

    /// Judge generated text against the expected letter. An unparseable
    /// answer is simply incorrect.
    pub fn judge(generated: &str, expected: char, num_choices: usize) -> (Judgment, Option<char>) {
        let extracted = Self::extract(generated, num_choices);
        let correct = extracted == Some(expected.to_ascii_uppercase());
        (
            Judgment {
                score: if correct { 1.0 } else { 0.0 },
                correct,
            },
            extracted,
        )
    }
}
