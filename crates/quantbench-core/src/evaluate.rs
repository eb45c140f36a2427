//! Accuracy batteries: free-form Q&A and multiple choice

use crate::{
    aggregate::mean,
    backend::{generate_text, GenerationRequest, ModelHandle},
    config::GenerationParams,
    dataset::{MmluDataset, MmluQuestion, QaPair},
    records::EvaluationRecord,
    runner::TrialRunner,
    scorer::{ChoiceScorer, SimilarityScorer},
    Result,
};
use tracing::info;

const PROGRESS_EVERY: usize = 10;

/// Prompt asking for a short free-form answer
pub fn format_free_form_prompt(question: &str) -> String {
    format!(
        "Answer the following question concisely and accurately.\nQuestion: {}\nAnswer:",
        question
    )
}

/// Prompt listing lettered choices
pub fn format_mmlu_prompt(question: &MmluQuestion) -> String {
    let mut prompt = format!(
        "The following is a multiple choice question about {}.\n\n{}\n",
        question.subject.replace('_', " "),
        question.question
    );
    for (i, choice) in question.choices.iter().enumerate() {
        if let Some(letter) = ChoiceScorer::letter(i) {
            prompt.push_str(&format!("{}. {}\n", letter, choice));
        }
    }
    prompt.push_str("Answer:");
    prompt
}

fn should_report(done: usize, total: usize) -> bool {
    done % PROGRESS_EVERY == 0 || done == total
}

fn ask<H: ModelHandle + ?Sized>(
    runner: &TrialRunner,
    handle: &H,
    request: &GenerationRequest,
) -> Result<String> {
    let text = runner
        .policy()
        .run("generation", || generate_text(handle, request))
        .map_err(|e| e.for_model(handle.name()))?;
    Ok(text.trim().to_string())
}

/// Ask every Q&A pair and score the answers by semantic similarity.
///
/// Records come back in dataset order.
pub fn evaluate_free_form<H: ModelHandle + ?Sized>(
    runner: &TrialRunner,
    handle: &H,
    pairs: &[QaPair],
    params: &GenerationParams,
    scorer: &SimilarityScorer,
) -> Result<Vec<EvaluationRecord>> {
    params.validate()?;
    let total = pairs.len();
    info!(
        "Evaluating {} on {} questions (similarity threshold {})",
        handle.name(),
        total,
        scorer.threshold()
    );
    runner.progress().on_start(handle.name(), total);

    let mut records = Vec::with_capacity(total);
    let mut correct = 0usize;

    for (i, pair) in pairs.iter().enumerate() {
        let request = GenerationRequest::new(format_free_form_prompt(&pair.question), params);
        let predicted = ask(runner, handle, &request)?;
        let judgment = scorer.score(&predicted, &pair.answer)?;
        if judgment.correct {
            correct += 1;
        }

        records.push(EvaluationRecord {
            model_name: handle.name().to_string(),
            subject: None,
            question: pair.question.clone(),
            expected_answer: pair.answer.clone(),
            predicted_answer: predicted,
            extracted_choice: None,
            similarity_score: judgment.score,
            correct: judgment.correct,
        });

        let done = i + 1;
        if should_report(done, total) {
            let accuracy = correct as f64 / done as f64 * 100.0;
            let similarity = mean(records.iter().map(|r| r.similarity_score)).unwrap_or(0.0);
            info!(
                "Progress: {}/{} | Accuracy: {:.2}% | Avg Similarity: {:.3}",
                done, total, accuracy, similarity
            );
        }
        runner
            .progress()
            .on_item(done, &format!("{} correct", correct));
    }

    runner.progress().on_finish();
    Ok(records)
}

/// Ask every multiple-choice question and judge the extracted letter.
///
/// Subjects are visited in sorted order and questions in file order. An
/// answer with no recognizable letter counts as incorrect.
pub fn evaluate_multiple_choice<H: ModelHandle + ?Sized>(
    runner: &TrialRunner,
    handle: &H,
    dataset: &MmluDataset,
    params: &GenerationParams,
) -> Result<Vec<EvaluationRecord>> {
    params.validate()?;
    let total = dataset.len();
    info!(
        "Evaluating {} on {} questions across {} subjects",
        handle.name(),
        total,
        dataset.subject_count()
    );
    runner.progress().on_start(handle.name(), total);

    let mut records = Vec::with_capacity(total);
    let mut correct = 0usize;

    for (i, question) in dataset.questions().enumerate() {
        let request = GenerationRequest::new(format_mmlu_prompt(question), params);
        let generated = ask(runner, handle, &request)?;
        let expected = question.answer_letter();
        let (judgment, extracted) =
            ChoiceScorer::judge(&generated, expected, question.choices.len());
        if judgment.correct {
            correct += 1;
        }

        records.push(EvaluationRecord {
            model_name: handle.name().to_string(),
            subject: Some(question.subject.clone()),
            question: question.question.clone(),
            expected_answer: expected.to_string(),
            predicted_answer: generated,
            extracted_choice: extracted.map(String::from),
            similarity_score: judgment.score,
            correct: judgment.correct,
        });

        let done = i + 1;
        if should_report(done, total) {
            info!(
                "Progress: {}/{} | Accuracy: {:.2}%",
                done,
                total,
                correct as f64 / done as f64 * 100.0
            );
        }
        runner
            .progress()
            .on_item(done, &format!("{} correct", correct));
    }

    runner.progress().on_finish();
    Ok(records)
}
