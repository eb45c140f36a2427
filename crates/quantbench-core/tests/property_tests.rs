//! Property-based tests for quantbench-core aggregation and scoring
//!
//! These tests use proptest to generate random measurements and verify the
//! invariants the aggregator and scorers promise.

use proptest::prelude::*;
use quantbench_core::{
    aggregate::{rank, summarize, Direction, PerformanceAggregate, Statistic},
    records::{LoadStats, TrialRecord},
    scorer::{cosine_similarity, ChoiceScorer},
};

prop_compose! {
    fn arb_trial()(
        tps in 0.0f64..500.0,
        tokens in 0usize..512,
        ttft in 0.0f64..2000.0,
        peak in 0.0f64..4096.0,
    ) -> TrialRecord {
        TrialRecord {
            model_name: "prop.gguf".to_string(),
            model_size_mb: 1024.0,
            prompt_tokens: 6,
            generated_tokens: tokens,
            ttft_ms: ttft,
            total_time_s: 1.0,
            tokens_per_second: tps,
            memory_used_mb: 0.0,
            peak_memory_mb: peak,
            prompt: "What are the benefits of exercise?".to_string(),
            response: format!("{tokens} tokens"),
        }
    }
}

fn aggregate(name: String, tps: f64) -> PerformanceAggregate {
    PerformanceAggregate {
        model_name: name,
        model_size_mb: 1.0,
        load: LoadStats::default(),
        prompts: 1,
        mean_ttft_ms: 0.0,
        mean_tokens_per_second: tps,
        mean_memory_used_mb: 0.0,
        mean_peak_memory_mb: 0.0,
    }
}

prop_compose! {
    fn arb_aggregates()(
        values in prop::collection::vec(
            prop_oneof![Just(10.0f64), Just(20.0), 0.0f64..100.0],
            1..=20,
        )
    ) -> Vec<PerformanceAggregate> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| aggregate(format!("model-{i}.gguf"), v))
            .collect()
    }
}

proptest! {
    /// Summary throughput is the arithmetic mean of the trial throughputs
    #[test]
    fn test_summary_throughput_is_trial_mean(trials in prop::collection::vec(arb_trial(), 1..=10)) {
        let summary = summarize(&trials).unwrap();
        let total: f64 = trials.iter().map(|t| t.tokens_per_second).sum();
        let expected = total / trials.len() as f64;
        prop_assert!((summary.tokens_per_second - expected).abs() < 1e-9);
        prop_assert_eq!(summary.repetitions, trials.len());
        prop_assert_eq!(&summary.response, &trials[0].response);
    }

    /// Ranking an already-ranked list leaves it unchanged
    #[test]
    fn test_rank_is_idempotent(items in arb_aggregates(), descending in any::<bool>()) {
        let direction = if descending { Direction::Descending } else { Direction::Ascending };
        let first = rank(&items, Statistic::MeanThroughput, direction).unwrap();

        let reordered: Vec<PerformanceAggregate> = first
            .iter()
            .map(|name| items.iter().find(|a| &a.model_name == name).unwrap().clone())
            .collect();
        let second = rank(&reordered, Statistic::MeanThroughput, direction).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Models with equal values keep their input order
    #[test]
    fn test_ties_keep_input_order(items in arb_aggregates()) {
        let ranked = rank(&items, Statistic::MeanThroughput, Direction::Descending).unwrap();
        let position = |name: &str| items.iter().position(|a| a.model_name == name).unwrap();

        for pair in ranked.windows(2) {
            let (a, b) = (position(&pair[0]), position(&pair[1]));
            if items[a].mean_tokens_per_second == items[b].mean_tokens_per_second {
                prop_assert!(a < b);
            }
        }
    }

    /// Cosine similarity is symmetric and bounded
    #[test]
    fn test_cosine_bounded_and_symmetric(
        pair in (1usize..64).prop_flat_map(|n| (
            prop::collection::vec(-10.0f32..10.0, n),
            prop::collection::vec(-10.0f32..10.0, n),
        ))
    ) {
        let (a, b) = pair;
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        prop_assert!((ab - ba).abs() < 1e-12);
        prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&ab));
    }

    /// Extraction never names a choice the question does not have
    #[test]
    fn test_extracted_letter_in_range(text in "[A-Za-z .,()]{0,40}", choices in 2usize..=10) {
        if let Some(letter) = ChoiceScorer::extract(&text, choices) {
            prop_assert!(letter.is_ascii_uppercase());
            prop_assert!(((letter as u8 - b'A') as usize) < choices);
        }
    }
}
