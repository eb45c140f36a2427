//! Trial execution
//!
//! The runner executes one model's battery strictly sequentially: every
//! repetition of every input is a separate generation wrapped in its own
//! measurement window, so timing and memory samples never overlap.

use crate::{
    aggregate::summarize,
    backend::{ArrivalOrder, GenerationRequest, ModelHandle},
    config::{FailurePolicy, GenerationParams},
    records::{SummaryRecord, TrialRecord},
    sampler::{bytes_to_mb, MetricSampler},
    BenchError, Result,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Receives progress notifications while a battery runs
pub trait BatteryProgress {
    /// A battery of `total` items is starting for `model`
    fn on_start(&self, _model: &str, _total: usize) {}

    /// One more item finished
    fn on_item(&self, _completed: usize, _message: &str) {}

    /// The battery is done
    fn on_finish(&self) {}
}

/// Progress sink that ignores everything
pub struct NoProgress;

impl BatteryProgress for NoProgress {}

/// Shorten text for log lines without splitting a character
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Executes generations against a loaded model and measures them
#[derive(Clone)]
pub struct TrialRunner {
    sampler: MetricSampler,
    policy: FailurePolicy,
    progress: Arc<dyn BatteryProgress>,
}

impl TrialRunner {
    pub fn new(sampler: MetricSampler, policy: FailurePolicy) -> Self {
        Self {
            sampler,
            policy,
            progress: Arc::new(NoProgress),
        }
    }

    /// Report battery progress to `progress`
    pub fn with_progress(mut self, progress: Arc<dyn BatteryProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn sampler(&self) -> &MetricSampler {
        &self.sampler
    }

    pub fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    pub(crate) fn progress(&self) -> &dyn BatteryProgress {
        self.progress.as_ref()
    }

    /// Run one generation inside a measurement window
    pub fn run_trial<H: ModelHandle + ?Sized>(
        &self,
        handle: &H,
        request: &GenerationRequest,
    ) -> Result<TrialRecord> {
        let sampler = self.sampler.for_process(handle.process_id());
        let mut clock = sampler.start_trial();
        let mut order = ArrivalOrder::default();
        let mut text = String::new();

        for increment in handle.generate(request)? {
            let increment = increment.map_err(|e| e.for_model(handle.name()))?;
            order.check(&increment).map_err(|e| e.for_model(handle.name()))?;
            clock.on_increment(&increment);
            text.push_str(&increment.text);
        }
        let metrics = clock.finish();

        let prompt_tokens = handle.tokenize(request.prompt())?.len();

        Ok(TrialRecord {
            model_name: handle.name().to_string(),
            model_size_mb: bytes_to_mb(handle.size_bytes()),
            prompt_tokens,
            generated_tokens: metrics.generated_tokens,
            ttft_ms: metrics.ttft_ms,
            total_time_s: metrics.total_time_s,
            tokens_per_second: metrics.tokens_per_second(),
            memory_used_mb: metrics.memory_delta_mb,
            peak_memory_mb: metrics.peak_memory_mb,
            prompt: request.prompt().to_string(),
            response: text.trim().to_string(),
        })
    }

    /// Run `repetitions` trials of one input, each under the failure policy
    pub fn run_repetitions<H: ModelHandle + ?Sized>(
        &self,
        handle: &H,
        request: &GenerationRequest,
        repetitions: usize,
    ) -> Result<Vec<TrialRecord>> {
        let mut trials = Vec::with_capacity(repetitions);
        for rep in 0..repetitions {
            let trial = self
                .policy
                .run("generation", || self.run_trial(handle, request))?;
            debug!(
                "  Repetition {}/{}: TTFT: {:.0}ms, Speed: {:.2} t/s",
                rep + 1,
                repetitions,
                trial.ttft_ms,
                trial.tokens_per_second
            );
            trials.push(trial);
        }
        Ok(trials)
    }

    /// Run every input `repetitions` times and summarize each input, in order
    pub fn run_battery<H: ModelHandle + ?Sized>(
        &self,
        handle: &H,
        inputs: &[String],
        params: &GenerationParams,
        repetitions: usize,
    ) -> Result<Vec<SummaryRecord>> {
        if repetitions == 0 {
            return Err(BenchError::invalid_parameter(
                "INVALID_REPETITIONS",
                "Repetition count must be greater than zero",
                "Resource battery configuration",
                "Use 3 repetitions for a quick but stable average",
                "repetitions",
                "0",
                "1 or more",
            ));
        }
        params.validate()?;

        self.progress.on_start(handle.name(), inputs.len());
        let mut summaries = Vec::with_capacity(inputs.len());

        for (i, input) in inputs.iter().enumerate() {
            info!("Prompt {}/{}: {}", i + 1, inputs.len(), preview(input, 50));

            let request = GenerationRequest::new(input.as_str(), params);
            let trials = self.run_repetitions(handle, &request, repetitions)?;
            let summary = summarize(&trials)?;

            info!(
                "Prompt {}/{} averaged over {} runs: TTFT: {:.0}ms, Speed: {:.2} t/s, Peak: {:.1} MB",
                i + 1,
                inputs.len(),
                summary.repetitions,
                summary.ttft_ms,
                summary.tokens_per_second,
                summary.peak_memory_mb
            );
            self.progress
                .on_item(i + 1, &format!("{:.2} t/s", summary.tokens_per_second));
            summaries.push(summary);
        }

        self.progress.on_finish();
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IncrementStream, StreamIncrement};
    use crate::config::ModelConfig;
    use crate::sampler::MemoryProbe;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FlatProbe;

    impl MemoryProbe for FlatProbe {
        fn resident_bytes(&self, _pid: Option<u32>) -> u64 {
            64 * 1024 * 1024
        }
    }

    struct EchoHandle {
        config: ModelConfig,
        words_per_reply: usize,
        calls: Cell<usize>,
        served_by: Option<u32>,
    }

    impl ModelHandle for EchoHandle {
        fn name(&self) -> &str {
            "echo-q8_0.gguf"
        }

        fn size_bytes(&self) -> u64 {
            2 * 1024 * 1024
        }

        fn config(&self) -> &ModelConfig {
            &self.config
        }

        fn generate(&self, request: &GenerationRequest) -> Result<IncrementStream<'_>> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            let prompt = request.prompt().to_string();
            let count = self.words_per_reply.min(request.max_tokens());
            Ok(Box::new((0..count).map(move |index| {
                Ok(StreamIncrement {
                    index,
                    text: format!("{}-{}-{} ", prompt.len(), call, index),
                })
            })))
        }

        fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text.split_whitespace().map(|_| 7).collect())
        }

        fn process_id(&self) -> Option<u32> {
            self.served_by
        }
    }

    /// Memory of one server process grows by 10 MB per reading
    struct GrowingServerProbe {
        pid: u32,
        readings: AtomicU64,
    }

    impl MemoryProbe for GrowingServerProbe {
        fn resident_bytes(&self, pid: Option<u32>) -> u64 {
            if pid == Some(self.pid) {
                let n = self.readings.fetch_add(1, Ordering::SeqCst);
                (500 + 10 * n) * 1024 * 1024
            } else {
                64 * 1024 * 1024
            }
        }
    }

    fn runner() -> TrialRunner {
        TrialRunner::new(MetricSampler::new(Arc::new(FlatProbe)), FailurePolicy::FailFast)
    }

    #[test]
    fn test_battery_yields_one_summary_per_input_in_order() {
        let handle = EchoHandle {
            config: ModelConfig::default(),
            words_per_reply: 4,
            calls: Cell::new(0),
            served_by: None,
        };
        let inputs = vec!["Write a short poem about AI.".to_string(), "Hi".to_string()];
        let summaries = runner()
            .run_battery(&handle, &inputs, &GenerationParams::resource(), 3)
            .unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].prompt, inputs[0]);
        assert_eq!(summaries[1].prompt, inputs[1]);
        assert_eq!(summaries[0].prompt_tokens, 6);
        assert_eq!(summaries[0].generated_tokens, 4);
        assert_eq!(summaries[0].repetitions, 3);
        assert_eq!(summaries[0].model_size_mb, 2.0);
        // First repetition's text is the representative response
        assert!(summaries[0].response.starts_with("28-0-0"));
        assert!(summaries[1].response.starts_with("2-3-0"));
        assert_eq!(handle.calls.get(), 6);
    }

    #[test]
    fn test_zero_length_generation_has_zero_throughput() {
        let handle = EchoHandle {
            config: ModelConfig::default(),
            words_per_reply: 0,
            calls: Cell::new(0),
            served_by: None,
        };
        let request = GenerationRequest::new("Hi", &GenerationParams::resource());
        let trial = runner().run_trial(&handle, &request).unwrap();
        assert_eq!(trial.generated_tokens, 0);
        assert_eq!(trial.ttft_ms, 0.0);
        assert_eq!(trial.tokens_per_second, 0.0);
        assert_eq!(trial.peak_memory_mb, 0.0);
    }

    #[test]
    fn test_trial_memory_follows_serving_process() {
        let handle = EchoHandle {
            config: ModelConfig::default(),
            words_per_reply: 3,
            calls: Cell::new(0),
            served_by: Some(31337),
        };
        let probe = Arc::new(GrowingServerProbe {
            pid: 31337,
            readings: AtomicU64::new(0),
        });
        let runner = TrialRunner::new(MetricSampler::new(probe), FailurePolicy::FailFast);
        let request = GenerationRequest::new("Hi", &GenerationParams::resource());
        let trial = runner.run_trial(&handle, &request).unwrap();

        // baseline, three increments, end reading
        assert!((trial.peak_memory_mb - 40.0).abs() < 1e-9);
        assert!((trial.memory_used_mb - 40.0).abs() < 1e-9);
        // The runner's own sampler stays aimed at the running process
        assert_eq!(runner.sampler().target(), None);
    }

    #[test]
    fn test_zero_repetitions_rejected() {
        let handle = EchoHandle {
            config: ModelConfig::default(),
            words_per_reply: 1,
            calls: Cell::new(0),
            served_by: None,
        };
        let err = runner()
            .run_battery(&handle, &["x".to_string()], &GenerationParams::resource(), 0)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REPETITIONS");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 4), "héll...");
        assert_eq!(preview("short", 50), "short");
    }
}
