//! Wall-clock and process-memory sampling for individual trials
//!
//! A [`TrialClock`] is the measurement window of one repetition: it is opened
//! by [`MetricSampler::start_trial`], fed every [`StreamIncrement`] as it
//! arrives, and closed by [`TrialClock::finish`]. Memory figures are relative
//! to the reading taken when the window opened, which makes them meaningful
//! only when nothing else in the measured process allocates during the trial.
//!
//! Models served out of process (such as a `llama-server` child) are measured
//! by pointing the sampler at the serving process with
//! [`MetricSampler::for_process`].

use crate::backend::StreamIncrement;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Convert a byte count to mebibytes
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Source of resident memory readings
pub trait MemoryProbe: Send + Sync {
    /// Resident set size in bytes of process `pid`, or of the running
    /// process when `pid` is `None`. A process that cannot be read is 0.
    fn resident_bytes(&self, pid: Option<u32>) -> u64;
}

/// Reads resident set sizes through `sysinfo`
pub struct ProcessMemoryProbe {
    own_pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        Self {
            own_pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self, pid: Option<u32>) -> u64 {
        let Some(pid) = pid.map(Pid::from_u32).or(self.own_pid) else {
            return 0;
        };
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

/// Timing and memory signals of one finished trial
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialMetrics {
    /// Time to first increment; 0 when nothing was generated
    pub ttft_ms: f64,
    pub total_time_s: f64,
    /// End-of-trial memory minus the baseline (may be negative)
    pub memory_delta_mb: f64,
    /// Highest reading during the trial minus the baseline
    pub peak_memory_mb: f64,
    /// Number of increments observed
    pub generated_tokens: usize,
}

impl TrialMetrics {
    /// Generated tokens per second of wall time, 0 for degenerate trials
    pub fn tokens_per_second(&self) -> f64 {
        if self.generated_tokens == 0 || self.total_time_s <= 0.0 {
            0.0
        } else {
            self.generated_tokens as f64 / self.total_time_s
        }
    }
}

/// Opens measurement windows against a shared memory probe
#[derive(Clone)]
pub struct MetricSampler {
    probe: Arc<dyn MemoryProbe>,
    target: Option<u32>,
}

impl MetricSampler {
    pub fn new(probe: Arc<dyn MemoryProbe>) -> Self {
        Self { probe, target: None }
    }

    /// Sampler backed by `sysinfo` process readings
    pub fn for_current_process() -> Self {
        Self::new(Arc::new(ProcessMemoryProbe::new()))
    }

    /// The same probe aimed at process `pid`; `None` keeps the running process
    pub fn for_process(&self, pid: Option<u32>) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            target: pid,
        }
    }

    /// Process being measured, `None` for the running process
    pub fn target(&self) -> Option<u32> {
        self.target
    }

    /// Current resident memory of the target in MB
    pub fn current_memory_mb(&self) -> f64 {
        bytes_to_mb(self.probe.resident_bytes(self.target))
    }

    /// Capture the baseline reading and start the clock
    pub fn start_trial(&self) -> TrialClock<'_> {
        let baseline_bytes = self.probe.resident_bytes(self.target);
        TrialClock {
            probe: self.probe.as_ref(),
            target: self.target,
            started: Instant::now(),
            baseline_bytes,
            peak_bytes: baseline_bytes,
            first_increment: None,
            increments: 0,
            finished: false,
        }
    }
}

/// Measurement window of a single trial
pub struct TrialClock<'a> {
    probe: &'a dyn MemoryProbe,
    target: Option<u32>,
    started: Instant,
    baseline_bytes: u64,
    peak_bytes: u64,
    first_increment: Option<Duration>,
    increments: usize,
    finished: bool,
}

impl TrialClock<'_> {
    /// Fold one arriving increment into the window
    pub fn on_increment(&mut self, _increment: &StreamIncrement) {
        if self.first_increment.is_none() {
            self.first_increment = Some(self.started.elapsed());
        }
        self.increments += 1;
        self.peak_bytes = self
            .peak_bytes
            .max(self.probe.resident_bytes(self.target));
    }

    /// Close the window and report its signals
    pub fn finish(mut self) -> TrialMetrics {
        let total = self.started.elapsed();
        let end_bytes = self.probe.resident_bytes(self.target);
        self.peak_bytes = self.peak_bytes.max(end_bytes);
        self.finished = true;

        TrialMetrics {
            ttft_ms: self
                .first_increment
                .map(|d| d.as_secs_f64() * 1000.0)
                .unwrap_or(0.0),
            total_time_s: total.as_secs_f64(),
            memory_delta_mb: bytes_to_mb(end_bytes) - bytes_to_mb(self.baseline_bytes),
            peak_memory_mb: bytes_to_mb(self.peak_bytes - self.baseline_bytes),
            generated_tokens: self.increments,
        }
    }
}

impl Drop for TrialClock<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                "Trial window closed without finishing after {} increments",
                self.increments
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted readings, repeating the last one when exhausted
    struct ScriptedProbe {
        readings: Mutex<VecDeque<u64>>,
    }

    impl ScriptedProbe {
        fn new(readings: &[u64]) -> Arc<Self> {
            Arc::new(Self {
                readings: Mutex::new(readings.iter().copied().collect()),
            })
        }
    }

    impl MemoryProbe for ScriptedProbe {
        fn resident_bytes(&self, _pid: Option<u32>) -> u64 {
            let mut readings = self.readings.lock();
            if readings.len() > 1 {
                readings.pop_front().unwrap_or(0)
            } else {
                readings.front().copied().unwrap_or(0)
            }
        }
    }

    fn increment(index: usize) -> StreamIncrement {
        StreamIncrement {
            index,
            text: "x".to_string(),
        }
    }

    #[test]
    fn test_zero_increments_report_zero_ttft_and_throughput() {
        let sampler = MetricSampler::new(ScriptedProbe::new(&[100]));
        let metrics = sampler.start_trial().finish();
        assert_eq!(metrics.ttft_ms, 0.0);
        assert_eq!(metrics.generated_tokens, 0);
        assert_eq!(metrics.tokens_per_second(), 0.0);
    }

    #[test]
    fn test_peak_is_relative_to_baseline() {
        let mb = 1024 * 1024;
        // baseline, two increments, end reading
        let sampler = MetricSampler::new(ScriptedProbe::new(&[
            500 * mb,
            520 * mb,
            510 * mb,
            505 * mb,
        ]));
        let mut clock = sampler.start_trial();
        clock.on_increment(&increment(0));
        clock.on_increment(&increment(1));
        let metrics = clock.finish();

        assert_eq!(metrics.generated_tokens, 2);
        assert!((metrics.peak_memory_mb - 20.0).abs() < 1e-9);
        assert!((metrics.memory_delta_mb - 5.0).abs() < 1e-9);
        assert!(metrics.ttft_ms >= 0.0);
        assert!(metrics.ttft_ms <= metrics.total_time_s * 1000.0);
    }

    #[test]
    fn test_memory_delta_can_be_negative() {
        let mb = 1024 * 1024;
        let sampler = MetricSampler::new(ScriptedProbe::new(&[300 * mb, 290 * mb]));
        let metrics = sampler.start_trial().finish();
        assert!((metrics.memory_delta_mb + 10.0).abs() < 1e-9);
        assert_eq!(metrics.peak_memory_mb, 0.0);
    }

    #[test]
    fn test_throughput_from_metrics() {
        let metrics = TrialMetrics {
            ttft_ms: 12.0,
            total_time_s: 2.0,
            memory_delta_mb: 0.0,
            peak_memory_mb: 0.0,
            generated_tokens: 50,
        };
        assert_eq!(metrics.tokens_per_second(), 25.0);
    }

    #[test]
    fn test_process_probe_reads_something() {
        let probe = ProcessMemoryProbe::new();
        // Resident memory of a running test binary is never zero on supported platforms
        if cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows")) {
            assert!(probe.resident_bytes(None) > 0);
        }
    }

    /// Reports memory only for one process id
    struct ChildOnlyProbe {
        pid: u32,
        readings: Mutex<VecDeque<u64>>,
    }

    impl MemoryProbe for ChildOnlyProbe {
        fn resident_bytes(&self, pid: Option<u32>) -> u64 {
            if pid != Some(self.pid) {
                return 0;
            }
            let mut readings = self.readings.lock();
            if readings.len() > 1 {
                readings.pop_front().unwrap_or(0)
            } else {
                readings.front().copied().unwrap_or(0)
            }
        }
    }

    #[test]
    fn test_sampler_measures_its_target_process() {
        let mb = 1024 * 1024;
        let sampler = MetricSampler::new(Arc::new(ChildOnlyProbe {
            pid: 4242,
            readings: Mutex::new([1000 * mb, 1400 * mb, 1200 * mb].into_iter().collect()),
        }));

        let own = sampler.start_trial().finish();
        assert_eq!(own.peak_memory_mb, 0.0);

        let child = sampler.for_process(Some(4242));
        assert_eq!(child.target(), Some(4242));
        let mut clock = child.start_trial();
        clock.on_increment(&increment(0));
        let metrics = clock.finish();
        assert!((metrics.peak_memory_mb - 400.0).abs() < 1e-9);
        assert!((metrics.memory_delta_mb - 200.0).abs() < 1e-9);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_probe_follows_child_process() {
        let mut child = std::process::Command::new("sleep")
            .arg("5")
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let probe = ProcessMemoryProbe::new();
        let child_bytes = probe.resident_bytes(Some(child.id()));
        let own_bytes = probe.resident_bytes(None);
        child.kill().unwrap();
        child.wait().unwrap();

        assert!(child_bytes > 0);
        // `sleep` is far smaller than a test binary
        assert!(child_bytes < own_bytes);
        assert_eq!(probe.resident_bytes(Some(child.id())), 0);
    }
}
