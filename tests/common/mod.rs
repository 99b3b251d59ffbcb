//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use function_host::config::Config;
use function_host::process::{GcCollections, ProcessInfo, ProcessInfoError};
use function_host::state::{AppState, SharedState};
use function_host::telemetry::{InMemorySink, InMemorySpanSink};

/// Process provider with fixed readings and a failure switch.
pub struct FakeProcess {
    pub working_set: AtomicU64,
    pub cpu_ms: AtomicU64,
    pub threads: u64,
    pub heap: u64,
    pub gc: GcCollections,
    pub failing: AtomicBool,
    pub failing_start_time: AtomicBool,
}

impl Default for FakeProcess {
    fn default() -> Self {
        Self {
            working_set: AtomicU64::new(64 * 1024 * 1024),
            cpu_ms: AtomicU64::new(0),
            threads: 12,
            heap: 8 * 1024 * 1024,
            gc: GcCollections {
                gen0: 7,
                gen1: 3,
                gen2: 1,
            },
            failing: AtomicBool::new(false),
            failing_start_time: AtomicBool::new(false),
        }
    }
}

impl FakeProcess {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Breaks only the start time reading.
    pub fn fail_start_time(&self) {
        self.failing_start_time.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ProcessInfoError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ProcessInfoError::Unavailable("provider switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

pub fn fixed_start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
}

impl ProcessInfo for FakeProcess {
    fn working_set_bytes(&self) -> Result<u64, ProcessInfoError> {
        self.check()?;
        Ok(self.working_set.load(Ordering::SeqCst))
    }

    fn cpu_time(&self) -> Result<Duration, ProcessInfoError> {
        self.check()?;
        Ok(Duration::from_millis(self.cpu_ms.load(Ordering::SeqCst)))
    }

    fn thread_count(&self) -> Result<u64, ProcessInfoError> {
        self.check()?;
        Ok(self.threads)
    }

    fn process_id(&self) -> u32 {
        4242
    }

    fn start_time(&self) -> Result<DateTime<Utc>, ProcessInfoError> {
        self.check()?;
        if self.failing_start_time.load(Ordering::SeqCst) {
            return Err(ProcessInfoError::Parse {
                file: "stat",
                reason: "starttime field missing".to_string(),
            });
        }
        Ok(fixed_start_time())
    }

    fn processor_count(&self) -> usize {
        4
    }

    fn heap_bytes(&self) -> u64 {
        self.heap
    }

    fn gc_collections(&self) -> GcCollections {
        self.gc
    }
}

pub struct Harness {
    pub process: Arc<FakeProcess>,
    pub metrics: Arc<InMemorySink>,
    pub spans: Arc<InMemorySpanSink>,
    pub state: SharedState,
}

/// Config with no echo delay so tests stay fast.
pub fn test_config() -> Config {
    Config {
        echo_delay_min_ms: Some(0),
        echo_delay_max_ms: Some(0),
        ..Config::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: Config) -> Harness {
    let process = Arc::new(FakeProcess::default());
    let metrics = Arc::new(InMemorySink::new());
    let spans = Arc::new(InMemorySpanSink::new());
    let state = AppState::new(config, process.clone(), metrics.clone(), spans.clone()).into_shared();
    Harness {
        process,
        metrics,
        spans,
        state,
    }
}
