//! CPU time parsing and usage sampling for the host process.
//!
//! This module parses cumulative CPU time from `/proc/<pid>/stat` and keeps the
//! single process-wide snapshot used to turn two CPU-time readings into a
//! utilization percentage.

use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use super::info::{ProcessInfo, ProcessInfoError};

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    100.0
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Splits a `/proc/<pid>/stat` line into the fields following the command name.
///
/// The command name is wrapped in parentheses and may itself contain spaces, so
/// the remaining fields start after the last `)`. Index 0 of the result is the
/// process state (field 3 in `proc(5)` numbering).
pub(crate) fn stat_fields_after_comm(content: &str) -> Result<Vec<&str>, ProcessInfoError> {
    let close = content.rfind(')').ok_or_else(|| ProcessInfoError::Parse {
        file: "stat",
        reason: "missing command name".to_string(),
    })?;
    Ok(content[close + 1..].split_whitespace().collect())
}

/// Parses total CPU time (user + system) from a `/proc/<pid>/stat` file.
pub fn parse_cpu_time(stat_path: &Path) -> Result<Duration, ProcessInfoError> {
    let content = fs::read_to_string(stat_path).map_err(|source| ProcessInfoError::Io {
        path: stat_path.display().to_string(),
        source,
    })?;

    let fields = stat_fields_after_comm(&content)?;
    // utime and stime are fields 14 and 15 (indices 11 and 12 after the comm)
    if fields.len() <= 12 {
        return Err(ProcessInfoError::Parse {
            file: "stat",
            reason: format!("expected at least 13 fields after comm, got {}", fields.len()),
        });
    }

    let parse_ticks = |raw: &str, name: &str| {
        raw.parse::<u64>().map_err(|e| ProcessInfoError::Parse {
            file: "stat",
            reason: format!("{name}: {e}"),
        })
    };
    let utime = parse_ticks(fields[11], "utime")?;
    let stime = parse_ticks(fields[12], "stime")?;

    Ok(Duration::from_secs_f64((utime + stime) as f64 / *CLK_TCK))
}

/// One reading of wall-clock time and cumulative process CPU time.
#[derive(Debug, Clone, Copy)]
pub struct CpuSample {
    pub timestamp: Instant,
    pub cpu_time: Duration,
}

impl CpuSample {
    /// Takes a reading from the provider at the current instant.
    pub fn read(info: &dyn ProcessInfo) -> Result<Self, ProcessInfoError> {
        let cpu_time = info.cpu_time()?;
        Ok(Self {
            timestamp: Instant::now(),
            cpu_time,
        })
    }
}

/// Computes process CPU utilization between successive calls.
///
/// The last sample lives behind a mutex so concurrent callers each see a
/// consistent window and every call advances it.
pub struct CpuUsageSampler {
    last: Mutex<CpuSample>,
}

impl CpuUsageSampler {
    pub fn new(baseline: CpuSample) -> Self {
        Self {
            last: Mutex::new(baseline),
        }
    }

    /// Creates a sampler whose baseline is taken right now.
    ///
    /// If the CPU time cannot be read the baseline starts at zero CPU time.
    pub fn starting_now(info: &dyn ProcessInfo) -> Self {
        let baseline = CpuSample::read(info).unwrap_or_else(|e| {
            debug!("Failed to read baseline CPU time: {}", e);
            CpuSample {
                timestamp: Instant::now(),
                cpu_time: Duration::ZERO,
            }
        });
        Self::new(baseline)
    }

    /// Samples the provider and returns CPU percent since the previous sample.
    ///
    /// The reading is taken while the snapshot is locked, so concurrent
    /// callers advance the window in the order they read it. Read failures
    /// yield `0.0` and leave the stored snapshot untouched.
    pub fn sample(&self, info: &dyn ProcessInfo, processor_count: usize) -> f64 {
        let mut last = self.lock();
        match CpuSample::read(info) {
            Ok(current) => advance(&mut last, current, processor_count),
            Err(e) => {
                debug!("Failed to read process CPU time: {}", e);
                0.0
            }
        }
    }

    /// Feeds one reading and returns the averaged per-core percentage,
    /// rounded to two decimals.
    ///
    /// A reading older than the stored snapshot yields `0.0` and is dropped.
    pub fn observe(&self, current: CpuSample, processor_count: usize) -> f64 {
        advance(&mut self.lock(), current, processor_count)
    }

    /// Returns a copy of the stored snapshot.
    pub fn last_sample(&self) -> CpuSample {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, CpuSample> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Computes the percentage between `last` and `current` and moves the
/// snapshot forward. Timestamps and CPU time in the snapshot never decrease.
fn advance(last: &mut CpuSample, current: CpuSample, processor_count: usize) -> f64 {
    if current.timestamp < last.timestamp || current.cpu_time < last.cpu_time {
        debug!("Dropping CPU sample older than the stored snapshot");
        return 0.0;
    }

    let wall = current.timestamp.duration_since(last.timestamp);
    let cpu = current.cpu_time - last.cpu_time;

    let mut percent = 0.0;
    if !wall.is_zero() {
        let cores = processor_count.max(1) as f64;
        percent = cpu.as_secs_f64() / wall.as_secs_f64() * 100.0 / cores;
    }

    *last = current;
    round2(percent)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::info::GcCollections;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sample_at(base: Instant, wall_ms: u64, cpu_ms: u64) -> CpuSample {
        CpuSample {
            timestamp: base + Duration::from_millis(wall_ms),
            cpu_time: Duration::from_millis(cpu_ms),
        }
    }

    // -------------------------------------------------------------------------
    // Tests for parse_cpu_time
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_cpu_time() {
        let dir = tempdir().expect("Failed to create temp dir");
        let stat_path = dir.path().join("stat");

        // utime=1000, stime=500 -> 1500 ticks
        let stat_content = "1234 (test_process) S 1 1234 1234 0 -1 4194304 100 0 0 0 1000 500 0 0 20 0 1 0 12345 12345678 1234 18446744073709551615 4194304 4238788 140736466511168 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0";
        std::fs::write(&stat_path, stat_content).expect("Failed to write stat file");

        let actual = parse_cpu_time(&stat_path).expect("stat should parse");
        let expected = 1500.0 / *CLK_TCK;
        assert!(
            (actual.as_secs_f64() - expected).abs() < 0.001,
            "Expected ~{:.3}, got {:.3}",
            expected,
            actual.as_secs_f64()
        );
    }

    #[test]
    fn test_parse_cpu_time_comm_with_spaces() {
        let dir = tempdir().expect("Failed to create temp dir");
        let stat_path = dir.path().join("stat");

        let stat_content = "42 (tokio runtime) worker) R 1 42 42 0 -1 0 0 0 0 0 200 100 0 0 20 0 9 0 500 0 0";
        std::fs::write(&stat_path, stat_content).expect("Failed to write stat file");

        let actual = parse_cpu_time(&stat_path).expect("stat should parse");
        let expected = 300.0 / *CLK_TCK;
        assert!((actual.as_secs_f64() - expected).abs() < 0.001);
    }

    #[test]
    fn test_parse_cpu_time_invalid_stat() {
        let dir = tempdir().expect("Failed to create temp dir");
        let stat_path = dir.path().join("stat");
        std::fs::write(&stat_path, "1234 (test) S 1 2 3").expect("Failed to write stat file");

        assert!(matches!(
            parse_cpu_time(&stat_path),
            Err(ProcessInfoError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_cpu_time_missing_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let result = parse_cpu_time(&dir.path().join("stat"));
        assert!(matches!(result, Err(ProcessInfoError::Io { .. })));
    }

    // -------------------------------------------------------------------------
    // Tests for CpuUsageSampler
    // -------------------------------------------------------------------------

    #[test]
    fn test_observe_computes_per_core_percent() {
        let base = Instant::now();
        let sampler = CpuUsageSampler::new(sample_at(base, 0, 0));

        // 500ms of CPU over 1000ms wall on 2 cores = 25%
        let percent = sampler.observe(sample_at(base, 1000, 500), 2);
        assert_eq!(percent, 25.0);
    }

    #[test]
    fn test_observe_rounds_to_two_decimals() {
        let base = Instant::now();
        let sampler = CpuUsageSampler::new(sample_at(base, 0, 0));

        // 100 / 3000 * 100 = 3.333...
        let percent = sampler.observe(sample_at(base, 3000, 100), 1);
        assert_eq!(percent, 3.33);
    }

    #[test]
    fn test_observe_zero_elapsed_returns_zero() {
        let base = Instant::now();
        let sampler = CpuUsageSampler::new(sample_at(base, 0, 0));

        let percent = sampler.observe(sample_at(base, 0, 750), 4);
        assert_eq!(percent, 0.0);
        // Window still advances
        assert_eq!(sampler.last_sample().cpu_time, Duration::from_millis(750));
    }

    #[test]
    fn test_observe_advances_window() {
        let base = Instant::now();
        let sampler = CpuUsageSampler::new(sample_at(base, 0, 0));

        assert_eq!(sampler.observe(sample_at(base, 1000, 1000), 1), 100.0);
        // Second window only sees the new delta: 250ms cpu over 1000ms
        assert_eq!(sampler.observe(sample_at(base, 2000, 1250), 1), 25.0);
    }

    #[test]
    fn test_observe_zero_processor_count_treated_as_one() {
        let base = Instant::now();
        let sampler = CpuUsageSampler::new(sample_at(base, 0, 0));
        assert_eq!(sampler.observe(sample_at(base, 1000, 400), 0), 40.0);
    }

    #[test]
    fn test_observe_cpu_time_going_backwards_keeps_snapshot() {
        let base = Instant::now();
        let sampler = CpuUsageSampler::new(sample_at(base, 0, 900));
        assert_eq!(sampler.observe(sample_at(base, 1000, 100), 1), 0.0);
        assert_eq!(sampler.last_sample().cpu_time, Duration::from_millis(900));
    }

    #[test]
    fn test_out_of_order_sample_does_not_rewind_snapshot() {
        let base = Instant::now();
        let sampler = CpuUsageSampler::new(sample_at(base, 0, 0));

        assert_eq!(sampler.observe(sample_at(base, 2000, 800), 1), 40.0);
        // A reading taken earlier but delivered later
        assert_eq!(sampler.observe(sample_at(base, 1000, 400), 1), 0.0);

        let stored = sampler.last_sample();
        assert_eq!(stored.timestamp, base + Duration::from_millis(2000));
        assert_eq!(stored.cpu_time, Duration::from_millis(800));

        // The next window is measured from the newest reading
        assert_eq!(sampler.observe(sample_at(base, 3000, 900), 1), 10.0);
    }

    /// CPU time grows by 1ms on every read.
    struct TickingCpu {
        reads: AtomicU64,
    }

    impl ProcessInfo for TickingCpu {
        fn working_set_bytes(&self) -> Result<u64, ProcessInfoError> {
            Ok(0)
        }
        fn cpu_time(&self) -> Result<Duration, ProcessInfoError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Duration::from_millis(n))
        }
        fn thread_count(&self) -> Result<u64, ProcessInfoError> {
            Ok(1)
        }
        fn process_id(&self) -> u32 {
            1
        }
        fn start_time(&self) -> Result<DateTime<Utc>, ProcessInfoError> {
            Ok(Utc::now())
        }
        fn processor_count(&self) -> usize {
            1
        }
        fn heap_bytes(&self) -> u64 {
            0
        }
        fn gc_collections(&self) -> GcCollections {
            GcCollections::default()
        }
    }

    #[test]
    fn test_concurrent_samples_keep_newest_reading() {
        let info = Arc::new(TickingCpu {
            reads: AtomicU64::new(0),
        });
        let sampler = Arc::new(CpuUsageSampler::starting_now(info.as_ref()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let info = info.clone();
                let sampler = sampler.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let percent = sampler.sample(info.as_ref(), 1);
                        assert!(percent >= 0.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Baseline read plus 1600 samples; the last one stored is the newest
        let reads = info.reads.load(Ordering::SeqCst);
        assert_eq!(reads, 1 + 8 * 200);
        assert_eq!(sampler.last_sample().cpu_time, Duration::from_millis(reads));
    }
}
