//! `/proc` backed process information provider.
//!
//! Reads the host's own entries under `/proc/self` plus the boot time from
//! `/proc/stat`. The paths are configurable so tests can point the provider at
//! a fake tree.

use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::alloc::TrackingAllocator;
use super::cpu::{parse_cpu_time, stat_fields_after_comm, CLK_TCK};
use super::info::{GcCollections, ProcessInfo, ProcessInfoError};

/// Provider reading `/proc/<pid>/{stat,status}` and `/proc/stat`.
#[derive(Debug, Clone)]
pub struct ProcfsProcessInfo {
    proc_path: PathBuf,
    system_stat_path: PathBuf,
    pid: u32,
}

impl Default for ProcfsProcessInfo {
    fn default() -> Self {
        Self::new("/proc/self", "/proc/stat", std::process::id())
    }
}

impl ProcfsProcessInfo {
    pub fn new(
        proc_path: impl Into<PathBuf>,
        system_stat_path: impl Into<PathBuf>,
        pid: u32,
    ) -> Self {
        Self {
            proc_path: proc_path.into(),
            system_stat_path: system_stat_path.into(),
            pid,
        }
    }

    fn read(&self, path: &Path) -> Result<String, ProcessInfoError> {
        fs::read_to_string(path).map_err(|source| ProcessInfoError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Looks up a `Key:` line in `/proc/<pid>/status` and parses its first value.
    fn status_value(&self, key: &str) -> Result<u64, ProcessInfoError> {
        let content = self.read(&self.proc_path.join("status"))?;
        parse_status_value(&content, key)
    }
}

/// Parses the first numeric value following `key` in a status-style file.
pub fn parse_status_value(content: &str, key: &str) -> Result<u64, ProcessInfoError> {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix(key) {
            let Some(rest) = rest.strip_prefix(':') else {
                continue;
            };
            let raw = rest.split_whitespace().next().unwrap_or_default();
            return raw.parse::<u64>().map_err(|e| ProcessInfoError::Parse {
                file: "status",
                reason: format!("{key}: {e}"),
            });
        }
    }
    Err(ProcessInfoError::Parse {
        file: "status",
        reason: format!("{key} not found"),
    })
}

/// Parses the `btime` (boot time, seconds since epoch) line from `/proc/stat`.
pub fn parse_boot_time(content: &str) -> Result<u64, ProcessInfoError> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| ProcessInfoError::Parse {
            file: "/proc/stat",
            reason: "btime not found".to_string(),
        })
}

/// Parses the process start time (field 22, clock ticks after boot).
pub fn parse_start_ticks(content: &str) -> Result<u64, ProcessInfoError> {
    let fields = stat_fields_after_comm(content)?;
    fields
        .get(19)
        .ok_or_else(|| ProcessInfoError::Parse {
            file: "stat",
            reason: "starttime field missing".to_string(),
        })?
        .parse::<u64>()
        .map_err(|e| ProcessInfoError::Parse {
            file: "stat",
            reason: format!("starttime: {e}"),
        })
}

impl ProcessInfo for ProcfsProcessInfo {
    fn working_set_bytes(&self) -> Result<u64, ProcessInfoError> {
        Ok(self.status_value("VmRSS")? * 1024)
    }

    fn cpu_time(&self) -> Result<Duration, ProcessInfoError> {
        parse_cpu_time(&self.proc_path.join("stat"))
    }

    fn thread_count(&self) -> Result<u64, ProcessInfoError> {
        self.status_value("Threads")
    }

    fn process_id(&self) -> u32 {
        self.pid
    }

    fn start_time(&self) -> Result<DateTime<Utc>, ProcessInfoError> {
        let stat = self.read(&self.proc_path.join("stat"))?;
        let start_ticks = parse_start_ticks(&stat)?;
        let boot_time = parse_boot_time(&self.read(&self.system_stat_path)?)?;

        let start_ms = boot_time as f64 * 1000.0 + start_ticks as f64 / *CLK_TCK * 1000.0;
        Utc.timestamp_millis_opt(start_ms as i64)
            .single()
            .ok_or_else(|| {
                ProcessInfoError::Unavailable(format!("start time {start_ms}ms out of range"))
            })
    }

    fn processor_count(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn heap_bytes(&self) -> u64 {
        TrackingAllocator::live_bytes()
    }

    /// No garbage collector runs in this process, so every generation reports zero.
    fn gc_collections(&self) -> GcCollections {
        GcCollections::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STATUS: &str = "Name:\tfunction-host\nState:\tS (sleeping)\nPid:\t4242\nVmPeak:\t  120000 kB\nVmRSS:\t   20480 kB\nThreads:\t9\n";
    const STAT: &str = "4242 (function-host) S 1 4242 4242 0 -1 4194304 100 0 0 0 300 200 0 0 20 0 9 0 1000 12345678 1234 18446744073709551615";
    const SYSTEM_STAT: &str = "cpu  1 2 3 4 5 6 7 8\nctxt 100\nbtime 1700000000\nprocesses 77\n";

    fn fake_proc() -> (tempfile::TempDir, ProcfsProcessInfo) {
        let dir = tempdir().expect("Failed to create temp dir");
        let self_dir = dir.path().join("self");
        fs::create_dir(&self_dir).expect("Failed to create self dir");
        fs::write(self_dir.join("status"), STATUS).expect("Failed to write status");
        fs::write(self_dir.join("stat"), STAT).expect("Failed to write stat");
        fs::write(dir.path().join("stat"), SYSTEM_STAT).expect("Failed to write system stat");
        let info = ProcfsProcessInfo::new(self_dir, dir.path().join("stat"), 4242);
        (dir, info)
    }

    #[test]
    fn test_working_set_and_threads() {
        let (_dir, info) = fake_proc();
        assert_eq!(info.working_set_bytes().unwrap(), 20480 * 1024);
        assert_eq!(info.thread_count().unwrap(), 9);
        assert_eq!(info.process_id(), 4242);
    }

    #[test]
    fn test_start_time_from_boot_time_and_ticks() {
        let (_dir, info) = fake_proc();
        let start = info.start_time().unwrap();
        let expected_ms = 1_700_000_000_000i64 + (1000.0 / *CLK_TCK * 1000.0) as i64;
        assert_eq!(start.timestamp_millis(), expected_ms);
    }

    #[test]
    fn test_cpu_time_from_stat() {
        let (_dir, info) = fake_proc();
        let expected = 500.0 / *CLK_TCK;
        assert!((info.cpu_time().unwrap().as_secs_f64() - expected).abs() < 0.001);
    }

    #[test]
    fn test_missing_status_is_io_error() {
        let dir = tempdir().expect("Failed to create temp dir");
        let info = ProcfsProcessInfo::new(dir.path(), dir.path().join("stat"), 1);
        assert!(matches!(
            info.working_set_bytes(),
            Err(ProcessInfoError::Io { .. })
        ));
    }

    #[test]
    fn test_parse_status_value_requires_exact_key() {
        let content = "VmRSSx:\t1 kB\nVmRSS:\t2 kB\n";
        assert_eq!(parse_status_value(content, "VmRSS").unwrap(), 2);
        assert!(parse_status_value(content, "Threads").is_err());
    }

    #[test]
    fn test_parse_boot_time_missing() {
        assert!(parse_boot_time("cpu 1 2 3\n").is_err());
        assert_eq!(parse_boot_time(SYSTEM_STAT).unwrap(), 1_700_000_000);
    }

    #[test]
    fn test_gc_collections_are_zero() {
        let (_dir, info) = fake_proc();
        assert_eq!(info.gc_collections(), GcCollections::default());
        assert!(info.processor_count() >= 1);
    }
}
