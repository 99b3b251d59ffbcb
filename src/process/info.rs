//! Process information provider interface.
//!
//! Handlers never read `/proc` directly; they go through [`ProcessInfo`] so the
//! host can be exercised against a fake provider in tests and in the offline
//! `check` command.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Errors raised while reading process information.
#[derive(Debug, thiserror::Error)]
pub enum ProcessInfoError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {file} format: {reason}")]
    Parse { file: &'static str, reason: String },

    #[error("process information unavailable: {0}")]
    Unavailable(String),
}

/// Collection counts for the three collector generations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcCollections {
    pub gen0: u64,
    pub gen1: u64,
    pub gen2: u64,
}

impl GcCollections {
    /// Counts paired with their generation tag, oldest generation last.
    pub fn by_generation(&self) -> [(&'static str, u64); 3] {
        [("0", self.gen0), ("1", self.gen1), ("2", self.gen2)]
    }
}

/// Read access to the current process's resource usage.
pub trait ProcessInfo: Send + Sync {
    /// Resident physical memory of the process in bytes.
    fn working_set_bytes(&self) -> Result<u64, ProcessInfoError>;

    /// Cumulative user + system CPU time consumed by the process.
    fn cpu_time(&self) -> Result<Duration, ProcessInfoError>;

    /// Number of live OS threads.
    fn thread_count(&self) -> Result<u64, ProcessInfoError>;

    fn process_id(&self) -> u32;

    /// Wall-clock time at which the process started.
    fn start_time(&self) -> Result<DateTime<Utc>, ProcessInfoError>;

    /// Logical processors available to the process (never zero).
    fn processor_count(&self) -> usize;

    /// Bytes currently allocated on the heap by this program.
    fn heap_bytes(&self) -> u64;

    fn gc_collections(&self) -> GcCollections;
}
