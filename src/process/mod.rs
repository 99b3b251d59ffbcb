//! Process-related modules for resource readings of the host process.
//!
//! This module provides:
//! - `info`: the `ProcessInfo` provider trait and its error type
//! - `procfs`: the `/proc` backed provider
//! - `cpu`: CPU time parsing and the CPU usage sampler
//! - `alloc`: heap accounting allocator

pub mod alloc;
pub mod cpu;
pub mod info;
pub mod procfs;

// Re-export commonly used types
pub use alloc::TrackingAllocator;
pub use cpu::{parse_cpu_time, CpuSample, CpuUsageSampler, CLK_TCK};
pub use info::{GcCollections, ProcessInfo, ProcessInfoError};
pub use procfs::ProcfsProcessInfo;
