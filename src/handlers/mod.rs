//! HTTP endpoint handlers for the function host.
//!
//! This module contains all HTTP handlers:
//! - `echo`: /Function1 greeting with simulated latency
//! - `health`: /Health liveness probe
//! - `metrics`: /Metrics working set and process identity
//! - `system`: /SystemMetrics heap, CPU, thread and collector snapshot
//! - `exposition`: registry exposition in Prometheus text format

pub mod echo;
pub mod exposition;
pub mod health;
pub mod metrics;
pub mod system;

// Re-export handlers
pub use echo::echo_handler;
pub use exposition::prometheus_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use system::system_metrics_handler;
