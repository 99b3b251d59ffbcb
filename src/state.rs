//! Application state management for the host.
//!
//! This module defines the shared application state that is passed to every
//! HTTP handler. All instrumentation objects are constructed once at startup
//! and injected here; nothing is held in global statics.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::process::{CpuUsageSampler, ProcessInfo};
use crate::telemetry::{MetricsSink, PrometheusSink, SpanFactory, SpanSink};

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub config: Arc<Config>,
    /// Destination for all metric events.
    pub metrics: Arc<dyn MetricsSink>,
    /// Registry rendered on the Prometheus endpoint, when enabled.
    pub exposition: Option<Arc<PrometheusSink>>,
    pub spans: SpanFactory,
    pub process: Arc<dyn ProcessInfo>,
    pub cpu_sampler: CpuUsageSampler,
    /// Working set last reported to the up-down memory counter.
    pub reported_working_set: AtomicU64,
    /// Host start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Builds the state; the CPU sampler baseline is taken now.
    pub fn new(
        config: Config,
        process: Arc<dyn ProcessInfo>,
        metrics: Arc<dyn MetricsSink>,
        span_sink: Arc<dyn SpanSink>,
    ) -> Self {
        let spans = SpanFactory::new(config.service_name(), span_sink);
        let cpu_sampler = CpuUsageSampler::starting_now(process.as_ref());
        Self {
            config: Arc::new(config),
            metrics,
            exposition: None,
            spans,
            process,
            cpu_sampler,
            reported_working_set: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Exposes `registry` on the Prometheus endpoint.
    pub fn with_exposition(mut self, registry: Arc<PrometheusSink>) -> Self {
        self.exposition = Some(registry);
        self
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Milliseconds since the host started.
    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}
