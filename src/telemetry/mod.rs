//! Telemetry primitives: metric sinks and request spans.

pub mod metrics;
pub mod trace;

pub use metrics::{InMemorySink, MetricEvent, MetricKind, MetricsSink, PrometheusSink};
pub use trace::{
    FinishedSpan, InMemorySpanSink, LogSpanSink, RequestSpan, SpanFactory, SpanSink, SpanStatus,
};
