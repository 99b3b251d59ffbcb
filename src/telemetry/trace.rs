//! Request correlation spans.
//!
//! [`SpanFactory`] hands out one [`RequestSpan`] per request. A span collects
//! tags and an error status while the request runs; closing it freezes it into
//! a [`FinishedSpan`] that is passed to the configured [`SpanSink`] exactly
//! once. Each span also owns a `tracing` span so log lines emitted while the
//! request runs carry the correlation id.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info_span};

/// Final status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Immutable record of a closed span.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub name: String,
    pub correlation_id: String,
    pub tags: BTreeMap<String, String>,
    pub status: SpanStatus,
    pub error_message: Option<String>,
    pub duration: Duration,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Receives closed spans.
pub trait SpanSink: Send + Sync {
    fn export(&self, span: FinishedSpan);
}

/// Writes closed spans to the log at debug level.
#[derive(Debug, Default)]
pub struct LogSpanSink;

impl SpanSink for LogSpanSink {
    fn export(&self, span: FinishedSpan) {
        debug!(
            span.name = %span.name,
            span.id = %span.correlation_id,
            span.status = ?span.status,
            span.error = span.error_message.as_deref().unwrap_or(""),
            duration_ms = span.duration.as_secs_f64() * 1000.0,
            tags = ?span.tags,
            "span closed"
        );
    }
}

/// Keeps closed spans in memory.
#[derive(Default)]
pub struct InMemorySpanSink {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl InMemorySpanSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.spans
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl SpanSink for InMemorySpanSink {
    fn export(&self, span: FinishedSpan) {
        if let Ok(mut guard) = self.spans.lock() {
            guard.push(span);
        }
    }
}

/// Creates request spans for one instrumentation source.
#[derive(Clone)]
pub struct SpanFactory {
    source: Arc<str>,
    sink: Arc<dyn SpanSink>,
}

impl SpanFactory {
    pub fn new(source: &str, sink: Arc<dyn SpanSink>) -> Self {
        Self {
            source: Arc::from(source),
            sink,
        }
    }

    /// Opens a new span with a fresh correlation id.
    pub fn start(&self, name: &str) -> RequestSpan {
        let correlation_id = new_correlation_id();
        let tracing_span = info_span!(
            "request",
            otel.name = %name,
            source = %self.source,
            correlation_id = %correlation_id
        );

        RequestSpan {
            inner: Arc::new(SpanInner {
                name: name.to_string(),
                correlation_id,
                started: Instant::now(),
                tracing_span,
                sink: self.sink.clone(),
                state: Mutex::new(Some(SpanState {
                    tags: BTreeMap::new(),
                    status: SpanStatus::Ok,
                    error_message: None,
                })),
            }),
        }
    }
}

/// Builds a W3C trace-context style id: `00-<trace id>-<span id>-01`.
fn new_correlation_id() -> String {
    let trace_id: u128 = rand::random::<u128>().max(1);
    let span_id: u64 = rand::random::<u64>().max(1);
    format!("00-{trace_id:032x}-{span_id:016x}-01")
}

struct SpanState {
    tags: BTreeMap<String, String>,
    status: SpanStatus,
    error_message: Option<String>,
}

struct SpanInner {
    name: String,
    correlation_id: String,
    started: Instant,
    tracing_span: tracing::Span,
    sink: Arc<dyn SpanSink>,
    /// `None` once the span has been closed.
    state: Mutex<Option<SpanState>>,
}

/// Handle to an open span. Clones share the same span.
#[derive(Clone)]
pub struct RequestSpan {
    inner: Arc<SpanInner>,
}

impl RequestSpan {
    pub fn correlation_id(&self) -> &str {
        &self.inner.correlation_id
    }

    pub fn tracing_span(&self) -> &tracing::Span {
        &self.inner.tracing_span
    }

    /// Sets a tag. Ignored after the span is closed.
    pub fn set_tag(&self, key: &str, value: impl Into<String>) {
        self.with_state(|state| {
            state.tags.insert(key.to_string(), value.into());
        });
    }

    /// Marks the span as failed. Ignored after the span is closed.
    pub fn set_error(&self, message: impl Into<String>) {
        self.with_state(|state| {
            state.status = SpanStatus::Error;
            state.error_message = Some(message.into());
        });
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    /// Closes the span and exports it. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let taken = match self.inner.state.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(state) = taken else {
            return false;
        };

        self.inner.sink.export(FinishedSpan {
            name: self.inner.name.clone(),
            correlation_id: self.inner.correlation_id.clone(),
            tags: state.tags,
            status: state.status,
            error_message: state.error_message,
            duration: self.inner.started.elapsed(),
        });
        true
    }

    fn with_state(&self, f: impl FnOnce(&mut SpanState)) {
        if let Ok(mut guard) = self.inner.state.lock() {
            if let Some(state) = guard.as_mut() {
                f(state);
            }
        }
    }
}
