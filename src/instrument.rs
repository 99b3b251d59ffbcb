//! Shared instrumentation around endpoint business logic.
//!
//! Every endpoint goes through [`run_instrumented`]:
//!
//! 1. a [`CallGuard`] captures the start time and opens the request span,
//! 2. the business logic runs as its own tokio task so a panic becomes an
//!    ordinary failure instead of tearing down the connection,
//! 3. the outcome is counted and turned into `200 + JSON` or a fixed status
//!    with an empty body,
//! 4. dropping the guard records the duration histogram and closes the span.
//!
//! Because step 4 lives in `Drop`, it runs exactly once on success, on failure
//! and when the request future is cancelled mid-flight.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tracing::{error, Instrument};

use crate::error::HandlerError;
use crate::state::SharedState;
use crate::telemetry::metrics::FUNCTION_REQUEST_DURATION_MS;
use crate::telemetry::RequestSpan;

/// Static description of one instrumented endpoint.
#[derive(Debug)]
pub struct Endpoint {
    /// Logical function name used in tags.
    pub function: &'static str,
    pub span_name: &'static str,
    /// Counter incremented once per request.
    pub request_counter: &'static str,
    /// Status returned when the business logic fails.
    pub failure_status: StatusCode,
    /// `status` tag on the request counter for each outcome.
    pub success_label: &'static str,
    pub failure_label: &'static str,
    /// Optional extra span tag that receives the outcome label.
    pub outcome_tag: Option<&'static str>,
    /// Message logged when the business logic fails.
    pub failure_message: &'static str,
}

/// Inbound request attributes the instrumentation needs.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
}

impl RequestInfo {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

/// Handed to the business logic of a single call.
pub struct CallContext {
    pub state: SharedState,
    pub span: RequestSpan,
    pub request: RequestInfo,
}

/// Scoped timer and span for one call.
pub struct CallGuard {
    state: SharedState,
    endpoint: &'static Endpoint,
    method: Method,
    span: RequestSpan,
    started: Instant,
}

impl CallGuard {
    /// Captures the start time and opens the span.
    pub fn start(state: SharedState, endpoint: &'static Endpoint, request: &RequestInfo) -> Self {
        let started = Instant::now();
        let span = state.spans.start(endpoint.span_name);
        span.set_tag("function.name", endpoint.function);
        span.set_tag("http.method", request.method.as_str());
        span.set_tag("http.path", request.path.clone());

        Self {
            state,
            endpoint,
            method: request.method.clone(),
            span,
            started,
        }
    }

    pub fn span(&self) -> &RequestSpan {
        &self.span
    }

    fn count_request(&self, status: &str) {
        self.state.metrics.add_counter(
            self.endpoint.request_counter,
            1.0,
            &[
                ("function", self.endpoint.function),
                ("method", self.method.as_str()),
                ("status", status),
            ],
        );
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        self.state.metrics.record_histogram(
            FUNCTION_REQUEST_DURATION_MS,
            elapsed_ms,
            &[
                ("function", self.endpoint.function),
                ("method", self.method.as_str()),
            ],
        );
        self.span.close();
    }
}

/// Runs `work` with full instrumentation and maps its outcome to a response.
pub async fn run_instrumented<T, F, Fut>(
    state: &SharedState,
    endpoint: &'static Endpoint,
    request: RequestInfo,
    work: F,
) -> Response
where
    F: FnOnce(CallContext) -> Fut,
    Fut: Future<Output = Result<T, HandlerError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let guard = CallGuard::start(state.clone(), endpoint, &request);
    let span = guard.span().clone();

    let ctx = CallContext {
        state: state.clone(),
        span: span.clone(),
        request,
    };
    let task = tokio::spawn(work(ctx).instrument(span.tracing_span().clone()));

    let outcome = match task.await {
        Ok(result) => result,
        Err(join_error) => Err(HandlerError::Task(join_error.to_string())),
    };

    match outcome {
        Ok(payload) => {
            span.set_tag("response.status", StatusCode::OK.as_str());
            if let Some(tag) = endpoint.outcome_tag {
                span.set_tag(tag, endpoint.success_label);
            }
            guard.count_request(endpoint.success_label);
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(e) => {
            span.tracing_span().in_scope(|| {
                error!(error = %e, "{}", endpoint.failure_message);
            });
            span.set_tag("response.status", endpoint.failure_status.as_str());
            if let Some(tag) = endpoint.outcome_tag {
                span.set_tag(tag, endpoint.failure_label);
            }
            span.set_error(e.to_string());
            guard.count_request(endpoint.failure_label);
            endpoint.failure_status.into_response()
        }
    }
}
