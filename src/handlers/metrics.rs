//! Process metrics endpoint handler.
//!
//! `/Metrics` reports the host's working set and identity and feeds the same
//! readings into the metrics registry.

use axum::extract::{OriginalUri, State};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::Ordering;
use tracing::{info, instrument};

use crate::error::HandlerError;
use crate::instrument::{run_instrumented, CallContext, Endpoint, RequestInfo};
use crate::state::{AppState, SharedState};
use crate::telemetry::metrics::{
    METRICS_REQUESTS_TOTAL, PROCESS_INFO_REQUESTS_TOTAL, SYSTEM_MEMORY_USAGE_BYTES,
};

pub const METRICS_MESSAGE: &str = "Metrics are being collected via the Prometheus registry";

pub static METRICS_ENDPOINT: Endpoint = Endpoint {
    function: "Metrics",
    span_name: "MetricsFunction.Run",
    request_counter: METRICS_REQUESTS_TOTAL,
    failure_status: StatusCode::INTERNAL_SERVER_ERROR,
    success_label: "ok",
    failure_label: "error",
    outcome_tag: None,
    failure_message: "Metrics endpoint failed",
};

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub memory_usage_bytes: u64,
    pub process_start_time: DateTime<Utc>,
    pub uptime_ms: u64,
}

/// Moves the up-down memory counter to `working_set`.
///
/// The counter only accepts deltas, so the last reported value is swapped out
/// atomically and the difference is emitted. Concurrent callers each emit
/// their own step and the running total always ends at the last value stored.
pub fn report_working_set(state: &AppState, working_set: u64) {
    let previous = state
        .reported_working_set
        .swap(working_set, Ordering::AcqRel);
    let delta = working_set as f64 - previous as f64;
    if delta != 0.0 {
        state
            .metrics
            .add_up_down(SYSTEM_MEMORY_USAGE_BYTES, delta, &[]);
    }
}

/// Handler for the /Metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
    method: Method,
    uri: OriginalUri,
) -> Response {
    let request = RequestInfo::new(method, uri.0.path());

    run_instrumented(&state, &METRICS_ENDPOINT, request, collect_metrics).await
}

async fn collect_metrics(ctx: CallContext) -> Result<MetricsResponse, HandlerError> {
    info!("Metrics endpoint requested.");

    let process = &ctx.state.process;
    let working_set = process.working_set_bytes()?;
    let start_time = process.start_time()?;
    let process_id = process.process_id().to_string();

    report_working_set(&ctx.state, working_set);
    ctx.state.metrics.add_counter(
        PROCESS_INFO_REQUESTS_TOTAL,
        1.0,
        &[
            ("function", METRICS_ENDPOINT.function),
            ("process_id", process_id.as_str()),
        ],
    );

    Ok(MetricsResponse {
        message: METRICS_MESSAGE,
        timestamp: Utc::now(),
        service: ctx.state.config.service_name().to_string(),
        memory_usage_bytes: working_set,
        process_start_time: start_time,
        uptime_ms: ctx.state.uptime_ms(),
    })
}
