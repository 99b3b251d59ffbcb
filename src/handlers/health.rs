//! Health check endpoint handler.
//!
//! This module provides the `/Health` endpoint. The check probes the process
//! information provider; if it cannot be read the host reports itself
//! unhealthy with `503 Service Unavailable`.

use axum::extract::{OriginalUri, State};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::HandlerError;
use crate::instrument::{run_instrumented, CallContext, Endpoint, RequestInfo};
use crate::state::SharedState;
use crate::telemetry::metrics::HEALTH_CHECKS_TOTAL;

pub static HEALTH_ENDPOINT: Endpoint = Endpoint {
    function: "Health",
    span_name: "HealthFunction.Run",
    request_counter: HEALTH_CHECKS_TOTAL,
    failure_status: StatusCode::SERVICE_UNAVAILABLE,
    success_label: "healthy",
    failure_label: "unhealthy",
    outcome_tag: Some("health.status"),
    failure_message: "Health check failed",
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
    /// Host uptime in milliseconds.
    pub uptime: u64,
}

/// Handler for the /Health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(
    State(state): State<SharedState>,
    method: Method,
    uri: OriginalUri,
) -> Response {
    let request = RequestInfo::new(method, uri.0.path());

    run_instrumented(&state, &HEALTH_ENDPOINT, request, check_health).await
}

async fn check_health(ctx: CallContext) -> Result<HealthResponse, HandlerError> {
    info!("Health check requested.");

    let working_set = ctx.state.process.working_set_bytes()?;
    debug!("Health probe read working set: {} bytes", working_set);

    let config = &ctx.state.config;
    Ok(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        service: config.service_name().to_string(),
        version: config.service_version().to_string(),
        uptime: ctx.state.uptime_ms(),
    })
}
