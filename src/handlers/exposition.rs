//! Prometheus exposition endpoint handler.
//!
//! Renders the aggregated registry in text format for an external scraper.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Error type for exposition failures.
#[derive(Debug)]
pub enum ExpositionError {
    /// The host runs without a Prometheus registry.
    Disabled,
    EncodingFailed,
}

impl IntoResponse for ExpositionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ExpositionError::Disabled => {
                (StatusCode::NOT_FOUND, "Prometheus exposition is disabled").into_response()
            }
            ExpositionError::EncodingFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response(),
        }
    }
}

/// Handler for the Prometheus exposition endpoint.
#[instrument(skip(state))]
pub async fn prometheus_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ExpositionError> {
    let start = Instant::now();
    let registry = state.exposition.as_ref().ok_or(ExpositionError::Disabled)?;

    let body = registry.encode().map_err(|e| {
        error!("Failed to encode Prometheus registry: {}", e);
        ExpositionError::EncodingFailed
    })?;

    debug!(
        "Encoded {} bytes of metrics in {:.3}ms",
        body.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body))
}
