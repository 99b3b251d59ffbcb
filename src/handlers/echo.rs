//! Echo endpoint handler.
//!
//! `/Function1` simulates a small amount of work with a random delay and
//! answers with a greeting, the server time and the request's correlation id.

use axum::extract::{OriginalUri, State};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::HandlerError;
use crate::instrument::{run_instrumented, CallContext, Endpoint, RequestInfo};
use crate::state::SharedState;
use crate::telemetry::metrics::FUNCTION_REQUESTS_TOTAL;

pub const ECHO_MESSAGE: &str = "Welcome to the function host!";

pub static ECHO_ENDPOINT: Endpoint = Endpoint {
    function: "Function1",
    span_name: "Function1.Run",
    request_counter: FUNCTION_REQUESTS_TOTAL,
    failure_status: StatusCode::INTERNAL_SERVER_ERROR,
    success_label: "ok",
    failure_label: "error",
    outcome_tag: None,
    failure_message: "Error processing request",
};

#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// Handler for the /Function1 endpoint (GET and POST).
#[instrument(skip(state))]
pub async fn echo_handler(
    State(state): State<SharedState>,
    method: Method,
    uri: OriginalUri,
) -> Response {
    let request = RequestInfo::new(method, uri.0.path());

    run_instrumented(&state, &ECHO_ENDPOINT, request, echo).await
}

async fn echo(ctx: CallContext) -> Result<EchoResponse, HandlerError> {
    info!("HTTP trigger function processed a request.");

    let (min_ms, max_ms) = ctx.state.config.echo_delay_ms();
    let delay_ms = rand::thread_rng().gen_range(min_ms..=max_ms);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    Ok(EchoResponse {
        message: ECHO_MESSAGE,
        timestamp: Utc::now(),
        request_id: ctx.span.correlation_id().to_string(),
    })
}
