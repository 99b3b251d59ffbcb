//! System metrics endpoint handler.
//!
//! `/SystemMetrics` samples heap, working set, threads, CPU and collector
//! counts, records each reading as a histogram and answers with a nested
//! snapshot of the same values.

use axum::extract::{OriginalUri, State};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::HandlerError;
use crate::instrument::{run_instrumented, CallContext, Endpoint, RequestInfo};
use crate::state::SharedState;
use crate::telemetry::metrics::{
    PROCESS_CPU_USAGE_PERCENT, PROCESS_HEAP_BYTES, PROCESS_THREAD_COUNT,
    PROCESS_WORKING_SET_BYTES, RUNTIME_GC_COLLECTIONS_TOTAL, SYSTEM_METRICS_REQUESTS_TOTAL,
};

pub const SYSTEM_METRICS_MESSAGE: &str = "System metrics collected";

pub static SYSTEM_METRICS_ENDPOINT: Endpoint = Endpoint {
    function: "SystemMetrics",
    span_name: "SystemMetricsFunction.Run",
    request_counter: SYSTEM_METRICS_REQUESTS_TOTAL,
    failure_status: StatusCode::INTERNAL_SERVER_ERROR,
    success_label: "ok",
    failure_label: "error",
    outcome_tag: None,
    failure_message: "System metrics collection failed",
};

#[derive(Debug, Serialize)]
pub struct SystemMetricsResponse {
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub metrics: SystemMetrics,
}

#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    /// Live heap bytes as seen by the allocator.
    pub managed_memory_bytes: u64,
    /// Resident set size of the process.
    pub total_memory_bytes: u64,
    pub cpu_usage_percent: f64,
    pub thread_count: u64,
    pub garbage_collection: GarbageCollection,
    pub process_info: ProcessSummary,
}

#[derive(Debug, Serialize)]
pub struct GarbageCollection {
    pub gen0_collections: u64,
    pub gen1_collections: u64,
    pub gen2_collections: u64,
}

#[derive(Debug, Serialize)]
pub struct ProcessSummary {
    pub process_id: u32,
    pub start_time: DateTime<Utc>,
    pub uptime_ms: u64,
    pub processor_count: usize,
}

/// Handler for the /SystemMetrics endpoint.
#[instrument(skip(state))]
pub async fn system_metrics_handler(
    State(state): State<SharedState>,
    method: Method,
    uri: OriginalUri,
) -> Response {
    let request = RequestInfo::new(method, uri.0.path());

    run_instrumented(
        &state,
        &SYSTEM_METRICS_ENDPOINT,
        request,
        collect_system_metrics,
    )
    .await
}

async fn collect_system_metrics(ctx: CallContext) -> Result<SystemMetricsResponse, HandlerError> {
    info!("System metrics requested.");

    let state = &ctx.state;
    let process = state.process.as_ref();

    let heap_bytes = process.heap_bytes();
    let working_set = process.working_set_bytes()?;
    let thread_count = process.thread_count()?;
    let start_time = process.start_time()?;
    let processor_count = process.processor_count();
    let cpu_usage = state.cpu_sampler.sample(process, processor_count);
    let gc = process.gc_collections();
    debug!(
        "Sampled heap={} working_set={} threads={} cpu={}%",
        heap_bytes, working_set, thread_count, cpu_usage
    );

    // Emit only once every reading has succeeded
    let metrics = &state.metrics;
    metrics.record_histogram(PROCESS_HEAP_BYTES, heap_bytes as f64, &[]);
    metrics.record_histogram(PROCESS_WORKING_SET_BYTES, working_set as f64, &[]);
    metrics.record_histogram(PROCESS_THREAD_COUNT, thread_count as f64, &[]);
    metrics.record_histogram(PROCESS_CPU_USAGE_PERCENT, cpu_usage, &[]);
    for (generation, count) in gc.by_generation() {
        metrics.add_counter(
            RUNTIME_GC_COLLECTIONS_TOTAL,
            count as f64,
            &[("generation", generation)],
        );
    }

    Ok(SystemMetricsResponse {
        message: SYSTEM_METRICS_MESSAGE,
        timestamp: Utc::now(),
        service: state.config.service_name().to_string(),
        metrics: SystemMetrics {
            managed_memory_bytes: heap_bytes,
            total_memory_bytes: working_set,
            cpu_usage_percent: cpu_usage,
            thread_count,
            garbage_collection: GarbageCollection {
                gen0_collections: gc.gen0,
                gen1_collections: gc.gen1,
                gen2_collections: gc.gen2,
            },
            process_info: ProcessSummary {
                process_id: process.process_id(),
                start_time,
                uptime_ms: state.uptime_ms(),
                processor_count,
            },
        },
    })
}
