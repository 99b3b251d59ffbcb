//! Function Host Library
//!
//! A small HTTP function host. Four endpoints (echo, health, process metrics
//! and system metrics) run their business logic through one instrumentation
//! pattern that opens a correlation span, counts the request, records its
//! duration and maps failures to a fixed status with an empty body.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use function_host::{build_router, AppState, Config, LogSpanSink, ProcfsProcessInfo, PrometheusSink};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(PrometheusSink::new()?);
//! let state = AppState::new(
//!     Config::default(),
//!     Arc::new(ProcfsProcessInfo::default()),
//!     registry.clone(),
//!     Arc::new(LogSpanSink),
//! )
//! .with_exposition(registry)
//! .into_shared();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:7071").await?;
//! axum::serve(listener, build_router(state)).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod instrument;
pub mod process;
pub mod router;
pub mod state;
pub mod telemetry;

// Re-export main types for convenience
pub use config::Config;
pub use error::HandlerError;
pub use instrument::{run_instrumented, CallContext, CallGuard, Endpoint, RequestInfo};
pub use process::{CpuUsageSampler, GcCollections, ProcessInfo, ProcessInfoError, ProcfsProcessInfo};
pub use router::build_router;
pub use state::{AppState, SharedState};
pub use telemetry::{
    InMemorySink, InMemorySpanSink, LogSpanSink, MetricsSink, PrometheusSink, SpanFactory,
};
