//! Check command implementation.
//!
//! Probes the process provider and runs every endpoint once without a
//! listener, printing what the instrumentation recorded.

use anyhow::{Context, Result};
use axum::body::to_bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{Method, Uri};
use axum::response::Response;
use std::sync::Arc;

use function_host::config::{validate_effective_config, Config};
use function_host::handlers::{echo_handler, health_handler, metrics_handler, system_metrics_handler};
use function_host::process::{ProcessInfo, ProcfsProcessInfo, TrackingAllocator};
use function_host::state::AppState;
use function_host::telemetry::{InMemorySink, InMemorySpanSink};

/// Largest response body printed by the check.
const BODY_LIMIT: usize = 64 * 1024;

/// Validates configuration, probes `/proc` and exercises each endpoint.
pub async fn command_check(verbose: bool, config: &Config) -> Result<()> {
    println!("🔍 Function Host - System Check");
    println!("================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(()) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📁 Probing process information...");
    let provider = ProcfsProcessInfo::default();
    all_ok &= probe(
        "working set",
        provider.working_set_bytes().map(|b| format!("{} bytes", b)),
    );
    all_ok &= probe("cpu time", provider.cpu_time().map(|d| format!("{:?}", d)));
    all_ok &= probe("threads", provider.thread_count().map(|n| n.to_string()));
    all_ok &= probe("start time", provider.start_time().map(|t| t.to_rfc3339()));
    println!(
        "   ℹ️  pid={} processors={} heap={} bytes ({} allocations)",
        provider.process_id(),
        provider.processor_count(),
        provider.heap_bytes(),
        TrackingAllocator::allocations()
    );

    println!("\n🧪 Running endpoints offline...");
    let metrics = Arc::new(InMemorySink::new());
    let spans = Arc::new(InMemorySpanSink::new());
    let state = AppState::new(
        config.clone(),
        Arc::new(provider),
        metrics.clone(),
        spans.clone(),
    )
    .into_shared();

    let prefix = config.route_prefix();
    let echo = echo_handler(State(state.clone()), Method::GET, uri(prefix, "/Function1")?).await;
    let health = health_handler(State(state.clone()), Method::GET, uri(prefix, "/Health")?).await;
    let process = metrics_handler(State(state.clone()), Method::GET, uri(prefix, "/Metrics")?).await;
    let system =
        system_metrics_handler(State(state.clone()), Method::GET, uri(prefix, "/SystemMetrics")?)
            .await;

    let calls = [
        ("/Function1", echo),
        ("/Health", health),
        ("/Metrics", process),
        ("/SystemMetrics", system),
    ];
    for (route, response) in calls {
        all_ok &= report(route, response, verbose).await?;
    }

    let events = metrics.events();
    let finished = spans.spans();
    println!(
        "\n📊 Recorded {} metric events and {} spans",
        events.len(),
        finished.len()
    );
    if verbose {
        for event in &events {
            println!(
                "   {:?} {} = {} {:?}",
                event.kind, event.name, event.value, event.tags
            );
        }
        for span in &finished {
            println!(
                "   span {} [{}] {:?} {:.2}ms",
                span.name,
                span.correlation_id,
                span.status,
                span.duration.as_secs_f64() * 1000.0
            );
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - host is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output");
        std::process::exit(1);
    }
}

fn probe<E: std::fmt::Display>(what: &str, reading: Result<String, E>) -> bool {
    match reading {
        Ok(value) => {
            println!("   ✅ {}: {}", what, value);
            true
        }
        Err(e) => {
            println!("   ❌ {}: {}", what, e);
            false
        }
    }
}

fn uri(prefix: &str, route: &str) -> Result<OriginalUri> {
    let uri: Uri = format!("{prefix}{route}")
        .parse()
        .with_context(|| format!("invalid route {prefix}{route}"))?;
    Ok(OriginalUri(uri))
}

async fn report(route: &str, response: Response, verbose: bool) -> Result<bool> {
    let status = response.status();
    let body = to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .with_context(|| format!("reading {route} response"))?;

    if status.is_success() {
        println!("   ✅ {} -> {}", route, status);
    } else {
        println!("   ❌ {} -> {}", route, status);
    }
    if verbose && !body.is_empty() {
        println!("      {}", String::from_utf8_lossy(&body));
    }
    Ok(status.is_success())
}
