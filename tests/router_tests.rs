//! Integration tests for route wiring and the Prometheus exposition endpoint.
//!
//! Each test serves the router on an ephemeral port and talks plain HTTP/1.1
//! to it over a TCP stream.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::{test_config, FakeProcess};
use function_host::config::Config;
use function_host::state::AppState;
use function_host::telemetry::{InMemorySpanSink, PrometheusSink};
use function_host::build_router;

async fn serve(config: Config) -> SocketAddr {
    let registry = Arc::new(PrometheusSink::new().expect("registry should build"));
    let enable_prometheus = config.enable_prometheus.unwrap_or(true);
    let mut state = AppState::new(
        config,
        Arc::new(FakeProcess::default()),
        registry.clone(),
        Arc::new(InMemorySpanSink::new()),
    );
    if enable_prometheus {
        state = state.with_exposition(registry);
    }
    let app = build_router(state.into_shared());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Sends one request and returns the status code and body.
async fn request(addr: SocketAddr, method: &str, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("response should carry a status line");
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn test_function_routes_are_served() {
    let addr = serve(test_config()).await;

    assert_eq!(request(addr, "GET", "/Function1").await.0, 200);
    assert_eq!(request(addr, "POST", "/Function1").await.0, 200);
    assert_eq!(request(addr, "GET", "/Health").await.0, 200);
    assert_eq!(request(addr, "GET", "/Metrics").await.0, 200);
    assert_eq!(request(addr, "GET", "/SystemMetrics").await.0, 200);
    assert_eq!(request(addr, "GET", "/Nope").await.0, 404);
}

#[tokio::test]
async fn test_route_prefix_nests_function_routes() {
    let addr = serve(Config {
        route_prefix: Some("/api/".to_string()),
        ..test_config()
    })
    .await;

    assert_eq!(request(addr, "GET", "/api/Health").await.0, 200);
    assert_eq!(request(addr, "GET", "/Health").await.0, 404);
    // The exposition path is never prefixed
    assert_eq!(request(addr, "GET", "/prometheus").await.0, 200);
}

#[tokio::test]
async fn test_disabled_endpoints_are_not_routed() {
    let addr = serve(Config {
        enable_health: Some(false),
        enable_prometheus: Some(false),
        ..test_config()
    })
    .await;

    assert_eq!(request(addr, "GET", "/Health").await.0, 404);
    assert_eq!(request(addr, "GET", "/prometheus").await.0, 404);
    assert_eq!(request(addr, "GET", "/Metrics").await.0, 200);
}

#[tokio::test]
async fn test_exposition_reflects_served_requests() {
    let addr = serve(Config {
        prometheus_path: Some("/internal/metrics".to_string()),
        ..test_config()
    })
    .await;

    request(addr, "GET", "/Function1").await;
    request(addr, "GET", "/SystemMetrics").await;

    let (status, body) = request(addr, "GET", "/internal/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains(
        r#"function_requests_total{function="Function1",method="GET",status="ok"} 1"#
    ));
    assert!(body.contains(r#"runtime_gc_collections_total{generation="0"} 7"#));
    assert!(body.contains("function_request_duration_ms_count{function=\"SystemMetrics\",method=\"GET\"} 1"));
}
