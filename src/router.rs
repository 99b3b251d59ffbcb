//! Axum router wiring for the function routes and the exposition endpoint.

use axum::{routing::get, Router};
use tracing::debug;

use crate::handlers::{
    echo_handler, health_handler, metrics_handler, prometheus_handler, system_metrics_handler,
};
use crate::state::SharedState;

/// Builds the HTTP router from the effective configuration in `state`.
pub fn build_router(state: SharedState) -> Router {
    let config = state.config.clone();

    let mut functions = Router::new()
        .route("/Function1", get(echo_handler).post(echo_handler))
        .route("/Metrics", get(metrics_handler))
        .route("/SystemMetrics", get(system_metrics_handler));

    if config.enable_health.unwrap_or(true) {
        functions = functions.route("/Health", get(health_handler));
    } else {
        debug!("/Health endpoint disabled");
    }

    let prefix = config.route_prefix();
    let mut app = if prefix.is_empty() {
        functions
    } else {
        debug!("Function routes nested under {}", prefix);
        Router::new().nest(prefix, functions)
    };

    if config.enable_prometheus.unwrap_or(true) {
        app = app.route(config.prometheus_path(), get(prometheus_handler));
    }

    app.with_state(state)
}
