//! Config command implementation.
//!
//! Generates configuration files in various formats.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use function_host::cli::ConfigFormat;
use function_host::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(output: Option<PathBuf>, format: ConfigFormat, commented: bool) -> Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("function-host.yaml"));

    let mut content = render_config(&config, &format)
        .map_err(|e| anyhow::anyhow!("failed to render configuration: {}", e))?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)
            .with_context(|| format!("writing {}", output.display()))?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Function Host Configuration
# ===========================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 7071                   # HTTP port
#
# Service Identity
# ----------------
# service_name: "FunctionApp1" # Reported by /Health, /Metrics and /SystemMetrics
# service_version: "1.0.0"     # Reported by /Health
#
# Routing
# -------
# route_prefix: ""             # e.g. "/api" serves /api/Function1
#
# Echo Endpoint
# -------------
# echo_delay_min_ms: 50        # Lower bound of the simulated latency
# echo_delay_max_ms: 200       # Upper bound (at most 10000)
#
# Feature Flags
# -------------
# enable_health: true          # Enable /Health endpoint
# enable_prometheus: true      # Expose the metrics registry
# prometheus_path: "/prometheus"
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
