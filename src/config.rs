//! Configuration management for function-host.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 7071;
pub const DEFAULT_SERVICE_NAME: &str = "FunctionApp1";
pub const DEFAULT_SERVICE_VERSION: &str = "1.0.0";
pub const DEFAULT_PROMETHEUS_PATH: &str = "/prometheus";
pub const DEFAULT_ECHO_DELAY_MIN_MS: u64 = 50;
pub const DEFAULT_ECHO_DELAY_MAX_MS: u64 = 200;

/// Upper bound for the simulated echo latency.
pub const MAX_ECHO_DELAY_MS: u64 = 10_000;

/// Paths of the four function routes, relative to `route_prefix`.
pub const FUNCTION_ROUTES: [&str; 4] = ["/Function1", "/Health", "/Metrics", "/SystemMetrics"];

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Service identity
    #[serde(alias = "service-name")]
    pub service_name: Option<String>,
    #[serde(alias = "service-version")]
    pub service_version: Option<String>,

    // Routing
    /// Prefix for the function routes, e.g. "/api". Empty serves them at the root.
    #[serde(alias = "route-prefix")]
    pub route_prefix: Option<String>,

    // Echo endpoint
    #[serde(alias = "echo-delay-min-ms")]
    pub echo_delay_min_ms: Option<u64>,
    #[serde(alias = "echo-delay-max-ms")]
    pub echo_delay_max_ms: Option<u64>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,
    #[serde(alias = "enable-prometheus")]
    pub enable_prometheus: Option<bool>,
    #[serde(alias = "prometheus-path")]
    pub prometheus_path: Option<String>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            service_name: Some(DEFAULT_SERVICE_NAME.to_string()),
            service_version: Some(DEFAULT_SERVICE_VERSION.to_string()),
            route_prefix: Some(String::new()),
            echo_delay_min_ms: Some(DEFAULT_ECHO_DELAY_MIN_MS),
            echo_delay_max_ms: Some(DEFAULT_ECHO_DELAY_MAX_MS),
            enable_health: Some(true),
            enable_prometheus: Some(true),
            prometheus_path: Some(DEFAULT_PROMETHEUS_PATH.to_string()),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    pub fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(DEFAULT_SERVICE_NAME)
    }

    pub fn service_version(&self) -> &str {
        self.service_version
            .as_deref()
            .unwrap_or(DEFAULT_SERVICE_VERSION)
    }

    /// Route prefix without a trailing slash ("" when unset).
    pub fn route_prefix(&self) -> &str {
        self.route_prefix
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/')
    }

    pub fn prometheus_path(&self) -> &str {
        self.prometheus_path
            .as_deref()
            .unwrap_or(DEFAULT_PROMETHEUS_PATH)
    }

    /// Effective log level; unknown names fall back to info.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(|level| LogLevel::from_str(level, true).ok())
            .unwrap_or_default()
    }

    /// Inclusive range of the simulated echo latency in milliseconds.
    pub fn echo_delay_ms(&self) -> (u64, u64) {
        (
            self.echo_delay_min_ms.unwrap_or(DEFAULT_ECHO_DELAY_MIN_MS),
            self.echo_delay_max_ms.unwrap_or(DEFAULT_ECHO_DELAY_MAX_MS),
        )
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.service_name().trim().is_empty() {
        return Err("service_name must not be empty".into());
    }

    let (min_ms, max_ms) = cfg.echo_delay_ms();
    if min_ms > max_ms {
        return Err(format!(
            "echo_delay_min_ms ({}) must not exceed echo_delay_max_ms ({})",
            min_ms, max_ms
        )
        .into());
    }
    if max_ms > MAX_ECHO_DELAY_MS {
        return Err(format!(
            "echo_delay_max_ms ({}) must not exceed {}",
            max_ms, MAX_ECHO_DELAY_MS
        )
        .into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_str(level, true).is_err() {
            return Err(format!(
                "log_level '{}' must be one of off, error, warn, info, debug, trace",
                level
            )
            .into());
        }
    }

    let prefix = cfg.route_prefix();
    if !prefix.is_empty() && !prefix.starts_with('/') {
        return Err(format!("route_prefix '{}' must start with '/'", prefix).into());
    }
    check_literal_path("route_prefix", prefix)?;

    if cfg.enable_prometheus.unwrap_or(true) {
        let path = cfg.prometheus_path();
        if !path.starts_with('/') || path.len() < 2 {
            return Err(format!("prometheus_path '{}' must start with '/'", path).into());
        }
        check_literal_path("prometheus_path", path)?;
        let collides = FUNCTION_ROUTES
            .iter()
            .any(|route| format!("{prefix}{route}") == path);
        if collides {
            return Err(format!(
                "prometheus_path '{}' collides with a function route",
                path
            )
            .into());
        }
    }

    Ok(())
}

/// Rejects paths the router would read as captures or wildcards.
fn check_literal_path(field: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dynamic = path.contains('{')
        || path.contains('}')
        || path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'));
    if dynamic {
        return Err(format!(
            "{} '{}' must be a literal path without captures or wildcards",
            field, path
        )
        .into());
    }
    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(name) = &args.service_name {
        config.service_name = Some(name.clone());
    }
    if let Some(prefix) = &args.route_prefix {
        config.route_prefix = Some(prefix.clone());
    }
    if let Some(level) = &args.log_level {
        config.log_level = level
            .to_possible_value()
            .map(|v| v.get_name().to_string());
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_prometheus {
        config.enable_prometheus = Some(false);
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        let defaults = [
            "/etc/function-host/function-host.yaml",
            "/etc/function-host/function-host.yml",
            "/etc/function-host/function-host.json",
            "./function-host.yaml",
            "./function-host.yml",
            "./function-host.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_default()
    };

    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format
pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}
