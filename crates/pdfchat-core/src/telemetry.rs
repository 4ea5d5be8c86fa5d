// Telemetry Module
//
// Structured logging via tracing-subscriber with an env-driven filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// ============================================================================
// Telemetry Configuration
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, attached to the startup log line
    pub service_name: String,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Log filter (e.g., "info", "pdfchat_worker=debug")
    pub log_filter: Option<String>,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "pdfchat".to_string(),
            enable_console: true,
            log_filter: None,
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_NAME`: Service name (default: "pdfchat")
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `LOG_FORMAT`: "json" for JSON lines
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "pdfchat".to_string()),
            enable_console: true,
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Install the global subscriber. Call once, early in `main`.
pub fn init_telemetry(config: TelemetryConfig) {
    let console_layer = match (config.enable_console, config.json) {
        (false, _) => None,
        (true, false) => Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(config.filter())
                .boxed(),
        ),
        (true, true) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_filter(config.filter())
                .boxed(),
        ),
    };

    tracing_subscriber::registry().with(console_layer).init();

    tracing::debug!(service = %config.service_name, "Telemetry initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "pdfchat");
        assert!(config.enable_console);
        assert!(config.log_filter.is_none());
        assert!(!config.json);
    }

    #[test]
    fn test_missing_filter_defaults_to_info() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter().to_string(), "info");
    }
}
