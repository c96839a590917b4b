//! # Structured Logging Module
//!
//! Environment-aware structured logging for dispatch diagnostics. Output goes to the
//! console, as JSON when `RELAY_LOG_FORMAT=json`.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();

        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
        };

        let subscriber = tracing_subscriber::registry()
            .with(json.then(|| {
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .json()
                    .with_filter(filter())
            }))
            .with((!json).then(|| {
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(filter())
            }));

        // An embedding application may already own the global subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("RELAY_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var("RELAY_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for a completed dispatch
pub fn log_dispatch_operation(
    operation: &str,
    handler_type: &str,
    capability: Option<&str>,
    stages: usize,
    duration_us: u64,
) {
    tracing::info!(
        operation = %operation,
        handler_type = %handler_type,
        capability = capability,
        stages = stages,
        duration_us = duration_us,
        timestamp = %Utc::now().to_rfc3339(),
        "📨 DISPATCH_OPERATION"
    );
}

/// Log a failed dispatch with full context
pub fn log_dispatch_error(operation: &str, message_type: &str, error: &str, handler_error: bool) {
    tracing::error!(
        operation = %operation,
        message_type = %message_type,
        error = %error,
        handler_error = handler_error,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ DISPATCH_ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        std::env::set_var("RELAY_ENV", "test_override");
        let env = get_environment();
        assert_eq!(env, "test_override");
        std::env::remove_var("RELAY_ENV");
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_dispatch_operation(
            "dispatch_command",
            "PingHandler",
            Some("CommandHandler<Ping>"),
            0,
            12,
        );
        log_dispatch_error("dispatch_command", "Ping", "No handler registered", false);
    }
}
