//! # Structured Logging Module
//!
//! Environment-aware structured logging. Console output always; a JSON file
//! layer is added when `CLEARANCE_LOG_DIR` points at a writable directory.

use chrono::Utc;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ConfigManager;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(environment != "production")
            .with_filter(build_filter(&log_level));

        let file_layer = log_directory().and_then(|log_dir| {
            if std::fs::create_dir_all(&log_dir).is_err() {
                return None;
            }
            let file_name = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            let appender = tracing_appender::rolling::never(&log_dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&log_level)),
            )
        });

        let has_file_layer = file_layer.is_some();
        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            file_output = has_file_layer,
            "Structured logging initialized"
        );
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn log_directory() -> Option<PathBuf> {
    std::env::var("CLEARANCE_LOG_DIR")
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log one state change of an invocation
pub fn log_invocation_transition(
    invocation_id: i64,
    provider: &str,
    operation: &str,
    from: &str,
    to: &str,
    attempt_count: i32,
) {
    tracing::info!(
        invocation_id = invocation_id,
        provider = %provider,
        operation = %operation,
        from = %from,
        to = %to,
        attempt_count = attempt_count,
        "INVOCATION_TRANSITION"
    );
}

/// Log the summary of one sweep iteration
pub fn log_sweep_summary(sweep: &str, examined: usize, advanced: usize, skipped: usize) {
    tracing::info!(
        sweep = %sweep,
        examined = examined,
        advanced = advanced,
        skipped = skipped,
        "SWEEP_COMPLETED"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
    }
}
