//! # Structured Logging Module
//!
//! Environment-aware structured logging for paging readers. Console output by
//! default, JSON lines when `KEYSET_LOG_FORMAT=json`.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    let environment = get_environment();
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| get_log_level(&environment));
    let json = std::env::var("KEYSET_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    install(&environment, filter, json);
}

/// Initialize structured logging from loaded configuration; `RUST_LOG` still wins
pub fn init_from_config(config: &LoggingConfig) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    install(&get_environment(), filter, config.json);
}

fn install(environment: &str, filter: String, json: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        };

        // A global subscriber may already be installed by the host
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            filter = %filter,
            json = json,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("KEYSET_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for a single page fetch
pub fn log_page_operation(
    reader: &str,
    page_index: u32,
    rows: usize,
    cursor: Option<&str>,
    status: &str,
) {
    tracing::debug!(
        reader = %reader,
        page_index = page_index,
        rows = rows,
        cursor = cursor,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "PAGE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
