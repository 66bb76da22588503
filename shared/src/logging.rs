//! Shared logging utilities for consistent tracing across the pipeline

use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Crate-scoped filter used when `RUST_LOG` is not set
pub fn default_filter(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!(
        "orchestrator={base_level},figure_orchestrator={base_level},shared={base_level},webserver={base_level},tower_http=info,reqwest=warn,hyper=warn"
    )
}

/// Initialize the stdout tracing subscriber with an optional log level
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for job-aware info logging
#[macro_export]
macro_rules! job_info {
    ($job:expr, $($arg:tt)*) => {
        tracing::info!(
            job = %$job,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for job-aware warning logging
#[macro_export]
macro_rules! job_warn {
    ($job:expr, $($arg:tt)*) => {
        tracing::warn!(
            job = %$job,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for job-aware error logging
#[macro_export]
macro_rules! job_error {
    ($job:expr, $($arg:tt)*) => {
        tracing::error!(
            job = %$job,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for job-aware debug logging
#[macro_export]
macro_rules! job_debug {
    ($job:expr, $($arg:tt)*) => {
        tracing::debug!(
            job = %$job,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: &str, details: &str) {
    info!(
        component = component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: &str, reason: &str) {
    info!(
        component = component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(component: &str, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(component: &str, message: &str) {
    info!(
        component = component,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}

/// Contextual logging helper for progress updates
pub fn log_progress(component: &str, action: &str, details: &str) {
    info!(
        component = component,
        timestamp = format_timestamp(),
        "📋 {}: {}",
        action,
        details
    );
}
