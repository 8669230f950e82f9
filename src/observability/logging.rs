//! # Structured Logging
//!
//! Subscriber setup and span macros for the tracing ecosystem.
//!
//! `RUST_LOG` takes precedence over the configured log level. In JSON mode
//! every event is emitted as one object per line with the current span list
//! attached, which keeps `template_id` / `principal_id` fields searchable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{KeelsonError, Result};

/// Install the global tracing subscriber.
///
/// Returns an error when a subscriber is already installed, which callers
/// running inside test harnesses may ignore.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            KeelsonError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true).with_span_list(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| KeelsonError::internal(format!("Failed to install subscriber: {}", e)))
}

/// Create a tracing span for request tracking.
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            principal_id = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            principal_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for a store operation.
#[macro_export]
macro_rules! store_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        store_backend = %config.database.backend,
        metrics_enabled = %config.observability.enable_metrics,
        reconcile_delay_ms = config.convergence.reconcile_delay_ms,
        bootstrap_admin = config.bootstrap.admin_token.is_some(),
        "Keelson template service configuration"
    );
}
