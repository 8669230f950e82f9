//! # Metrics Collection
//!
//! Prometheus metrics for template operations, authorization decisions and
//! cluster reconciles. Recording is a no-op until [`init_metrics`] installs
//! the exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{KeelsonError, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Metrics recorder that tracks application metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a template, revision or cluster operation outcome
    pub fn record_template_operation(&self, operation: &str, outcome: &str) {
        let labels = [("operation", operation.to_string()), ("outcome", outcome.to_string())];
        counter!("template_operations_total", &labels).increment(1);
    }

    /// Record an authorization gate decision
    pub fn record_authorization_decision(&self, action: &str, decision: &str) {
        let labels = [("action", action.to_string()), ("decision", decision.to_string())];
        counter!("authorization_decisions_total", &labels).increment(1);
    }

    /// Record a background reconcile outcome (applied, stale, gone, error)
    pub fn record_cluster_reconcile(&self, outcome: &str) {
        let labels = [("outcome", outcome.to_string())];
        counter!("cluster_reconciles_total", &labels).increment(1);
    }

    /// Record authentication attempt outcome
    pub fn record_authentication(&self, status: &str) {
        let labels = [("status", status.to_string())];
        counter!("auth_authentications_total", &labels).increment(1);
    }

    fn register(&self) {
        describe_counter!(
            "template_operations_total",
            Unit::Count,
            "Template store operations by operation and outcome"
        );
        describe_counter!(
            "authorization_decisions_total",
            Unit::Count,
            "Authorization gate decisions by action and decision"
        );
        describe_counter!(
            "cluster_reconciles_total",
            Unit::Count,
            "Background cluster reconciles by outcome"
        );
        describe_counter!(
            "auth_authentications_total",
            Unit::Count,
            "Bearer token authentication attempts by status"
        );
    }
}

/// Global metrics recorder instance
static METRICS: OnceLock<MetricsRecorder> = OnceLock::new();

/// Initialize metrics collection and the Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let Some(metrics_addr) = config.metrics_bind_address() else {
        warn!("Metrics disabled: no bind address configured");
        return Ok(());
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        KeelsonError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            KeelsonError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    let recorder = METRICS.get_or_init(MetricsRecorder::new);
    recorder.register();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}

/// Get the global metrics recorder
pub fn get_metrics() -> Option<&'static MetricsRecorder> {
    METRICS.get()
}

pub fn record_template_operation(operation: &str, outcome: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_template_operation(operation, outcome);
    }
}

pub fn record_authorization_decision(action: &str, decision: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_authorization_decision(action, decision);
    }
}

pub fn record_cluster_reconcile(outcome: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_cluster_reconcile(outcome);
    }
}

pub fn record_authentication(status: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_authentication(status);
    }
}

/// Outcome label for a store result.
pub fn outcome_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(err) => err.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording_without_exporter() {
        let recorder = MetricsRecorder::new();
        recorder.record_template_operation("create_template", "success");
        recorder.record_authorization_decision("update", "not_found");
        recorder.record_cluster_reconcile("applied");
        recorder.record_authentication("success");

        record_template_operation("create_revision", "PermissionDenied");
    }

    #[test]
    fn test_init_metrics_disabled() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_init_metrics_no_port() {
        let config =
            ObservabilityConfig { enable_metrics: true, metrics_port: 0, ..Default::default() };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_outcome_label() {
        let ok: Result<()> = Ok(());
        assert_eq!(outcome_label(&ok), "success");
        let err: Result<()> = Err(KeelsonError::not_found("ClusterTemplate", "ct-1"));
        assert_eq!(outcome_label(&err), "NotFound");
    }
}
