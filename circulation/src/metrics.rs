//! Prometheus metrics for the circulation service.
//!
//! Counters are recorded through the `metrics` facade wherever the event
//! happens; this module only describes them and installs the exporter.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

/// Loans opened.
pub const BORROWINGS_ISSUED: &str = "libris_borrowings_issued_total";
/// Loans closed.
pub const BORROWINGS_RETURNED: &str = "libris_borrowings_returned_total";
/// Fines charged at return time, in cents.
pub const FINES_ASSESSED_CENTS: &str = "libris_fines_assessed_cents_total";
/// Operations refused, labelled by error kind.
pub const LEDGER_REJECTIONS: &str = "libris_ledger_rejections_total";
/// Activity log appends that failed.
pub const ACTIVITY_LOG_FAILURES: &str = "libris_activity_log_failures_total";
/// Effects still running.
pub const PENDING_EFFECTS: &str = "libris_pending_effects";

/// Errors from installing the exporter.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Exporter could not be built or installed
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed or
/// the listener cannot be set up.
pub fn install(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    describe();
    tracing::info!(%addr, "Metrics available at http://{addr}/metrics");
    Ok(())
}

/// Register descriptions for every metric this crate records.
pub fn describe() {
    describe_counter!(BORROWINGS_ISSUED, "Total number of books issued");
    describe_counter!(BORROWINGS_RETURNED, "Total number of books returned");
    describe_counter!(
        FINES_ASSESSED_CENTS,
        "Total fines charged on return, in cents"
    );
    describe_counter!(
        LEDGER_REJECTIONS,
        "Operations refused by validation, authorization or business rules"
    );
    describe_counter!(
        ACTIVITY_LOG_FAILURES,
        "Activity log appends that failed and were dropped"
    );
    describe_gauge!(PENDING_EFFECTS, "Effects scheduled but not yet finished");
}
