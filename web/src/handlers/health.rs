//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, http::StatusCode};
use libris_runtime::{HealthReport, HealthStatus};

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (database, etc.).
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Render a readiness report.
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
#[must_use]
pub fn readiness(report: HealthReport) -> (StatusCode, Json<HealthReport>) {
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_runtime::HealthCheck;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[test]
    fn degraded_is_still_ready() {
        let report = HealthReport::new(vec![HealthCheck::degraded("effects", "backlog")]);
        let (status, Json(body)) = readiness(report);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, HealthStatus::Degraded);
    }

    #[test]
    fn unhealthy_storage_is_not_ready() {
        let report = HealthReport::new(vec![
            HealthCheck::healthy("effects"),
            HealthCheck::unhealthy("postgres", "connection refused"),
        ]);
        let (status, _) = readiness(report);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
