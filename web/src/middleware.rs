//! Per-request correlation for the circulation API.
//!
//! Every request gets one [`CorrelationId`]: the caller's `X-Correlation-ID`
//! when it parses as a UUID, a fresh v4 otherwise. The id is stored in the
//! request extensions (the [`CorrelationId`] extractor reads it back), opens
//! a `libris_request` span that handlers and services log under, and is
//! echoed on the response so desk clients can quote it when reporting a
//! failed checkout.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/borrowings", post(issue_book))
//!     .layer(correlation_id_layer());
//! ```

use crate::extractors::CorrelationId;
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    response::Response,
};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Layer that assigns a correlation id and request span to every call.
#[must_use]
pub fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Correlation id from the request header, if it is a valid UUID.
pub(crate) fn correlation_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// See [`correlation_id_layer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Service produced by [`CorrelationIdLayer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = correlation_from_headers(req.headers()).unwrap_or_else(Uuid::new_v4);
        req.extensions_mut().insert(CorrelationId(correlation_id));

        // Path only; query strings may carry search terms.
        let span = tracing::info_span!(
            "libris_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            path = %req.uri().path(),
            status = tracing::field::Empty,
        );
        let started = Instant::now();
        let fut = self.inner.call(req).instrument(span.clone());

        Box::pin(async move {
            let mut response = fut.await?;
            let status = response.status();
            span.record("status", status.as_u16());
            span.in_scope(|| {
                let elapsed_ms = started.elapsed().as_millis();
                if status.is_server_error() {
                    tracing::warn!(elapsed_ms, "Request failed");
                } else {
                    tracing::debug!(elapsed_ms, "Request completed");
                }
            });

            if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    fn desk() -> Router {
        async fn echo(correlation_id: CorrelationId) -> String {
            correlation_id.0.to_string()
        }

        Router::new()
            .route("/api/borrowings", get(echo))
            .layer(correlation_id_layer())
    }

    async fn call(request: Request<Body>) -> (String, String) {
        let response = desk().oneshot(request).await.unwrap();
        let header = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("correlation header")
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (header, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn generated_id_reaches_handler_and_response() {
        let request = Request::builder()
            .uri("/api/borrowings")
            .body(Body::empty())
            .unwrap();

        let (header, seen_by_handler) = call(request).await;

        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(header, seen_by_handler);
    }

    #[tokio::test]
    async fn caller_id_is_kept() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .uri("/api/borrowings?status=overdue")
            .header(CORRELATION_ID_HEADER, id.to_string())
            .body(Body::empty())
            .unwrap();

        let (header, seen_by_handler) = call(request).await;

        assert_eq!(header, id.to_string());
        assert_eq!(seen_by_handler, id.to_string());
    }

    #[tokio::test]
    async fn malformed_id_is_replaced() {
        let request = Request::builder()
            .uri("/api/borrowings")
            .header(CORRELATION_ID_HEADER, "desk-7")
            .body(Body::empty())
            .unwrap();

        let (header, seen_by_handler) = call(request).await;

        assert_ne!(header, "desk-7");
        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(header, seen_by_handler);
    }
}
