//! Request correlation.
//!
//! Every request runs inside a span carrying its request id, taken from the
//! `X-Request-ID` header or generated, and echoed back on the response.

use axum::{
    body::Body,
    http::{header::HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Request ID stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn request_id_of(req: &Request<Body>) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn trace_id(mut req: Request<Body>, next: Next) -> Response {
    let request_id = request_id_of(&req);
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let start = std::time::Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    });

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), header_value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_request_id_is_kept() {
        let req = Request::builder()
            .header(REQUEST_ID_HEADER, "req-123_abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_id_of(&req), "req-123_abc");
    }

    #[test]
    fn test_missing_request_id_is_generated() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = request_id_of(&req);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_empty_request_id_is_replaced() {
        let req = Request::builder()
            .header(REQUEST_ID_HEADER, "")
            .body(Body::empty())
            .unwrap();
        assert!(!request_id_of(&req).is_empty());
    }
}
