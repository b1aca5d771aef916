//! Common test utilities for integration tests.
//!
//! The router is driven with `tower::ServiceExt::oneshot` over the seeded
//! in-memory data context, so no database is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

use domain::memory::{MemoryDataContext, RecordingMailer, SEED_PASSWORD};
use entity_manager_api::{app::create_app, config::Config};

/// Test configuration with the embedded defaults.
pub fn test_config() -> Config {
    Config::load_for_test(&[("database.url", "postgres://unused@localhost/test")])
        .expect("Failed to load test config")
}

/// A fresh seeded data context together with a router over it.
pub fn create_test_app() -> (Router, MemoryDataContext) {
    let (app, ctx, _) = create_test_app_with_mailer();
    (app, ctx)
}

/// Like [`create_test_app`], also returning the mailer that keeps every
/// outgoing message.
pub fn create_test_app_with_mailer() -> (Router, MemoryDataContext, Arc<RecordingMailer>) {
    let ctx = MemoryDataContext::seeded();
    let mailer = Arc::new(RecordingMailer::new());
    let app = create_app(&test_config(), Arc::new(ctx.clone()), mailer.clone())
        .expect("Failed to build app");
    (app, ctx, mailer)
}

/// Signs a seeded user in and returns the access token.
pub async fn login(app: &Router, user_name: &str) -> String {
    let request = json_request(
        Method::POST,
        "/api/account/login",
        serde_json::json!({ "userName": user_name, "password": SEED_PASSWORD }),
        None,
    );
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let json = parse_response_body(response).await;

    if !status.is_success() {
        panic!("Login failed with status: {}, body: {}", status, json);
    }

    json["accessToken"]
        .as_str()
        .unwrap_or_else(|| panic!("Missing accessToken in response. Full response: {}", json))
        .to_string()
}

/// Build a JSON request, optionally authenticated.
pub fn json_request(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request, optionally authenticated.
pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Build a DELETE request with authentication.
pub fn delete_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if body.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&body).unwrap_or_else(|_| {
        panic!(
            "Failed to parse response body: {:?}",
            String::from_utf8_lossy(&body)
        )
    })
}

/// Reads a numeric response header.
pub fn header_i64(response: &Response, name: &str) -> Option<i64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
