//! Integration tests for content rendering and health endpoints.

mod common;

use axum::http::StatusCode;
use common::{create_test_app, get_request, parse_response_body};
use tower::ServiceExt;

#[tokio::test]
async fn test_content_by_slug_substitutes_tokens() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(get_request(
            "/api/contentBlocks/slug/welcome-email?firstName=Ada",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["slug"], "welcome-email");
    assert_eq!(body["title"], "Welcome, Ada!");
    assert_eq!(body["content"], "Hello Ada, your account is ready.");
}

#[tokio::test]
async fn test_content_without_tokens_keeps_placeholders() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(get_request("/api/contentBlocks/slug/welcome-email", None))
        .await
        .unwrap();

    let body = parse_response_body(response).await;
    assert_eq!(body["title"], "Welcome, %firstName%!");
}

#[tokio::test]
async fn test_unknown_slug_is_not_found() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(get_request("/api/contentBlocks/slug/missing", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_blocks_are_public() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(get_request("/api/contentBlocks/2", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["slug"], "about");
}

#[tokio::test]
async fn test_health_check() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(get_request("/api/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["connected"], true);
}

#[tokio::test]
async fn test_response_carries_request_id() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(get_request("/api/health", None))
        .await
        .unwrap();

    assert!(response.headers().get("x-request-id").is_some());
}
