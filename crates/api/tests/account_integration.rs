//! Integration tests for account endpoints.
//!
//! Tests cover:
//! - POST /api/account/login
//! - POST /api/account/loginExternalCredential
//! - POST /api/account/register
//! - POST /api/account/refresh
//! - POST /api/account/changePassword
//! - PUT /api/account/users/:id/password
//! - POST /api/account/requestPasswordReset
//! - POST /api/account/resetPassword

mod common;

use axum::http::{Method, StatusCode};
use common::{
    create_test_app, create_test_app_with_mailer, get_request, json_request, login,
    parse_response_body,
};
use domain::memory::SEED_PASSWORD;
use fake::{faker::internet::en::SafeEmail, Fake};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_login_returns_token_and_roles() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/login",
            json!({ "userName": "Manager", "password": SEED_PASSWORD }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert!(body["accessToken"].as_str().is_some());
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 3600);
    assert_eq!(body["user"]["userName"], "manager");
    assert_eq!(body["user"]["roles"], json!(["ProjectManager"]));
}

#[tokio::test]
async fn test_login_with_email() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/login",
            json!({ "userName": "viewer@example.com", "password": SEED_PASSWORD }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/login",
            json!({ "userName": "admin", "password": "wrong" }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "identity_error");
    assert_eq!(body["message"], "Invalid username or password");
}

#[tokio::test]
async fn test_register_then_login() {
    let (app, _ctx) = create_test_app();
    let email: String = SafeEmail().fake();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/register",
            json!({
                "email": email,
                "password": "N3w-Passw0rd",
                "firstName": "Test",
                "lastName": "User"
            }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = parse_response_body(response).await;
    assert_eq!(body["user"]["userName"], email.as_str());
    assert_eq!(body["user"]["roles"], json!([]));

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/login",
            json!({ "userName": email, "password": "N3w-Passw0rd" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_reports_every_problem() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/register",
            json!({ "userName": "admin", "email": "admin@example.com", "password": "short" }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "identity_error");
    let hints: Vec<&str> = body["hints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|h| h.as_str())
        .collect();
    assert!(hints.contains(&"Username 'admin' is already taken."));
    assert!(hints.contains(&"Email 'admin@example.com' is already taken."));
    assert!(hints.len() > 2);
}

#[tokio::test]
async fn test_external_login_creates_account_once() {
    let (app, _ctx) = create_test_app();
    let request = || {
        json_request(
            Method::POST,
            "/api/account/loginExternalCredential",
            json!({ "provider": "Google", "externalId": "g-123", "email": "ext@example.com" }),
            None,
        )
    };

    let first = parse_response_body(app.clone().oneshot(request()).await.unwrap()).await;
    let second = parse_response_body(app.clone().oneshot(request()).await.unwrap()).await;

    assert_eq!(first["user"]["userName"], "ext@example.com");
    assert_eq!(first["user"]["id"], second["user"]["id"]);
}

#[tokio::test]
async fn test_external_login_with_taken_email_gives_hints() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/loginExternalCredential",
            json!({ "provider": "Google", "externalId": "g-999", "email": "viewer@example.com" }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["message"], "That email address is already in use.");
    assert_eq!(
        body["hints"],
        json!(["Try logging in with a username and password."])
    );
}

#[tokio::test]
async fn test_refresh_requires_token() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/account/refresh", json!({}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = login(&app, "editor").await;
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/refresh",
            json!({}),
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["user"]["roles"], json!(["ContentManager"]));
}

#[tokio::test]
async fn test_change_password() {
    let (app, _ctx) = create_test_app();
    let token = login(&app, "guest").await;

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/changePassword",
            json!({ "currentPassword": "wrong", "newPassword": "An0ther-Pass" }),
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["hints"], json!(["Incorrect password."]));

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/changePassword",
            json!({ "currentPassword": SEED_PASSWORD, "newPassword": "An0ther-Pass" }),
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/login",
            json!({ "userName": "guest", "password": "An0ther-Pass" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_anonymous_is_unauthorized() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/changePassword",
            json!({ "currentPassword": SEED_PASSWORD, "newPassword": "An0ther-Pass" }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_sets_user_password() {
    let (app, _ctx) = create_test_app();
    let admin = login(&app, "admin").await;
    let manager = login(&app, "manager").await;

    let guest = parse_response_body(
        app.clone()
            .oneshot(get_request(
                "/api/applicationUsers?filter=userName%20%3D%3D%20%22guest%22",
                Some(&admin),
            ))
            .await
            .unwrap(),
    )
    .await;
    let guest_id = guest[0]["id"].as_i64().unwrap();
    let uri = format!("/api/account/users/{}/password", guest_id);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &uri,
            json!({ "newPassword": "Res3t-Pass" }),
            Some(&manager),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &uri,
            json!({ "newPassword": "Res3t-Pass" }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (app, _ctx, mailer) = create_test_app_with_mailer();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/requestPasswordReset",
            json!({ "email": "viewer@example.com" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Reset your password");
    let token = sent[0]
        .body
        .rsplit("token=")
        .next()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/resetPassword",
            json!({
                "email": "viewer@example.com",
                "token": token,
                "newPassword": "Fr3sh-start"
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert!(body["accessToken"].as_str().is_some());
    assert_eq!(body["user"]["userName"], "viewer");

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/login",
            json!({ "userName": "viewer", "password": "Fr3sh-start" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/resetPassword",
            json!({
                "email": "viewer@example.com",
                "token": token,
                "newPassword": "An0ther-one"
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "identity_error");
    assert_eq!(body["hints"], json!(["Invalid token."]));
}

#[tokio::test]
async fn test_password_reset_for_unknown_email_sends_nothing() {
    let (app, _ctx, mailer) = create_test_app_with_mailer();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/requestPasswordReset",
            json!({ "email": "nobody@example.com" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_reset_password_with_unknown_token() {
    let (app, _ctx) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/account/resetPassword",
            json!({
                "email": "viewer@example.com",
                "token": "deadbeef",
                "newPassword": "Fr3sh-start"
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["message"], "Unable to reset password");
    assert_eq!(body["hints"], json!(["Invalid token."]));
}
