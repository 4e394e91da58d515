//! Registration, login, logout, and session probes.

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::json;
use tower::ServiceExt;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_register_and_login_flow() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/users",
            None,
            json!({ "email": "player@example.com", "password": "hunter2hunter2" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "player@example.com");
    assert_eq!(body["is_admin"], false);
    assert!(body.get("password_hash").is_none(), "hash must never be serialized");

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "player@example.com", "password": "hunter2hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("user-login=sf_"));
    assert!(cookie.contains("HttpOnly"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["email"], "player@example.com");

    // Bearer token
    let (status, body) = app.send(get_request("/session/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "player@example.com");
    assert_eq!(body["owned_count"], 0);

    // Cookie
    let cookie_pair = cookie.split(';').next().unwrap().to_string();
    let request = Request::builder()
        .uri("/session")
        .header(header::COOKIE, cookie_pair)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn test_login_with_wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    app.send(json_request(
        "POST",
        "/users",
        None,
        json!({ "email": "player@example.com", "password": "hunter2hunter2" }),
    ))
    .await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "player@example.com", "password": "not-the-password" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("token").is_none());

    let (status, _) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "nobody@example.com", "password": "hunter2hunter2" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(json_request(
            "POST",
            "/users",
            None,
            json!({ "email": "not-an-email", "password": "hunter2hunter2" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(json_request(
            "POST",
            "/users",
            None,
            json!({ "email": "player@example.com", "password": "short" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(json_request("POST", "/users", None, json!({ "email": "x@example.com" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "missing fields are a bad request");
}

#[tokio::test]
async fn test_duplicate_email_conflicts_case_insensitively() {
    let app = TestApp::new().await;
    create_test_account(&app.conn(), "player@example.com", false);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/users",
            None,
            json!({ "email": "Player@Example.com", "password": "hunter2hunter2" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"], "An account with this email already exists");
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("player@example.com", false);

    let (status, _) = app.send(get_request("/session/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(empty_request("POST", "/logout", Some(&token))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send(get_request("/session/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_probe_without_login() {
    let app = TestApp::new().await;

    let (status, body) = app.send(get_request("/session", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
    assert!(body.get("user").is_none());

    let (status, body) = app.send(get_request("/session", Some("sf_bogus"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn test_expired_sessions_are_rejected() {
    let app = TestApp::new().await;
    let token = {
        let conn = app.conn();
        let account = create_test_account(&conn, "player@example.com", false);
        queries::create_auth_session(&conn, &account.id, -1).unwrap()
    };

    let (status, _) = app.send(get_request("/session/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let purged = queries::purge_expired_auth_sessions(&app.conn()).unwrap();
    assert_eq!(purged, 1);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.send(get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
