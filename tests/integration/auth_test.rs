//! Integration tests for the session lifecycle.

use axum::http::StatusCode;
use serde_json::json;

use crate::helpers::{PASSWORD, TestApp};

#[tokio::test]
async fn test_register_then_me() {
    let app = TestApp::new().await;
    let session = app.register("ana@example.com").await;

    let me = app
        .request("GET", "/api/auth/me", None, Some(&session.access_token))
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["authenticated"], true);
    assert_eq!(me.body["data"]["email"], "ana@example.com");
    assert_eq!(me.body["data"]["assurance"], 1);
    assert_eq!(me.body["data"]["role"], "member");
}

#[tokio::test]
async fn test_me_is_anonymous_without_credentials() {
    let app = TestApp::new().await;
    let me = app.request("GET", "/api/auth/me", None, None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["authenticated"], false);

    let garbage = app
        .request("GET", "/api/auth/me", None, Some("not-a-token"))
        .await;
    assert_eq!(garbage.status, StatusCode::OK);
    assert_eq!(garbage.body["data"]["authenticated"], false);
}

#[tokio::test]
async fn test_register_rejects_duplicate_and_invalid_input() {
    let app = TestApp::new().await;
    app.register("dup@example.com").await;

    let again = app
        .request(
            "POST",
            "/api/auth/register",
            Some(json!({
                "email": "DUP@example.com",
                "password": PASSWORD,
                "display_name": "Again",
            })),
            None,
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.error_code(), "CONFLICT");

    let bad_email = app
        .request(
            "POST",
            "/api/auth/register",
            Some(json!({
                "email": "nope",
                "password": PASSWORD,
                "display_name": "Nope",
            })),
            None,
        )
        .await;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_email.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let app = TestApp::new().await;
    app.register("bo@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/auth/login",
            Some(json!({ "email": "bo@example.com", "password": "wrong-password" })),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "UNAUTHORIZED");

    let unknown = app
        .request(
            "POST",
            "/api/auth/login",
            Some(json!({ "email": "ghost@example.com", "password": PASSWORD })),
            None,
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guarded_route_requires_token() {
    let app = TestApp::new().await;
    let response = app.request("GET", "/api/auth/sessions", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "UNAUTHORIZED");
}

#[tokio::test]
async fn test_refresh_supersedes_previous_access_token() {
    let app = TestApp::new().await;
    let session = app.register("cy@example.com").await;

    let refreshed = app
        .request(
            "POST",
            "/api/auth/refresh",
            Some(json!({ "refresh_token": session.refresh_token })),
            None,
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
    let new_token = refreshed.body["data"]["access_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(new_token, session.access_token);

    let old = app
        .request("GET", "/api/auth/sessions", None, Some(&session.access_token))
        .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);

    let new = app
        .request("GET", "/api/auth/sessions", None, Some(&new_token))
        .await;
    assert_eq!(new.status, StatusCode::OK);
}

#[tokio::test]
async fn test_revocation_beats_unexpired_token() {
    let app = TestApp::new().await;
    let session = app.register("di@example.com").await;

    let logout = app
        .request("POST", "/api/auth/logout", None, Some(&session.access_token))
        .await;
    assert_eq!(logout.status, StatusCode::OK);

    let after = app
        .request("GET", "/api/auth/sessions", None, Some(&session.access_token))
        .await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);

    let refresh = app
        .request(
            "POST",
            "/api/auth/refresh",
            Some(json!({ "refresh_token": session.refresh_token })),
            None,
        )
        .await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_reuse_revokes_every_session() {
    let app = TestApp::new().await;
    let first = app.register("ed@example.com").await;
    let second = app.login("ed@example.com").await;

    app.request("POST", "/api/auth/logout", None, Some(&first.access_token))
        .await;

    // Replaying the revoked session's refresh token looks like theft.
    let replay = app
        .request(
            "POST",
            "/api/auth/refresh",
            Some(json!({ "refresh_token": first.refresh_token })),
            None,
        )
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);

    let survivor = app
        .request("GET", "/api/auth/sessions", None, Some(&second.access_token))
        .await;
    assert_eq!(survivor.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_all_except_current() {
    let app = TestApp::new().await;
    let current = app.register("fay@example.com").await;
    let laptop = app.login("fay@example.com").await;
    let phone = app.login("fay@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/auth/logout-all",
            Some(json!({ "keep_current": true })),
            Some(&current.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["revoked"], 2);

    for other in [&laptop, &phone] {
        let denied = app
            .request("GET", "/api/auth/sessions", None, Some(&other.access_token))
            .await;
        assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    }

    let listed = app
        .request("GET", "/api/auth/sessions", None, Some(&current.access_token))
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    let sessions = listed.body["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], current.session_id.to_string());
    assert_eq!(sessions[0]["current"], true);
}

#[tokio::test]
async fn test_logout_all_without_body_revokes_everything() {
    let app = TestApp::new().await;
    let current = app.register("gus@example.com").await;
    app.login("gus@example.com").await;

    let response = app
        .request("POST", "/api/auth/logout-all", None, Some(&current.access_token))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["revoked"], 2);

    let after = app
        .request("GET", "/api/auth/sessions", None, Some(&current.access_token))
        .await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoking_a_session_requires_step_up() {
    let app = TestApp::new().await;
    let current = app.register("hal@example.com").await;
    let other = app.login("hal@example.com").await;

    let response = app
        .request(
            "DELETE",
            &format!("/api/auth/sessions/{}", other.session_id),
            None,
            Some(&current.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error_code(), "MFA_REQUIRED");

    let still_valid = app
        .request("GET", "/api/auth/sessions", None, Some(&other.access_token))
        .await;
    assert_eq!(still_valid.status, StatusCode::OK);
}

#[tokio::test]
async fn test_new_sessions_start_at_level_one() {
    let app = TestApp::new().await;
    app.register("ivy@example.com").await;
    let login = app
        .request(
            "POST",
            "/api/auth/login",
            Some(json!({ "email": "ivy@example.com", "password": PASSWORD, "device_name": "Pixel" })),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["data"]["assurance"], 1);

    let token = login.body["data"]["access_token"].as_str().unwrap();
    let listed = app
        .request("GET", "/api/auth/sessions", None, Some(token))
        .await;
    let sessions = listed.body["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s["assurance"] == 1));
    assert!(sessions.iter().any(|s| s["device_name"] == "Pixel"));
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let response = app.request("GET", "/api/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "ok");
}
