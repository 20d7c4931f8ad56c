//! Integration tests for step-up MFA.

use axum::http::StatusCode;
use futures::future::join_all;
use serde_json::{Value, json};
use totp_rs::TOTP;

use crate::helpers::{TestApp, TestSession};

/// Enrolls and activates TOTP on `session`, returning the activation payload.
async fn activate_totp(app: &TestApp, session: &TestSession) -> Value {
    let enroll = app
        .request("POST", "/api/mfa/totp/enroll", None, Some(&session.access_token))
        .await;
    assert_eq!(enroll.status, StatusCode::CREATED, "{:?}", enroll.body);

    let url = enroll.body["data"]["otpauth_url"].as_str().unwrap();
    let code = TOTP::from_url(url).unwrap().generate_current().unwrap();

    let activate = app
        .request(
            "POST",
            "/api/mfa/totp/activate",
            Some(json!({
                "factor_id": enroll.body["data"]["factor_id"],
                "code": code,
            })),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(activate.status, StatusCode::OK, "{:?}", activate.body);
    activate.body["data"].clone()
}

fn backup_codes(activation: &Value) -> Vec<String> {
    activation["backup_codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_totp_activation_elevates_current_session() {
    let app = TestApp::new().await;
    let session = app.register("mia@example.com").await;

    let activation = activate_totp(&app, &session).await;
    assert_eq!(activation["factor"]["status"], "verified");
    assert_eq!(activation["grant"]["assurance"], 2);
    assert_eq!(backup_codes(&activation).len(), 10);

    let elevated = activation["grant"]["access_token"].as_str().unwrap();
    let factors = app
        .request("GET", "/api/mfa/factors", None, Some(elevated))
        .await;
    assert_eq!(factors.status, StatusCode::OK);
    assert_eq!(factors.body["data"].as_array().unwrap().len(), 1);
    assert!(factors.body["data"][0].get("secret").is_none());

    let remaining = app
        .request("GET", "/api/mfa/backup-codes", None, Some(elevated))
        .await;
    assert_eq!(remaining.body["data"]["count"], 10);
}

#[tokio::test]
async fn test_second_enrollment_conflicts() {
    let app = TestApp::new().await;
    let session = app.register("ned@example.com").await;
    let activation = activate_totp(&app, &session).await;
    let elevated = activation["grant"]["access_token"].as_str().unwrap();

    let again = app
        .request("POST", "/api/mfa/totp/enroll", None, Some(elevated))
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_activation_rejects_wrong_code() {
    let app = TestApp::new().await;
    let session = app.register("ola@example.com").await;
    let enroll = app
        .request("POST", "/api/mfa/totp/enroll", None, Some(&session.access_token))
        .await;

    let activate = app
        .request(
            "POST",
            "/api/mfa/totp/activate",
            Some(json!({
                "factor_id": enroll.body["data"]["factor_id"],
                "code": "abcdef",
            })),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(activate.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_step_up_with_backup_code() {
    let app = TestApp::new().await;
    let first = app.register("pia@example.com").await;
    let codes = backup_codes(&activate_totp(&app, &first).await);

    let session = app.login("pia@example.com").await;

    let before = app
        .request("POST", "/api/mfa/backup-codes", None, Some(&session.access_token))
        .await;
    assert_eq!(before.status, StatusCode::FORBIDDEN);
    assert_eq!(before.error_code(), "MFA_REQUIRED");

    let verify = app
        .request(
            "POST",
            "/api/mfa/verify",
            Some(json!({ "backup_code": codes[0] })),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(verify.status, StatusCode::OK, "{:?}", verify.body);
    assert_eq!(verify.body["data"]["assurance"], 2);
    assert_eq!(verify.body["data"]["session_id"], session.session_id.to_string());
    let elevated = verify.body["data"]["access_token"].as_str().unwrap();

    let after = app
        .request("POST", "/api/mfa/backup-codes", None, Some(elevated))
        .await;
    assert_eq!(after.status, StatusCode::OK);
    assert_eq!(after.body["data"]["codes"].as_array().unwrap().len(), 10);

    // The level-1 token was superseded by the elevated one.
    let stale = app
        .request("GET", "/api/auth/sessions", None, Some(&session.access_token))
        .await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    // Refresh keeps the elevated level.
    let refreshed = app
        .request(
            "POST",
            "/api/auth/refresh",
            Some(json!({ "refresh_token": session.refresh_token })),
            None,
        )
        .await;
    assert_eq!(refreshed.body["data"]["assurance"], 2);
}

#[tokio::test]
async fn test_verify_requires_exactly_one_proof() {
    let app = TestApp::new().await;
    let session = app.register("quin@example.com").await;
    activate_totp(&app, &session).await;
    let fresh = app.login("quin@example.com").await;

    let neither = app
        .request("POST", "/api/mfa/verify", Some(json!({})), Some(&fresh.access_token))
        .await;
    assert_eq!(neither.status, StatusCode::BAD_REQUEST);

    let both = app
        .request(
            "POST",
            "/api/mfa/verify",
            Some(json!({ "code": "123456", "backup_code": "abcd-efgh" })),
            Some(&fresh.access_token),
        )
        .await;
    assert_eq!(both.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_without_factor_is_not_found() {
    let app = TestApp::new().await;
    let session = app.register("ray@example.com").await;
    let verify = app
        .request(
            "POST",
            "/api/mfa/verify",
            Some(json!({ "code": "123456" })),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(verify.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_backup_code_redeems_once() {
    let app = TestApp::new().await;
    let first = app.register("sal@example.com").await;
    let activation = activate_totp(&app, &first).await;
    let elevated = activation["grant"]["access_token"].as_str().unwrap();
    let code = backup_codes(&activation).remove(0);

    let mut sessions = Vec::new();
    for _ in 0..6 {
        sessions.push(app.login("sal@example.com").await);
    }

    let attempts = sessions.iter().map(|session| {
        app.request(
            "POST",
            "/api/mfa/verify",
            Some(json!({ "backup_code": code })),
            Some(&session.access_token),
        )
    });
    let responses = join_all(attempts).await;

    let succeeded = responses
        .iter()
        .filter(|r| r.status == StatusCode::OK)
        .count();
    assert_eq!(succeeded, 1);
    assert!(
        responses
            .iter()
            .filter(|r| r.status != StatusCode::OK)
            .all(|r| r.status == StatusCode::CONFLICT)
    );

    let remaining = app
        .request("GET", "/api/mfa/backup-codes", None, Some(elevated))
        .await;
    assert_eq!(remaining.body["data"]["count"], 9);
}

#[tokio::test]
async fn test_unknown_backup_code() {
    let app = TestApp::new().await;
    let session = app.register("tia@example.com").await;
    activate_totp(&app, &session).await;
    let fresh = app.login("tia@example.com").await;

    let verify = app
        .request(
            "POST",
            "/api/mfa/verify",
            Some(json!({ "backup_code": "zzzz-zzzz" })),
            Some(&fresh.access_token),
        )
        .await;
    assert_eq!(verify.status, StatusCode::UNAUTHORIZED);
}
