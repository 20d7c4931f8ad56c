//! Integration tests for the connection hub and live delivery.

use std::time::Duration;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use bazaar_core::types::UserId;
use bazaar_entity::user::UserRole;
use bazaar_realtime::{DomainEvent, OutboundMessage};

use crate::helpers::TestApp;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_second_connection_replaces_first() {
    let app = TestApp::new().await;
    let session = app.register("ada@example.com").await;
    let user = session.user_id;

    let mut first = app.state.hub.register(user).await.unwrap();
    let mut second = app.state.hub.register(user).await.unwrap();

    assert_ne!(first.conn_id, second.conn_id);
    tokio::time::timeout(WAIT, first.closed.cancelled())
        .await
        .expect("first connection was not closed");
    assert!(!second.closed.is_cancelled());

    assert!(
        app.state
            .hub
            .send_confirmed(user, OutboundMessage::UnreadCount { count: 7 })
            .await
    );
    let notification = app
        .state
        .dispatcher
        .dispatch(
            &CancellationToken::new(),
            user,
            &DomainEvent::NewFollower {
                actor_id: UserId::new(),
                actor_name: "Bo".into(),
            },
        )
        .await
        .unwrap();

    let stale = tokio::time::timeout(WAIT, first.outbound.recv()).await.unwrap();
    assert!(stale.is_none());
    assert_eq!(
        tokio::time::timeout(WAIT, second.outbound.recv()).await.unwrap(),
        Some(OutboundMessage::UnreadCount { count: 7 })
    );
    match tokio::time::timeout(WAIT, second.outbound.recv()).await.unwrap() {
        Some(OutboundMessage::Notification(frame)) => assert_eq!(frame.id, notification.id),
        other => panic!("unexpected frame: {other:?}"),
    }

    let stats = app.state.hub.stats().await;
    assert_eq!(stats.online_users, 1);
    assert_eq!(stats.replaced_total, 1);

    // A late unregister from the replaced socket leaves the new one alone.
    app.state.hub.unregister(user, first.conn_id);
    assert!(app.state.hub.is_online(user).await);
}

#[tokio::test]
async fn test_dispatch_reaches_live_connection() {
    let app = TestApp::new().await;
    let session = app.register("cal@example.com").await;
    let mut registration = app.state.hub.register(session.user_id).await.unwrap();

    let notification = app
        .state
        .dispatcher
        .dispatch(
            &CancellationToken::new(),
            session.user_id,
            &DomainEvent::NewFollower {
                actor_id: UserId::new(),
                actor_name: "Dee".into(),
            },
        )
        .await
        .unwrap();

    let frame = tokio::time::timeout(WAIT, registration.outbound.recv())
        .await
        .unwrap()
        .unwrap();
    match frame {
        OutboundMessage::Notification(frame) => {
            assert_eq!(frame.id, notification.id);
            assert_eq!(frame.kind, "new_follower");
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test]
async fn test_mark_read_pushes_unread_count() {
    let app = TestApp::new().await;
    let session = app.register("dov@example.com").await;
    let notification = app
        .state
        .dispatcher
        .dispatch(
            &CancellationToken::new(),
            session.user_id,
            &DomainEvent::NewFollower {
                actor_id: UserId::new(),
                actor_name: "Eli".into(),
            },
        )
        .await
        .unwrap();
    let mut registration = app.state.hub.register(session.user_id).await.unwrap();

    app.request(
        "POST",
        &format!("/api/notifications/{}/read", notification.id),
        None,
        Some(&session.access_token),
    )
    .await;

    let frame = tokio::time::timeout(WAIT, registration.outbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, OutboundMessage::UnreadCount { count: 0 });
}

#[tokio::test]
async fn test_logout_all_closes_socket_with_farewell() {
    let app = TestApp::new().await;
    let session = app.register("eve@example.com").await;
    let mut registration = app.state.hub.register(session.user_id).await.unwrap();

    let response = app
        .request(
            "POST",
            "/api/auth/logout-all",
            None,
            Some(&session.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    tokio::time::timeout(WAIT, registration.closed.cancelled())
        .await
        .expect("socket was not closed");
    let farewell = registration.outbound.recv().await.unwrap();
    match farewell {
        OutboundMessage::SessionRevoked { reason, .. } => assert_eq!(reason, "logout_all"),
        other => panic!("unexpected frame: {other:?}"),
    }
    assert!(!app.state.hub.is_online(session.user_id).await);
}

#[tokio::test]
async fn test_ws_requires_credentials() {
    let app = TestApp::new().await;

    let anonymous = app.request("GET", "/ws", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let bad_token = app.request("GET", "/ws?token=garbage", None, None).await;
    assert_eq!(bad_token.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ws_without_upgrade_headers_is_rejected_after_auth() {
    let app = TestApp::new().await;
    let session = app.register("fin@example.com").await;

    let response = app
        .request(
            "GET",
            &format!("/ws?token={}", session.access_token),
            None,
            None,
        )
        .await;
    assert!(response.status.is_client_error());
    assert_ne!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_realtime_stats() {
    let app = TestApp::new().await;
    app.create_user("ops@example.com", UserRole::Admin).await;
    let admin = app.login("ops@example.com").await;
    let member = app.register("gil@example.com").await;
    let _registration = app.state.hub.register(member.user_id).await.unwrap();

    let denied = app
        .request("GET", "/api/admin/realtime", None, Some(&member.access_token))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.error_code(), "FORBIDDEN");

    let stats = app
        .request("GET", "/api/admin/realtime", None, Some(&admin.access_token))
        .await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["data"]["online_users"], 1);
}

#[tokio::test]
async fn test_admin_revoke_requires_elevation() {
    let app = TestApp::new().await;
    app.create_user("sec@example.com", UserRole::Admin).await;
    let admin = app.login("sec@example.com").await;
    let member = app.register("hop@example.com").await;

    let response = app
        .request(
            "POST",
            &format!("/api/admin/users/{}/revoke-sessions", member.user_id),
            None,
            Some(&admin.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error_code(), "MFA_REQUIRED");

    let member_still_in = app
        .request("GET", "/api/auth/sessions", None, Some(&member.access_token))
        .await;
    assert_eq!(member_still_in.status, StatusCode::OK);
}
