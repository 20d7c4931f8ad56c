//! Integration tests for notification delivery and read state.

use axum::http::StatusCode;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use bazaar_core::types::UserId;
use bazaar_entity::user::UserRole;
use bazaar_realtime::DomainEvent;

use crate::helpers::TestApp;

fn follower(actor_id: UserId) -> DomainEvent {
    DomainEvent::NewFollower {
        actor_id,
        actor_name: "Uma".into(),
    }
}

#[tokio::test]
async fn test_offline_dispatch_is_persisted() {
    let app = TestApp::new().await;
    let session = app.register("val@example.com").await;
    let actor = UserId::new();

    let cancel = CancellationToken::new();
    for _ in 0..3 {
        app.state
            .dispatcher
            .dispatch(&cancel, session.user_id, &follower(actor))
            .await
            .unwrap();
    }

    let count = app
        .request(
            "GET",
            "/api/notifications/unread-count",
            None,
            Some(&session.access_token),
        )
        .await;
    assert_eq!(count.status, StatusCode::OK);
    assert_eq!(count.body["data"]["count"], 3);

    let list = app
        .request(
            "GET",
            "/api/notifications?page=1&per_page=2",
            None,
            Some(&session.access_token),
        )
        .await;
    assert_eq!(list.status, StatusCode::OK);
    let data = &list.body["data"];
    assert_eq!(data["total"], 3);
    assert_eq!(data["total_pages"], 2);
    assert_eq!(data["items"].as_array().unwrap().len(), 2);
    assert_eq!(data["items"][0]["kind"], "new_follower");
    assert_eq!(data["items"][0]["actor_id"], actor.to_string());
}

#[tokio::test]
async fn test_mark_read_and_read_all() {
    let app = TestApp::new().await;
    let session = app.register("wes@example.com").await;
    let cancel = CancellationToken::new();
    let first = app
        .state
        .dispatcher
        .dispatch(&cancel, session.user_id, &follower(UserId::new()))
        .await
        .unwrap();
    for _ in 0..2 {
        app.state
            .dispatcher
            .dispatch(&cancel, session.user_id, &follower(UserId::new()))
            .await
            .unwrap();
    }

    let read = app
        .request(
            "POST",
            &format!("/api/notifications/{}/read", first.id),
            None,
            Some(&session.access_token),
        )
        .await;
    assert_eq!(read.status, StatusCode::OK);
    assert_eq!(read.body["data"]["count"], 2);

    let unread = app
        .request(
            "GET",
            "/api/notifications?unread_only=true",
            None,
            Some(&session.access_token),
        )
        .await;
    assert_eq!(unread.body["data"]["total"], 2);

    let all = app
        .request(
            "POST",
            "/api/notifications/read-all",
            None,
            Some(&session.access_token),
        )
        .await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["data"]["count"], 2);

    let count = app
        .request(
            "GET",
            "/api/notifications/unread-count",
            None,
            Some(&session.access_token),
        )
        .await;
    assert_eq!(count.body["data"]["count"], 0);
}

#[tokio::test]
async fn test_cannot_read_another_users_notification() {
    let app = TestApp::new().await;
    let owner = app.register("xia@example.com").await;
    let other = app.register("yan@example.com").await;
    let notification = app
        .state
        .dispatcher
        .dispatch(
            &CancellationToken::new(),
            owner.user_id,
            &follower(other.user_id),
        )
        .await
        .unwrap();

    let response = app
        .request(
            "POST",
            &format!("/api/notifications/{}/read", notification.id),
            None,
            Some(&other.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.error_code(), "NOT_FOUND");

    let malformed = app
        .request(
            "POST",
            "/api/notifications/not-an-id/read",
            None,
            Some(&other.access_token),
        )
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_event_endpoint() {
    let app = TestApp::new().await;
    app.create_user("root@example.com", UserRole::Admin).await;
    let admin = app.login("root@example.com").await;
    let member = app.register("zoe@example.com").await;
    let second = app.register("abe@example.com").await;

    let body = json!({
        "recipients": [member.user_id, second.user_id],
        "event": {
            "type": "post_liked",
            "actor_id": admin.user_id,
            "actor_name": "Root",
            "post_id": uuid::Uuid::new_v4(),
        },
    });

    let denied = app
        .request(
            "POST",
            "/api/admin/events",
            Some(body.clone()),
            Some(&member.access_token),
        )
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.error_code(), "FORBIDDEN");

    let accepted = app
        .request(
            "POST",
            "/api/admin/events",
            Some(body),
            Some(&admin.access_token),
        )
        .await;
    assert_eq!(accepted.status, StatusCode::ACCEPTED, "{:?}", accepted.body);
    assert_eq!(accepted.body["data"]["count"], 2);

    for session in [&member, &second] {
        let count = app
            .request(
                "GET",
                "/api/notifications/unread-count",
                None,
                Some(&session.access_token),
            )
            .await;
        assert_eq!(count.body["data"]["count"], 1);
    }

    let empty = app
        .request(
            "POST",
            "/api/admin/events",
            Some(json!({
                "recipients": [],
                "event": { "type": "new_follower", "actor_id": admin.user_id, "actor_name": "Root" },
            })),
            Some(&admin.access_token),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}
