use axum::http::StatusCode;
use carrental_services::{
    database::{MockSqlStorage, SqlStorage},
    notifications::{Notification, NotificationKind},
    users::storage::{MockUserStorage, Role},
};
use serde_json::Value;
use uuid::Uuid;

mod common;

use common::{TestApp, account, token_for};

#[tokio::test]
async fn list_and_mark_read() {
    let user = account("Ron", "ron@example.com", Role::User).await;
    let other = account("Olive", "olive@example.com", Role::Owner).await;
    let token = token_for(&user);
    let app = TestApp::with_storage(
        MockSqlStorage::new(),
        MockUserStorage::new()
            .with_user(user.clone())
            .with_user(other.clone()),
    )
    .await;

    let first = app
        .sql
        .notifications_insert(Notification::new(
            user.id,
            NotificationKind::BookingStatusChanged,
            "Your booking is now booked",
            None,
        ))
        .await
        .unwrap();
    app.sql
        .notifications_insert(Notification::new(
            user.id,
            NotificationKind::BookingStatusChanged,
            "Your booking is now on_rent",
            None,
        ))
        .await
        .unwrap();
    let foreign = app
        .sql
        .notifications_insert(Notification::new(
            other.id,
            NotificationKind::BookingCreated,
            "New booking request",
            None,
        ))
        .await
        .unwrap();

    let list = app
        .server
        .get("/api/notifications")
        .authorization_bearer(&token)
        .await;
    list.assert_status_ok();
    let body: Value = list.json();
    assert_eq!(body["notifications"].as_array().unwrap().len(), 2);
    assert_eq!(body["unreadCount"], 2);

    app.server
        .post(&format!("/api/notifications/{}/read", first.id))
        .authorization_bearer(&token)
        .await
        .assert_status_ok();

    // another account's notification looks missing
    app.server
        .post(&format!("/api/notifications/{}/read", foreign.id))
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .post(&format!("/api/notifications/{}/read", Uuid::new_v4()))
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let body: Value = app
        .server
        .get("/api/notifications")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(body["unreadCount"], 1);

    let all = app
        .server
        .post("/api/notifications/read-all")
        .authorization_bearer(&token)
        .await;
    all.assert_status_ok();
    assert_eq!(all.json::<Value>()["updated"], 1);

    let body: Value = app
        .server
        .get("/api/notifications")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(body["unreadCount"], 0);

    let others = app.sql.notifications_list_for_user(other.id).await.unwrap();
    assert!(!others[0].read);
}

#[tokio::test]
async fn notifications_require_auth() {
    let app = TestApp::new().await;
    app.server
        .get("/api/notifications")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
