use axum::http::StatusCode;
use carrental_services::{database::MockSqlStorage, users::storage::MockUserStorage};

mod common;

use common::TestApp;

#[tokio::test]
async fn test_health_check_integration() {
    // Case 1: Connected
    let app = TestApp::new().await;
    let response = app.server.get("/is-health").await;
    response.assert_status(StatusCode::OK);
    response.assert_text("OK");

    // Case 2: Disconnected
    let sql = MockSqlStorage::new();
    sql.set_connected(false);
    let app = TestApp::with_storage(sql, MockUserStorage::new()).await;

    let response = app.server.get("/is-health").await;
    response.assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_health_check_reports_environment() {
    let app = TestApp::new().await;
    let response = app.server.get("/is-health").await;

    assert_eq!(response.header("x-service-env"), "local");
    let version = response.header("x-service-version");
    assert!(version.to_str().unwrap().starts_with("main:"));
}
