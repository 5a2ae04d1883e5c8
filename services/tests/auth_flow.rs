//! Email verification, registration, login and password management.

use axum::http::StatusCode;
use carrental_services::{database::SqlStorage, users::storage::Role};
use serde_json::{Value, json};

mod common;

use common::{TEST_PASSWORD, TestApp, account, token_for};

const EMAIL: &str = "alice@example.com";

async fn verified_token(app: &TestApp, email: &str) -> String {
    app.server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": email }))
        .await
        .assert_status_ok();

    let code = app.last_code_for(email);
    let response = app
        .server
        .post("/api/otp/verify-otp")
        .json(&json!({ "email": email, "otp": code }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    body["verificationToken"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::new().await;
    let verification_token = verified_token(&app, EMAIL).await;

    let response = app
        .server
        .post("/api/user/register")
        .json(&json!({
            "name": "Alice",
            "email": "  Alice@Example.com ",
            "password": "s3cret-pass",
            "verificationToken": verification_token,
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Account created successfully!");
    let token = body["token"].as_str().unwrap().to_owned();

    let me = app
        .server
        .get("/api/user/data")
        .authorization_bearer(&token)
        .await;
    me.assert_status_ok();
    let me: Value = me.json();
    assert_eq!(me["user"]["email"], EMAIL);
    assert_eq!(me["user"]["role"], "user");
    assert!(me["user"].get("passwordHash").is_none());

    let login = app
        .server
        .post("/api/user/login")
        .json(&json!({ "email": EMAIL, "password": "s3cret-pass" }))
        .await;
    login.assert_status_ok();
    assert!(login.json::<Value>()["token"].is_string());
}

#[tokio::test]
async fn verification_token_is_single_use() {
    let app = TestApp::new().await;
    let verification_token = verified_token(&app, EMAIL).await;
    let body = json!({
        "name": "Alice",
        "email": EMAIL,
        "password": "s3cret-pass",
        "verificationToken": verification_token,
    });

    app.server
        .post("/api/user/register")
        .json(&body)
        .await
        .assert_status_ok();

    let again = app.server.post("/api/user/register").json(&body).await;
    again.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        again.json::<Value>()["message"],
        "Email verification required. Please verify your email first."
    );
}

#[tokio::test]
async fn register_requires_verified_email() {
    let app = TestApp::new().await;

    app.server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": EMAIL }))
        .await
        .assert_status_ok();
    let unverified = app.sql.otp_latest_for_email(EMAIL).await.unwrap().unwrap();

    let response = app
        .server
        .post("/api/user/register")
        .json(&json!({
            "name": "Alice",
            "email": EMAIL,
            "password": "s3cret-pass",
            "verificationToken": unverified.id,
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(app.users.len(), 0);
}

#[tokio::test]
async fn register_rejects_missing_fields() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/user/register")
        .json(&json!({ "email": EMAIL }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "Fill all the fields and verify your email first"
    );
}

#[tokio::test]
async fn wrong_code_counts_attempts() {
    let app = TestApp::new().await;
    app.server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": EMAIL }))
        .await
        .assert_status_ok();
    let code = app.last_code_for(EMAIL);
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let response = app
        .server
        .post("/api/otp/verify-otp")
        .json(&json!({ "email": EMAIL, "otp": wrong }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Invalid OTP. 4 attempts remaining"
    );
}

#[tokio::test]
async fn fifth_wrong_code_locks_the_record() {
    let app = TestApp::new().await;
    app.server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": EMAIL }))
        .await
        .assert_status_ok();
    let code = app.last_code_for(EMAIL);
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for remaining in (0..5).rev() {
        let response = app
            .server
            .post("/api/otp/verify-otp")
            .json(&json!({ "email": EMAIL, "otp": wrong }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["message"],
            format!("Invalid OTP. {remaining} attempts remaining")
        );
    }

    let locked = app
        .server
        .post("/api/otp/verify-otp")
        .json(&json!({ "email": EMAIL, "otp": code }))
        .await;
    locked.assert_status(StatusCode::TOO_MANY_REQUESTS);

    let record = app.sql.otp_latest_for_email(EMAIL).await.unwrap().unwrap();
    assert_eq!(record.attempts, 5);
    assert!(!record.verified);
}

#[tokio::test]
async fn send_within_cooldown_is_throttled() {
    let app = TestApp::new().await;
    app.server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": EMAIL }))
        .await
        .assert_status_ok();

    let response = app
        .server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": EMAIL }))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.json::<Value>()["message"],
        "Please wait before requesting a new code"
    );
    assert_eq!(app.mailer.outbox().len(), 1);

    // other addresses are unaffected
    app.server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": "carol@example.com" }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn resend_within_cooldown_is_throttled() {
    let app = TestApp::new().await;
    app.server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": EMAIL }))
        .await
        .assert_status_ok();

    let response = app
        .server
        .post("/api/otp/resend-otp")
        .json(&json!({ "email": EMAIL }))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.mailer.outbox().len(), 1);
}

#[tokio::test]
async fn send_otp_rejects_bad_email() {
    let app = TestApp::new().await;
    let response = app
        .server
        .post("/api/otp/send-otp")
        .json(&json!({ "email": "not-an-email" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Please enter a valid email address"
    );
    assert!(app.mailer.outbox().is_empty());
}

#[tokio::test]
async fn login_failures() {
    let user = account("Bob", "bob@example.com", Role::User).await;
    let app = TestApp::new().await;
    let _ = app.users.clone().with_user(user);

    let unknown = app
        .server
        .post("/api/user/login")
        .json(&json!({ "email": "nobody@example.com", "password": TEST_PASSWORD }))
        .await;
    unknown.assert_status(StatusCode::NOT_FOUND);

    let wrong = app
        .server
        .post("/api/user/login")
        .json(&json!({ "email": "bob@example.com", "password": "nope-nope" }))
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.json::<Value>()["message"], "Invalid Credentials");
}

#[tokio::test]
async fn protected_routes_require_token() {
    let app = TestApp::new().await;

    let response = app.server.get("/api/user/data").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["success"], false);

    let response = app
        .server
        .get("/api/user/data")
        .authorization_bearer("not-a-jwt")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_checks_current_password() {
    let user = account("Bob", "bob@example.com", Role::User).await;
    let token = token_for(&user);
    let app = TestApp::new().await;
    let _ = app.users.clone().with_user(user);

    let wrong = app
        .server
        .post("/api/user/change-password")
        .authorization_bearer(&token)
        .json(&json!({ "currentPassword": "guess-guess", "newPassword": "brand-new-pass" }))
        .await;
    wrong.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        wrong.json::<Value>()["message"],
        "Current password is incorrect"
    );

    app.server
        .post("/api/user/change-password")
        .authorization_bearer(&token)
        .json(&json!({ "currentPassword": TEST_PASSWORD, "newPassword": "brand-new-pass" }))
        .await
        .assert_status_ok();

    app.server
        .post("/api/user/login")
        .json(&json!({ "email": "bob@example.com", "password": "brand-new-pass" }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn reset_password_with_verified_email() {
    let user = account("Bob", "bob@example.com", Role::User).await;
    let app = TestApp::new().await;
    let _ = app.users.clone().with_user(user);

    let verification_token = verified_token(&app, "bob@example.com").await;
    app.server
        .post("/api/user/reset-password")
        .json(&json!({
            "email": "bob@example.com",
            "newPassword": "reset-pass-123",
            "verificationToken": verification_token,
        }))
        .await
        .assert_status_ok();

    app.server
        .post("/api/user/login")
        .json(&json!({ "email": "bob@example.com", "password": "reset-pass-123" }))
        .await
        .assert_status_ok();
}
