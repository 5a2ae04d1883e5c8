//! `/api/otp` endpoints: send, resend, and verify email codes.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    MAX_ATTEMPTS, OTP_LIFETIME_MINUTES, OtpCheck, OtpRecord, is_valid_email, normalize_email,
};
use crate::api::{ApiError, ApiJson, ApiResult, Message, Success, ok, ok_message};
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::UserStorage;

pub fn otp_routes<S, U>() -> Router<AppState<S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    Router::new()
        .route("/send-otp", post(send_otp::<S, U>))
        .route("/resend-otp", post(resend_otp::<S, U>))
        .route("/verify-otp", post(verify_otp::<S, U>))
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub message: String,
    pub verification_token: Uuid,
}

fn checked_email(raw: &str) -> ApiResult<String> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Please enter a valid email address"));
    }
    Ok(email)
}

fn too_many_attempts() -> ApiError {
    ApiError::TooManyRequests("Too many failed attempts. Please request a new code".to_owned())
}

/// Issue a fresh code unless the previous one for `email` is younger than
/// the resend cooldown. Applies to both send and resend.
async fn issue_and_deliver<S, U>(state: &AppState<S, U>, email: &str) -> ApiResult<()>
where
    S: SqlStorage,
    U: UserStorage,
{
    if let Some(latest) = state.sql_storage.otp_latest_for_email(email).await?
        && latest.in_cooldown(Utc::now())
    {
        return Err(ApiError::TooManyRequests(
            "Please wait before requesting a new code".to_owned(),
        ));
    }

    let record = state
        .sql_storage
        .otp_replace(OtpRecord::issue(email, Utc::now()))
        .await?;

    state
        .mailer
        .send(
            email,
            "Your verification code",
            format!(
                "Your verification code is {}. It expires in {} minutes.",
                record.code, OTP_LIFETIME_MINUTES
            ),
        )
        .await?;

    tracing::info!(otp_id = %record.id, "Verification code sent");
    Ok(())
}

#[tracing::instrument(skip_all)]
async fn send_otp<S, U>(
    State(state): State<AppState<S, U>>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let email = checked_email(&payload.email)?;
    issue_and_deliver(&state, &email).await?;
    Ok(ok_message("OTP sent to your email"))
}

#[tracing::instrument(skip_all)]
async fn resend_otp<S, U>(
    State(state): State<AppState<S, U>>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let email = checked_email(&payload.email)?;
    issue_and_deliver(&state, &email).await?;
    Ok(ok_message("OTP resent to your email"))
}

#[tracing::instrument(skip_all)]
async fn verify_otp<S, U>(
    State(state): State<AppState<S, U>>,
    ApiJson(payload): ApiJson<VerifyOtpRequest>,
) -> ApiResult<Json<Success<VerifyOtpResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let email = checked_email(&payload.email)?;
    if payload.otp.trim().is_empty() {
        return Err(ApiError::bad_request("Email and OTP are required"));
    }

    let record = state
        .sql_storage
        .otp_latest_for_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("No verification code found for this email"))?;

    match record.check(&payload.otp, Utc::now()) {
        OtpCheck::Matches => {
            let record = state
                .sql_storage
                .otp_mark_verified(record.id, MAX_ATTEMPTS)
                .await?
                .ok_or_else(too_many_attempts)?;
            tracing::info!(otp_id = %record.id, "Email verified");
            Ok(ok(VerifyOtpResponse {
                message: "Email verified successfully".to_owned(),
                verification_token: record.id,
            }))
        }
        OtpCheck::WrongCode => {
            let attempts = state
                .sql_storage
                .otp_record_failure(record.id, MAX_ATTEMPTS)
                .await?
                .ok_or_else(too_many_attempts)?;
            Err(ApiError::bad_request(format!(
                "Invalid OTP. {} attempts remaining",
                OtpRecord::remaining_attempts(attempts)
            )))
        }
        OtpCheck::Expired => Err(ApiError::bad_request(
            "OTP has expired. Please request a new one",
        )),
        OtpCheck::TooManyAttempts => Err(too_many_attempts()),
    }
}
