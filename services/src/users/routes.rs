//! `/api/user` endpoints: registration, login, profile, passwords, and
//! account deletion.

use axum::{
    Extension, Json, Router,
    extract::{Multipart, State},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::password::{hash_password, is_long_enough, verify_password};
use super::session_auth::{RequireAuth, load_user};
use super::storage::{NewUser, StoredUser, UserProfile, UserStorage};
use super::token::generate_session_token;
use crate::account;
use crate::api::{ApiError, ApiJson, ApiQuery, ApiResult, Message, Success, ok, ok_message};
use crate::cars::CarFilter;
use crate::cars::routes::CarsResponse;
use crate::config::Config;
use crate::database::SqlStorage;
use crate::images::{ImageForm, ImageKind, ImageUpload};
use crate::otp::{OtpRecord, normalize_email};
use crate::state::AppState;

pub fn user_routes<S, U>() -> Router<AppState<S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    Router::new()
        .route("/register", post(register::<S, U>))
        .route("/login", post(login::<S, U>))
        .route("/data", get(user_data::<S, U>))
        .route("/cars", get(list_cars::<S, U>))
        .route("/update-profile-image", post(update_profile_image::<S, U>))
        .route("/upload-profile-image", post(upload_profile_image::<S, U>))
        .route("/change-password", post(change_password::<S, U>))
        .route("/reset-password", post(reset_password::<S, U>))
        .route("/delete-account", delete(delete_account::<S, U>))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub verification_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileImageRequest {
    #[serde(default)]
    pub image_type: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub message: String,
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub verification_token: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    #[serde(default)]
    pub password: String,
}

/// Load a verified OTP record issued for `email`.
async fn verified_otp<S: SqlStorage>(
    storage: &S,
    token: &str,
    email: &str,
) -> ApiResult<Option<OtpRecord>> {
    let Ok(id) = Uuid::parse_str(token.trim()) else {
        return Ok(None);
    };
    let record = storage.otp_get(id).await?;
    Ok(record.filter(|r| r.authorizes(email)))
}

fn session_token(config: &Config, user: &StoredUser) -> ApiResult<String> {
    Ok(generate_session_token(user.id, config.jwt_secret())?)
}

#[tracing::instrument(skip_all)]
async fn register<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<Json<Success<TokenResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let name = payload.name.trim();
    let email = normalize_email(&payload.email);
    if name.is_empty()
        || email.is_empty()
        || payload.verification_token.trim().is_empty()
        || !is_long_enough(&payload.password)
    {
        return Err(ApiError::bad_request(
            "Fill all the fields and verify your email first",
        ));
    }

    let Some(otp) = verified_otp(&state.sql_storage, &payload.verification_token, &email).await?
    else {
        return Err(ApiError::bad_request(
            "Email verification required. Please verify your email first.",
        ));
    };

    if state.user_storage.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = hash_password(&payload.password).await?;
    let user = state
        .user_storage
        .create_user(NewUser::new(name, email, password_hash))
        .await?;

    if !state.sql_storage.otp_delete(otp.id).await? {
        tracing::warn!(otp_id = %otp.id, "Verification record already consumed");
    }

    tracing::info!(user_id = %user.id, "Account created");
    Ok(ok(TokenResponse {
        token: session_token(&config, &user)?,
        message: Some("Account created successfully!".to_owned()),
    }))
}

#[tracing::instrument(skip_all)]
async fn login<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<Success<TokenResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let email = normalize_email(&payload.email);
    let user = state
        .user_storage
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password(&payload.password, &user.password_hash).await? {
        return Err(ApiError::unauthorized("Invalid Credentials"));
    }

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(ok(TokenResponse {
        token: session_token(&config, &user)?,
        message: None,
    }))
}

async fn user_data<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<UserResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    Ok(ok(UserResponse {
        user: user.profile(),
    }))
}

async fn list_cars<S, U>(
    State(state): State<AppState<S, U>>,
    ApiQuery(filter): ApiQuery<CarFilter>,
) -> ApiResult<Json<Success<CarsResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let cars = state
        .sql_storage
        .cars_list_available()
        .await?
        .into_iter()
        .filter(|car| filter.matches(car))
        .collect();
    Ok(ok(CarsResponse { cars }))
}

/// Point the profile at `image` (or clear it), then drop the previous
/// image if this account uploaded it.
async fn set_profile_image<S, U>(
    state: &AppState<S, U>,
    user: &StoredUser,
    image: Option<String>,
) -> ApiResult<StoredUser>
where
    S: SqlStorage,
    U: UserStorage,
{
    let updated = state.user_storage.update_image(user.id, image).await?;
    if let Some(previous) = &user.image
        && updated.image.as_ref() != Some(previous)
    {
        state
            .images
            .remove(ImageKind::Avatar, user.id, previous)
            .await;
    }
    Ok(updated)
}

/// Store an uploaded avatar and attach it to `user`, returning its URL.
pub(crate) async fn replace_profile_image<S, U>(
    state: &AppState<S, U>,
    user: &StoredUser,
    upload: ImageUpload,
) -> ApiResult<String>
where
    S: SqlStorage,
    U: UserStorage,
{
    let url = state.images.store(ImageKind::Avatar, user.id, upload).await?;
    if let Err(e) = set_profile_image(state, user, Some(url.clone())).await {
        state.images.remove(ImageKind::Avatar, user.id, &url).await;
        return Err(e);
    }
    Ok(url)
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn update_profile_image<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<UpdateProfileImageRequest>,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    let url = payload
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());

    match (payload.image_type.as_str(), url) {
        ("default", _) => {
            set_profile_image(&state, &user, None).await?;
            Ok(ok_message("Profile photo removed successfully"))
        }
        ("avatar", Some(url)) => {
            set_profile_image(&state, &user, Some(url.to_owned())).await?;
            Ok(ok_message("Profile photo updated successfully"))
        }
        _ => Err(ApiError::bad_request("Invalid request parameters")),
    }
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn upload_profile_image<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    multipart: Multipart,
) -> ApiResult<Json<Success<ImageResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    let upload = ImageForm::read(multipart)
        .await?
        .take_image()
        .ok_or_else(|| ApiError::bad_request("No image file provided"))?;

    let image_url = replace_profile_image(&state, &user, upload).await?;
    Ok(ok(ImageResponse {
        message: "Profile photo uploaded successfully".to_owned(),
        image_url,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn change_password<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(ApiError::bad_request(
            "Both current and new passwords are required",
        ));
    }
    if !is_long_enough(&payload.new_password) {
        return Err(ApiError::bad_request(
            "New password must be at least 8 characters long",
        ));
    }

    let user = load_user(&state.user_storage, &auth).await?;
    if !verify_password(&payload.current_password, &user.password_hash).await? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    if verify_password(&payload.new_password, &user.password_hash).await? {
        return Err(ApiError::bad_request(
            "New password must be different from current password",
        ));
    }

    let password_hash = hash_password(&payload.new_password).await?;
    state
        .user_storage
        .update_password(user.id, &password_hash)
        .await?;

    tracing::info!("Password changed");
    Ok(ok_message("Password changed successfully"))
}

#[tracing::instrument(skip_all)]
async fn reset_password<S, U>(
    State(state): State<AppState<S, U>>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let email = normalize_email(&payload.email);
    if email.is_empty()
        || payload.new_password.is_empty()
        || payload.verification_token.trim().is_empty()
    {
        return Err(ApiError::bad_request("All fields are required"));
    }
    if !is_long_enough(&payload.new_password) {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters long",
        ));
    }

    let Some(otp) = verified_otp(&state.sql_storage, &payload.verification_token, &email).await?
    else {
        return Err(ApiError::bad_request(
            "Invalid or expired verification token",
        ));
    };

    let user = state
        .user_storage
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if verify_password(&payload.new_password, &user.password_hash).await? {
        return Err(ApiError::bad_request(
            "New password must be different from current password",
        ));
    }

    let password_hash = hash_password(&payload.new_password).await?;
    state
        .user_storage
        .update_password(user.id, &password_hash)
        .await?;
    state.sql_storage.otp_delete(otp.id).await?;

    tracing::info!(user_id = %user.id, "Password reset");
    Ok(ok_message("Password reset successfully"))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn delete_account<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<DeleteAccountRequest>,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    if !verify_password(&payload.password, &user.password_hash).await? {
        return Err(ApiError::unauthorized(
            "Invalid password. Account deletion failed.",
        ));
    }

    account::delete_account(&state, &user).await?;
    Ok(ok_message(
        "Account deleted successfully. All your data has been permanently removed.",
    ))
}
