use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use super::Notification;
use crate::api::{ApiError, ApiPath, ApiResult, Message, Success, ok, ok_message};
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::session_auth::RequireAuth;
use crate::users::storage::UserStorage;

pub fn notification_routes<S, U>() -> Router<AppState<S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    Router::new()
        .route("/", get(list_notifications::<S, U>))
        .route("/{id}/read", post(mark_read::<S, U>))
        .route("/read-all", post(mark_all_read::<S, U>))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MarkedResponse {
    pub message: String,
    pub updated: u64,
}

async fn list_notifications<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<NotificationsResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let notifications = state
        .sql_storage
        .notifications_list_for_user(auth.user_id())
        .await?;
    let unread_count = notifications.iter().filter(|n| !n.read).count();
    Ok(ok(NotificationsResponse {
        notifications,
        unread_count,
    }))
}

async fn mark_read<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    if !state
        .sql_storage
        .notifications_mark_read(auth.user_id(), id)
        .await?
    {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(ok_message("Notification marked as read"))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn mark_all_read<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<MarkedResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let updated = state
        .sql_storage
        .notifications_mark_all_read(auth.user_id())
        .await?;
    tracing::debug!(updated, "Marked notifications read");
    Ok(ok(MarkedResponse {
        message: "All notifications marked as read".to_owned(),
        updated,
    }))
}
