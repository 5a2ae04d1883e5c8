//! `/api/reviews` endpoints.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::{MAX_RATING, MIN_RATING, Review, average_rating, is_valid_rating};
use crate::api::{ApiError, ApiJson, ApiPath, ApiResult, Success, ok};
use crate::bookings::BookingStatus;
use crate::database::SqlStorage;
use crate::notifications::{Notification, NotificationKind, notify};
use crate::state::AppState;
use crate::users::session_auth::{RequireAuth, load_user};
use crate::users::storage::UserStorage;

pub fn review_routes<S, U>() -> Router<AppState<S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    Router::new()
        .route("/create", post(create_review::<S, U>))
        .route("/car/{id}", get(car_reviews::<S, U>))
        .route("/user", get(user_reviews::<S, U>))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub booking_id: Option<Uuid>,
    pub rating: Option<i32>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub message: String,
    pub review: Review,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reviewer {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarReviewView {
    pub id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    /// `None` once the reviewer has deleted their account.
    pub user: Option<Reviewer>,
    pub rental_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarReviewsResponse {
    pub reviews: Vec<CarReviewView>,
    pub avg_rating: f64,
    pub total_reviews: usize,
}

#[derive(Debug, Serialize)]
pub struct ReviewsResponse {
    pub reviews: Vec<Review>,
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn create_review<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<CreateReviewRequest>,
) -> ApiResult<Json<Success<ReviewResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;

    let rating = payload
        .rating
        .filter(|r| is_valid_rating(*r))
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "Rating must be between {MIN_RATING} and {MAX_RATING}"
            ))
        })?;
    let comment = payload.comment.trim();
    if comment.is_empty() {
        return Err(ApiError::bad_request("Comment is required"));
    }

    let booking_id = payload
        .booking_id
        .ok_or_else(|| ApiError::bad_request("Booking ID is required"))?;
    let booking = state
        .sql_storage
        .bookings_get(booking_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;

    if booking.user != user.id {
        return Err(ApiError::forbidden("You can only review your own bookings"));
    }
    if booking.status != BookingStatus::Completed {
        return Err(ApiError::bad_request(
            "You can only review completed bookings",
        ));
    }

    let review = state
        .sql_storage
        .reviews_insert(Review::new(booking.car, user.id, booking.id, rating, comment))
        .await?;

    notify(
        &state.sql_storage,
        Notification::new(
            booking.owner,
            NotificationKind::ReviewCreated,
            format!("{} left a {}-star review", user.name, rating),
            Some(booking.id),
        ),
    )
    .await;

    tracing::info!(review_id = %review.id, "Review created");
    Ok(ok(ReviewResponse {
        message: "Review submitted".to_owned(),
        review,
    }))
}

async fn car_reviews<S, U>(
    State(state): State<AppState<S, U>>,
    ApiPath(car_id): ApiPath<Uuid>,
) -> ApiResult<Json<Success<CarReviewsResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let reviews = state.sql_storage.reviews_list_for_car(car_id).await?;
    let avg_rating = average_rating(&reviews);
    let total_reviews = reviews.len();

    let user_ids: Vec<Uuid> = reviews.iter().map(|r| r.user).collect();
    let booking_ids: Vec<Uuid> = reviews.iter().map(|r| r.booking).collect();
    let reviewers: HashMap<Uuid, Reviewer> = state
        .user_storage
        .get_users_many(&user_ids)
        .await?
        .into_iter()
        .map(|u| {
            (
                u.id,
                Reviewer {
                    id: u.id,
                    name: u.name,
                    image: u.image,
                },
            )
        })
        .collect();
    let pickups: HashMap<Uuid, NaiveDate> = state
        .sql_storage
        .bookings_get_many(&booking_ids)
        .await?
        .into_iter()
        .map(|b| (b.id, b.pickup_date))
        .collect();

    let views = reviews
        .into_iter()
        .map(|review| CarReviewView {
            id: review.id,
            rating: review.rating,
            user: reviewers.get(&review.user).cloned(),
            rental_date: pickups.get(&review.booking).copied(),
            comment: review.comment,
            created_at: review.created_at,
        })
        .collect();

    Ok(ok(CarReviewsResponse {
        reviews: views,
        avg_rating,
        total_reviews,
    }))
}

async fn user_reviews<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<ReviewsResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    let reviews = state.sql_storage.reviews_list_for_user(user.id).await?;
    Ok(ok(ReviewsResponse { reviews }))
}
