//! `/api/bookings` endpoints.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::{Booking, BookingStatus, BookingView, cars_of, rental_price, with_cars};
use crate::api::{ApiError, ApiJson, ApiPath, ApiResult, Success, ok};
use crate::cars::Car;
use crate::database::SqlStorage;
use crate::notifications::{Notification, NotificationKind, notify};
use crate::state::AppState;
use crate::users::session_auth::{RequireAuth, load_owner, load_user};
use crate::users::storage::UserStorage;

pub fn booking_routes<S, U>() -> Router<AppState<S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    Router::new()
        .route("/check-availability", post(check_availability::<S, U>))
        .route("/create", post(create_booking::<S, U>))
        .route("/user", get(user_bookings::<S, U>))
        .route("/owner", get(owner_bookings::<S, U>))
        .route("/change-status", post(change_status::<S, U>))
        .route("/cancel", post(cancel_booking::<S, U>))
        .route("/car/{id}/dates", get(booked_dates::<S, U>))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    #[serde(default)]
    pub location: String,
    pub pickup_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub available_cars: Vec<Car>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub car: Option<Uuid>,
    pub pickup_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub message: String,
    pub booking: Booking,
}

#[derive(Debug, Serialize)]
pub struct BookingsResponse {
    pub bookings: Vec<BookingView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusRequest {
    pub booking_id: Option<Uuid>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub booking_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeView {
    pub pickup_date: NaiveDate,
    pub return_date: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedDatesResponse {
    pub booked_dates: Vec<DateRangeView>,
}

fn checked_dates(
    pickup: Option<NaiveDate>,
    ret: Option<NaiveDate>,
) -> ApiResult<(NaiveDate, NaiveDate)> {
    let (Some(pickup), Some(ret)) = (pickup, ret) else {
        return Err(ApiError::bad_request(
            "Pickup and return dates are required",
        ));
    };
    if ret < pickup {
        return Err(ApiError::bad_request(
            "Return date must be on or after the pickup date",
        ));
    }
    Ok((pickup, ret))
}

async fn booking_for<S: SqlStorage>(storage: &S, id: Option<Uuid>) -> ApiResult<Booking> {
    let id = id.ok_or_else(|| ApiError::bad_request("Booking ID is required"))?;
    storage
        .bookings_get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))
}

/// "Brand Model" for notification text.
async fn car_label<S: SqlStorage>(storage: &S, car: Uuid) -> String {
    match storage.cars_get(car).await {
        Ok(Some(car)) => format!("{} {}", car.brand, car.model),
        _ => "your car".to_owned(),
    }
}

async fn views_for<S: SqlStorage>(storage: &S, bookings: Vec<Booking>) -> ApiResult<Vec<BookingView>> {
    let cars = cars_of(storage, &bookings).await?;
    Ok(with_cars(bookings, &cars))
}

#[tracing::instrument(skip_all, fields(location = %payload.location))]
async fn check_availability<S, U>(
    State(state): State<AppState<S, U>>,
    ApiJson(payload): ApiJson<AvailabilityRequest>,
) -> ApiResult<Json<Success<AvailabilityResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    if payload.location.trim().is_empty() {
        return Err(ApiError::bad_request("Location is required"));
    }
    let (pickup, ret) = checked_dates(payload.pickup_date, payload.return_date)?;

    let taken: HashSet<Uuid> = state
        .sql_storage
        .bookings_list_overlapping(pickup, ret)
        .await?
        .into_iter()
        .map(|b| b.car)
        .collect();

    let available_cars = state
        .sql_storage
        .cars_list_available()
        .await?
        .into_iter()
        .filter(|car| car.is_located_in(&payload.location) && !taken.contains(&car.id))
        .collect();

    Ok(ok(AvailabilityResponse { available_cars }))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn create_booking<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<CreateBookingRequest>,
) -> ApiResult<Json<Success<BookingResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let renter = load_user(&state.user_storage, &auth).await?;
    let car_id = payload
        .car
        .ok_or_else(|| ApiError::bad_request("Car is required"))?;
    let (pickup, ret) = checked_dates(payload.pickup_date, payload.return_date)?;

    let car = state
        .sql_storage
        .cars_get(car_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Car not found"))?;
    let Some(owner) = car.owner.filter(|_| car.is_bookable()) else {
        return Err(ApiError::bad_request("Car is not available for booking"));
    };
    if owner == renter.id {
        return Err(ApiError::bad_request("You cannot book your own car"));
    }

    let price = rental_price(pickup, ret, car.price_per_day)
        .ok_or_else(|| ApiError::bad_request("Rental price is out of range"))?;
    let booking = Booking::new(car.id, renter.id, owner, pickup, ret, price);
    let booking = state.sql_storage.bookings_insert(booking).await?;

    notify(
        &state.sql_storage,
        Notification::new(
            owner,
            NotificationKind::BookingCreated,
            format!(
                "New booking request for {} {} from {} to {}",
                car.brand, car.model, pickup, ret
            ),
            Some(booking.id),
        ),
    )
    .await;

    tracing::info!(booking_id = %booking.id, car_id = %car.id, "Booking created");
    Ok(ok(BookingResponse {
        message: "Booking Created".to_owned(),
        booking,
    }))
}

async fn user_bookings<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<BookingsResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    let bookings = state.sql_storage.bookings_list_for_user(user.id).await?;
    Ok(ok(BookingsResponse {
        bookings: views_for(&state.sql_storage, bookings).await?,
    }))
}

async fn owner_bookings<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<BookingsResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let bookings = state.sql_storage.bookings_list_for_owner(owner.id).await?;
    Ok(ok(BookingsResponse {
        bookings: views_for(&state.sql_storage, bookings).await?,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn change_status<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<ChangeStatusRequest>,
) -> ApiResult<Json<Success<BookingResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    let next: BookingStatus = payload
        .status
        .trim()
        .parse()
        .map_err(|e: super::InvalidStatus| ApiError::bad_request(e.to_string()))?;

    let mut booking = booking_for(&state.sql_storage, payload.booking_id).await?;
    if booking.owner != user.id {
        return Err(ApiError::forbidden("Unauthorized"));
    }
    if !booking.status.owner_can_move_to(next) {
        return Err(ApiError::bad_request(format!(
            "Cannot change status from {} to {}",
            booking.status, next
        )));
    }

    booking.status = next;
    let booking = state.sql_storage.bookings_update(booking).await?;

    let car = car_label(&state.sql_storage, booking.car).await;
    notify(
        &state.sql_storage,
        Notification::new(
            booking.user,
            NotificationKind::BookingStatusChanged,
            format!("Your booking for {car} is now {next}"),
            Some(booking.id),
        ),
    )
    .await;

    tracing::info!(booking_id = %booking.id, status = %next, "Booking status changed");
    Ok(ok(BookingResponse {
        message: "Status Updated".to_owned(),
        booking,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn cancel_booking<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<CancelRequest>,
) -> ApiResult<Json<Success<BookingResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    let mut booking = booking_for(&state.sql_storage, payload.booking_id).await?;
    if booking.user != user.id {
        return Err(ApiError::forbidden("Unauthorized"));
    }
    if !booking.status.renter_can_cancel() {
        return Err(ApiError::bad_request(
            "This booking can no longer be cancelled",
        ));
    }

    booking.status = BookingStatus::Cancelled;
    booking.cancellation_reason = payload
        .reason
        .map(|r| r.trim().to_owned())
        .filter(|r| !r.is_empty());
    let booking = state.sql_storage.bookings_update(booking).await?;

    let car = car_label(&state.sql_storage, booking.car).await;
    let message = match &booking.cancellation_reason {
        Some(reason) => format!("Booking for {car} was cancelled by the renter: {reason}"),
        None => format!("Booking for {car} was cancelled by the renter"),
    };
    notify(
        &state.sql_storage,
        Notification::new(
            booking.owner,
            NotificationKind::BookingCancelled,
            message,
            Some(booking.id),
        ),
    )
    .await;

    tracing::info!(booking_id = %booking.id, "Booking cancelled by renter");
    Ok(ok(BookingResponse {
        message: "Booking cancelled".to_owned(),
        booking,
    }))
}

async fn booked_dates<S, U>(
    State(state): State<AppState<S, U>>,
    ApiPath(car_id): ApiPath<Uuid>,
) -> ApiResult<Json<Success<BookedDatesResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    if state.sql_storage.cars_get(car_id).await?.is_none() {
        return Err(ApiError::not_found("Car not found"));
    }

    let booked_dates = state
        .sql_storage
        .bookings_list_active_for_car(car_id)
        .await?
        .into_iter()
        .map(|b| DateRangeView {
            pickup_date: b.pickup_date,
            return_date: b.return_date,
        })
        .collect();

    Ok(ok(BookedDatesResponse { booked_dates }))
}
