//! `/api/owner` endpoints: listing management, dashboard, and analytics.

use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Car, CarDraft};
use crate::analytics::{self, Analytics, AnalyticsQuery, Dashboard};
use crate::api::{ApiError, ApiJson, ApiQuery, ApiResult, Message, Success, ok, ok_message};
use crate::bookings::cars_of;
use crate::database::SqlStorage;
use crate::images::{ImageForm, ImageKind};
use crate::state::AppState;
use crate::users::routes::replace_profile_image;
use crate::users::session_auth::{RequireAuth, load_owner, load_user};
use crate::users::storage::{Role, StoredUser, UserStorage};

const CAR_DATA_FIELD: &str = "carData";
const CAR_ID_FIELD: &str = "carId";

pub fn owner_routes<S, U>() -> Router<AppState<S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    Router::new()
        .route("/change-role", post(change_role::<S, U>))
        .route("/add-car", post(add_car::<S, U>))
        .route("/cars", get(owner_cars::<S, U>))
        .route("/toggle-car", post(toggle_car::<S, U>))
        .route("/edit-car", post(edit_car::<S, U>))
        .route("/delete-car", post(delete_car::<S, U>))
        .route("/update-image", post(update_image::<S, U>))
        .route("/dashboard", get(owner_dashboard::<S, U>))
        .route("/analytics", get(owner_analytics::<S, U>))
}

#[derive(Debug, Serialize)]
pub struct CarsResponse {
    pub cars: Vec<Car>,
}

#[derive(Debug, Serialize)]
pub struct CarResponse {
    pub message: String,
    pub car: Car,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarIdRequest {
    pub car_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub message: String,
    pub is_available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerImageResponse {
    pub message: String,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub dashboard_data: Dashboard,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub analytics_data: Analytics,
}

fn parse_draft(form: &ImageForm) -> ApiResult<CarDraft> {
    let raw = form.text(CAR_DATA_FIELD).ok_or_else(|| {
        ApiError::bad_request("Car details are missing. Please fill all required fields.")
    })?;
    serde_json::from_str(raw).map_err(|e| {
        tracing::debug!(error = %e, "Rejected car data");
        ApiError::bad_request("Invalid car data format. Please refresh the page and try again.")
    })
}

/// Load a car and make sure `owner` lists it.
async fn owned_car<S: SqlStorage>(
    storage: &S,
    owner: &StoredUser,
    car_id: Option<Uuid>,
    not_owner: &str,
) -> ApiResult<Car> {
    let car_id = car_id.ok_or_else(|| ApiError::bad_request("Car ID is required"))?;
    let car = storage
        .cars_get(car_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Car not found"))?;
    if !car.is_owned_by(owner.id) {
        return Err(ApiError::forbidden(not_owner));
    }
    Ok(car)
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn change_role<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = load_user(&state.user_storage, &auth).await?;
    if !user.is_owner() {
        state.user_storage.update_role(user.id, Role::Owner).await?;
        tracing::info!("User became an owner");
    }
    Ok(ok_message("Now you can list cars"))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn add_car<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    multipart: Multipart,
) -> ApiResult<Json<Success<CarResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let mut form = ImageForm::read(multipart).await?;

    let spec = parse_draft(&form)?
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let upload = form.take_image().ok_or_else(|| {
        ApiError::bad_request("Car image is required. Please upload an image of your car.")
    })?;

    let image = state.images.store(ImageKind::Car, owner.id, upload).await?;
    let car = match state
        .sql_storage
        .cars_insert(Car::new(owner.id, image.clone(), spec))
        .await
    {
        Ok(car) => car,
        Err(e) => {
            state.images.remove(ImageKind::Car, owner.id, &image).await;
            return Err(e.into());
        }
    };

    tracing::info!(car_id = %car.id, "Car listed");
    Ok(ok(CarResponse {
        message: "Car added successfully! You can now manage it from your dashboard.".to_owned(),
        car,
    }))
}

async fn owner_cars<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<CarsResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let cars = state.sql_storage.cars_list_by_owner(owner.id).await?;
    Ok(ok(CarsResponse { cars }))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn toggle_car<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<CarIdRequest>,
) -> ApiResult<Json<Success<ToggleResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let mut car = owned_car(&state.sql_storage, &owner, payload.car_id, "Unauthorized").await?;

    car.is_available = !car.is_available;
    let car = state.sql_storage.cars_update(car).await?;

    Ok(ok(ToggleResponse {
        message: "Availability Toggled".to_owned(),
        is_available: car.is_available,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn edit_car<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    multipart: Multipart,
) -> ApiResult<Json<Success<CarResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let mut form = ImageForm::read(multipart).await?;

    let draft = parse_draft(&form)?;
    let car_id = form
        .text(CAR_ID_FIELD)
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| ApiError::bad_request("Car ID is required to update the car."))?;

    let mut car = owned_car(
        &state.sql_storage,
        &owner,
        Some(car_id),
        "You can only edit your own cars.",
    )
    .await?;
    let spec = draft
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let stored = match form.take_image() {
        Some(upload) => Some(state.images.store(ImageKind::Car, owner.id, upload).await?),
        None => None,
    };
    let previous = match &stored {
        Some(image) => std::mem::replace(&mut car.image, image.clone()),
        None => car.image.clone(),
    };

    car.apply(spec);
    let car = match state.sql_storage.cars_update(car).await {
        Ok(car) => car,
        Err(e) => {
            if let Some(image) = &stored {
                state.images.remove(ImageKind::Car, owner.id, image).await;
            }
            return Err(e.into());
        }
    };

    if stored.is_some() {
        state.images.remove(ImageKind::Car, owner.id, &previous).await;
    }

    tracing::info!(car_id = %car.id, "Car updated");
    Ok(ok(CarResponse {
        message: "Car updated successfully!".to_owned(),
        car,
    }))
}

/// Unlist a car. The row stays so bookings and reviews keep their car.
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn delete_car<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiJson(payload): ApiJson<CarIdRequest>,
) -> ApiResult<Json<Success<Message>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let mut car = owned_car(&state.sql_storage, &owner, payload.car_id, "Unauthorized").await?;

    car.owner = None;
    car.is_available = false;
    let car = state.sql_storage.cars_update(car).await?;

    tracing::info!(car_id = %car.id, "Car removed");
    Ok(ok_message("Car Removed"))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn update_image<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    multipart: Multipart,
) -> ApiResult<Json<Success<OwnerImageResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let upload = ImageForm::read(multipart)
        .await?
        .take_image()
        .ok_or_else(|| ApiError::bad_request("Please select an image to upload."))?;

    let image_url = replace_profile_image(&state, &owner, upload).await?;
    Ok(ok(OwnerImageResponse {
        message: "Profile image updated successfully!".to_owned(),
        image_url,
    }))
}

async fn owner_dashboard<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
) -> ApiResult<Json<Success<DashboardResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let listed = state.sql_storage.cars_list_by_owner(owner.id).await?;
    let bookings = state.sql_storage.bookings_list_for_owner(owner.id).await?;
    let cars = cars_of(&state.sql_storage, &bookings).await?;

    Ok(ok(DashboardResponse {
        dashboard_data: analytics::dashboard(listed.len(), bookings, &cars, Utc::now()),
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
async fn owner_analytics<S, U>(
    State(state): State<AppState<S, U>>,
    auth: RequireAuth,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<Success<AnalyticsResponse>>>
where
    S: SqlStorage,
    U: UserStorage,
{
    let owner = load_owner(&state.user_storage, &auth).await?;
    let range = query
        .date_range()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let cars = state.sql_storage.cars_list_by_owner(owner.id).await?;
    let bookings = state.sql_storage.bookings_list_for_owner(owner.id).await?;

    Ok(ok(AnalyticsResponse {
        analytics_data: analytics::analytics(&cars, &bookings, range, query.category(), Utc::now()),
    }))
}
