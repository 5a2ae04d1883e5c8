//! Relational storage for listings, bookings, reviews, notifications, and
//! OTP records.
//!
//! - `SqlStorage`: the interface handlers are generic over
//! - `PgStorage`: PostgreSQL implementation
//! - `MockSqlStorage`: in-memory implementation for tests

mod mock;
mod pg;

pub use mock::MockSqlStorage;
pub use pg::PgStorage;

use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use uuid::Uuid;

use crate::bookings::Booking;
use crate::cars::Car;
use crate::config::Config;
use crate::notifications::Notification;
use crate::otp::OtpRecord;
use crate::reviews::Review;

/// Initialize a PostgreSQL connection pool
pub async fn create_pool(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new().connect(config.database_url()).await?;

    tracing::info!("Database connection pool established");

    Ok(pool)
}

/// Apply pending schema migrations from `services/migrations`.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SqlStorageError {
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness or exclusion rule rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub const BOOKING_CONFLICT: &str = "Car is already booked for the selected dates";
pub const REVIEW_CONFLICT: &str = "This booking has already been reviewed";

pub trait SqlStorage: Clone + Send + Sync + 'static {
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    // cars

    fn cars_insert(&self, car: Car) -> impl Future<Output = Result<Car, SqlStorageError>> + Send;

    fn cars_get(&self, id: Uuid)
    -> impl Future<Output = Result<Option<Car>, SqlStorageError>> + Send;

    fn cars_get_many(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Car>, SqlStorageError>> + Send;

    /// Listed cars flagged available, newest first.
    fn cars_list_available(&self)
    -> impl Future<Output = Result<Vec<Car>, SqlStorageError>> + Send;

    fn cars_list_by_owner(
        &self,
        owner: Uuid,
    ) -> impl Future<Output = Result<Vec<Car>, SqlStorageError>> + Send;

    /// Replace every column of an existing car. `NotFound` if it is gone.
    fn cars_update(&self, car: Car) -> impl Future<Output = Result<Car, SqlStorageError>> + Send;

    fn cars_delete_by_owner(
        &self,
        owner: Uuid,
    ) -> impl Future<Output = Result<u64, SqlStorageError>> + Send;

    // bookings

    /// Insert a booking, failing with `Conflict` when it overlaps another
    /// non-cancelled booking of the same car.
    fn bookings_insert(
        &self,
        booking: Booking,
    ) -> impl Future<Output = Result<Booking, SqlStorageError>> + Send;

    fn bookings_get(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Booking>, SqlStorageError>> + Send;

    fn bookings_get_many(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Booking>, SqlStorageError>> + Send;

    fn bookings_list_for_user(
        &self,
        user: Uuid,
    ) -> impl Future<Output = Result<Vec<Booking>, SqlStorageError>> + Send;

    fn bookings_list_for_owner(
        &self,
        owner: Uuid,
    ) -> impl Future<Output = Result<Vec<Booking>, SqlStorageError>> + Send;

    /// Non-cancelled bookings of a car, ordered by pickup date.
    fn bookings_list_active_for_car(
        &self,
        car: Uuid,
    ) -> impl Future<Output = Result<Vec<Booking>, SqlStorageError>> + Send;

    /// Non-cancelled bookings of any car overlapping `[pickup, ret]`.
    fn bookings_list_overlapping(
        &self,
        pickup: NaiveDate,
        ret: NaiveDate,
    ) -> impl Future<Output = Result<Vec<Booking>, SqlStorageError>> + Send;

    /// Persist status and cancellation reason of an existing booking.
    fn bookings_update(
        &self,
        booking: Booking,
    ) -> impl Future<Output = Result<Booking, SqlStorageError>> + Send;

    /// Count bookings with `account` as renter or owner that are not yet
    /// completed or cancelled.
    fn bookings_count_open_for_account(
        &self,
        account: Uuid,
    ) -> impl Future<Output = Result<u64, SqlStorageError>> + Send;

    fn bookings_delete_for_account(
        &self,
        account: Uuid,
    ) -> impl Future<Output = Result<u64, SqlStorageError>> + Send;

    // reviews

    /// Insert a review, failing with `Conflict` if its booking already has one.
    fn reviews_insert(
        &self,
        review: Review,
    ) -> impl Future<Output = Result<Review, SqlStorageError>> + Send;

    fn reviews_list_for_car(
        &self,
        car: Uuid,
    ) -> impl Future<Output = Result<Vec<Review>, SqlStorageError>> + Send;

    fn reviews_list_for_user(
        &self,
        user: Uuid,
    ) -> impl Future<Output = Result<Vec<Review>, SqlStorageError>> + Send;

    /// Delete reviews written by `account`, left on any of `cars`, or
    /// attached to a booking `account` took part in.
    fn reviews_delete_for_account(
        &self,
        account: Uuid,
        cars: &[Uuid],
    ) -> impl Future<Output = Result<u64, SqlStorageError>> + Send;

    // notifications

    fn notifications_insert(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<Notification, SqlStorageError>> + Send;

    fn notifications_list_for_user(
        &self,
        user: Uuid,
    ) -> impl Future<Output = Result<Vec<Notification>, SqlStorageError>> + Send;

    /// Returns `false` when no notification with `id` belongs to `user`.
    fn notifications_mark_read(
        &self,
        user: Uuid,
        id: Uuid,
    ) -> impl Future<Output = Result<bool, SqlStorageError>> + Send;

    fn notifications_mark_all_read(
        &self,
        user: Uuid,
    ) -> impl Future<Output = Result<u64, SqlStorageError>> + Send;

    fn notifications_delete_for_user(
        &self,
        user: Uuid,
    ) -> impl Future<Output = Result<u64, SqlStorageError>> + Send;

    // otp

    /// Drop every record for the record's email, then insert it.
    fn otp_replace(
        &self,
        record: OtpRecord,
    ) -> impl Future<Output = Result<OtpRecord, SqlStorageError>> + Send;

    fn otp_get(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<OtpRecord>, SqlStorageError>> + Send;

    fn otp_latest_for_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<OtpRecord>, SqlStorageError>> + Send;

    /// Count one wrong guess in a single statement, unless the record
    /// already holds `max_attempts`. Returns the new count, `None` when the
    /// record is locked or gone.
    fn otp_record_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> impl Future<Output = Result<Option<i32>, SqlStorageError>> + Send;

    /// Mark a record verified while it is still under `max_attempts`.
    fn otp_mark_verified(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> impl Future<Output = Result<Option<OtpRecord>, SqlStorageError>> + Send;

    fn otp_delete(&self, id: Uuid) -> impl Future<Output = Result<bool, SqlStorageError>> + Send;
}
