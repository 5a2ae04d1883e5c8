//! PostgreSQL implementation of `SqlStorage`.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{BOOKING_CONFLICT, REVIEW_CONFLICT, SqlStorage, SqlStorageError};
use crate::bookings::{Booking, BookingStatus};
use crate::cars::{Car, CarAddress};
use crate::notifications::{Notification, NotificationKind};
use crate::otp::OtpRecord;
use crate::reviews::Review;

/// SQLSTATE raised by the `bookings_no_overlap` exclusion constraint.
const EXCLUSION_VIOLATION: &str = "23P01";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_err(e: sqlx::Error) -> SqlStorageError {
    SqlStorageError::Storage(e.to_string())
}

/// Map a constraint violation with the given SQLSTATE to `Conflict`.
fn conflict_on(code: &'static str, message: &'static str) -> impl Fn(sqlx::Error) -> SqlStorageError {
    move |e| {
        let is_conflict = e
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|c| c == code);
        if is_conflict {
            SqlStorageError::Conflict(message.to_owned())
        } else {
            storage_err(e)
        }
    }
}

const CAR_COLUMNS: &str = "id, owner_id, brand, model, image, year, category, seating_capacity, \
     fuel_type, transmission, price_per_day, location, address, description, is_available, created_at";

#[derive(sqlx::FromRow)]
struct CarRow {
    id: Uuid,
    owner_id: Option<Uuid>,
    brand: String,
    model: String,
    image: String,
    year: i32,
    category: String,
    seating_capacity: i32,
    fuel_type: String,
    transmission: String,
    price_per_day: i64,
    location: String,
    address: Option<Json<CarAddress>>,
    description: String,
    is_available: bool,
    created_at: DateTime<Utc>,
}

impl From<CarRow> for Car {
    fn from(row: CarRow) -> Self {
        Car {
            id: row.id,
            owner: row.owner_id,
            brand: row.brand,
            model: row.model,
            image: row.image,
            year: row.year,
            category: row.category,
            seating_capacity: row.seating_capacity,
            fuel_type: row.fuel_type,
            transmission: row.transmission,
            price_per_day: row.price_per_day,
            location: row.location,
            address: row.address.map(|Json(a)| a),
            description: row.description,
            is_available: row.is_available,
            created_at: row.created_at,
        }
    }
}

const BOOKING_COLUMNS: &str = "id, car_id, user_id, owner_id, pickup_date, return_date, status, \
     price, cancellation_reason, created_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    car_id: Uuid,
    user_id: Uuid,
    owner_id: Uuid,
    pickup_date: NaiveDate,
    return_date: NaiveDate,
    status: String,
    price: i64,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = SqlStorageError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status: BookingStatus = row
            .status
            .parse()
            .map_err(|e: crate::bookings::InvalidStatus| SqlStorageError::Storage(e.to_string()))?;
        Ok(Booking {
            id: row.id,
            car: row.car_id,
            user: row.user_id,
            owner: row.owner_id,
            pickup_date: row.pickup_date,
            return_date: row.return_date,
            status,
            price: row.price,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
        })
    }
}

fn bookings_from_rows(rows: Vec<BookingRow>) -> Result<Vec<Booking>, SqlStorageError> {
    rows.into_iter().map(Booking::try_from).collect()
}

const REVIEW_COLUMNS: &str = "id, car_id, user_id, booking_id, rating, comment, created_at";

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    car_id: Uuid,
    user_id: Uuid,
    booking_id: Uuid,
    rating: i32,
    comment: String,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            id: row.id,
            car: row.car_id,
            user: row.user_id,
            booking: row.booking_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, message, booking_id, read, created_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    message: String,
    booking_id: Option<Uuid>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = SqlStorageError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationKind::parse(&row.kind).ok_or_else(|| {
            SqlStorageError::Storage(format!("Unknown notification kind: {}", row.kind))
        })?;
        Ok(Notification {
            id: row.id,
            user: row.user_id,
            kind,
            message: row.message,
            booking: row.booking_id,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

const OTP_COLUMNS: &str = "id, email, code, verified, attempts, expires_at, created_at";

#[derive(sqlx::FromRow)]
struct OtpRow {
    id: Uuid,
    email: String,
    code: String,
    verified: bool,
    attempts: i32,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<OtpRow> for OtpRecord {
    fn from(row: OtpRow) -> Self {
        OtpRecord {
            id: row.id,
            email: row.email,
            code: row.code,
            verified: row.verified,
            attempts: row.attempts,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

impl SqlStorage for PgStorage {
    async fn is_connected(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn cars_insert(&self, car: Car) -> Result<Car, SqlStorageError> {
        let sql = format!(
            "INSERT INTO cars ({CAR_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {CAR_COLUMNS}"
        );
        let row: CarRow = sqlx::query_as(&sql)
            .bind(car.id)
            .bind(car.owner)
            .bind(&car.brand)
            .bind(&car.model)
            .bind(&car.image)
            .bind(car.year)
            .bind(&car.category)
            .bind(car.seating_capacity)
            .bind(&car.fuel_type)
            .bind(&car.transmission)
            .bind(car.price_per_day)
            .bind(&car.location)
            .bind(car.address.as_ref().map(Json))
            .bind(&car.description)
            .bind(car.is_available)
            .bind(car.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.into())
    }

    async fn cars_get(&self, id: Uuid) -> Result<Option<Car>, SqlStorageError> {
        let sql = format!("SELECT {CAR_COLUMNS} FROM cars WHERE id = $1");
        let row: Option<CarRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Car::from))
    }

    async fn cars_get_many(&self, ids: &[Uuid]) -> Result<Vec<Car>, SqlStorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {CAR_COLUMNS} FROM cars WHERE id = ANY($1)");
        let rows: Vec<CarRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Car::from).collect())
    }

    async fn cars_list_available(&self) -> Result<Vec<Car>, SqlStorageError> {
        let sql = format!(
            "SELECT {CAR_COLUMNS} FROM cars \
             WHERE is_available AND owner_id IS NOT NULL \
             ORDER BY created_at DESC"
        );
        let rows: Vec<CarRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Car::from).collect())
    }

    async fn cars_list_by_owner(&self, owner: Uuid) -> Result<Vec<Car>, SqlStorageError> {
        let sql =
            format!("SELECT {CAR_COLUMNS} FROM cars WHERE owner_id = $1 ORDER BY created_at DESC");
        let rows: Vec<CarRow> = sqlx::query_as(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Car::from).collect())
    }

    async fn cars_update(&self, car: Car) -> Result<Car, SqlStorageError> {
        let sql = format!(
            "UPDATE cars SET owner_id = $2, brand = $3, model = $4, image = $5, year = $6, \
             category = $7, seating_capacity = $8, fuel_type = $9, transmission = $10, \
             price_per_day = $11, location = $12, address = $13, description = $14, \
             is_available = $15 \
             WHERE id = $1 \
             RETURNING {CAR_COLUMNS}"
        );
        let row: Option<CarRow> = sqlx::query_as(&sql)
            .bind(car.id)
            .bind(car.owner)
            .bind(&car.brand)
            .bind(&car.model)
            .bind(&car.image)
            .bind(car.year)
            .bind(&car.category)
            .bind(car.seating_capacity)
            .bind(&car.fuel_type)
            .bind(&car.transmission)
            .bind(car.price_per_day)
            .bind(&car.location)
            .bind(car.address.as_ref().map(Json))
            .bind(&car.description)
            .bind(car.is_available)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(Car::from)
            .ok_or_else(|| SqlStorageError::NotFound("Car not found".to_owned()))
    }

    async fn cars_delete_by_owner(&self, owner: Uuid) -> Result<u64, SqlStorageError> {
        let result = sqlx::query("DELETE FROM cars WHERE owner_id = $1")
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn bookings_insert(&self, booking: Booking) -> Result<Booking, SqlStorageError> {
        let sql = format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {BOOKING_COLUMNS}"
        );
        let row: BookingRow = sqlx::query_as(&sql)
            .bind(booking.id)
            .bind(booking.car)
            .bind(booking.user)
            .bind(booking.owner)
            .bind(booking.pickup_date)
            .bind(booking.return_date)
            .bind(booking.status.as_str())
            .bind(booking.price)
            .bind(&booking.cancellation_reason)
            .bind(booking.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_on(EXCLUSION_VIOLATION, BOOKING_CONFLICT))?;
        row.try_into()
    }

    async fn bookings_get(&self, id: Uuid) -> Result<Option<Booking>, SqlStorageError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn bookings_get_many(&self, ids: &[Uuid]) -> Result<Vec<Booking>, SqlStorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ANY($1)");
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn bookings_list_for_user(&self, user: Uuid) -> Result<Vec<Booking>, SqlStorageError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(user)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        bookings_from_rows(rows)
    }

    async fn bookings_list_for_owner(&self, owner: Uuid) -> Result<Vec<Booking>, SqlStorageError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE owner_id = $1 ORDER BY created_at DESC"
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        bookings_from_rows(rows)
    }

    async fn bookings_list_active_for_car(
        &self,
        car: Uuid,
    ) -> Result<Vec<Booking>, SqlStorageError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE car_id = $1 AND status <> 'cancelled' \
             ORDER BY pickup_date"
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(car)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        bookings_from_rows(rows)
    }

    async fn bookings_list_overlapping(
        &self,
        pickup: NaiveDate,
        ret: NaiveDate,
    ) -> Result<Vec<Booking>, SqlStorageError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status <> 'cancelled' AND pickup_date <= $2 AND return_date >= $1"
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(pickup)
            .bind(ret)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        bookings_from_rows(rows)
    }

    async fn bookings_update(&self, booking: Booking) -> Result<Booking, SqlStorageError> {
        let sql = format!(
            "UPDATE bookings SET status = $2, cancellation_reason = $3 \
             WHERE id = $1 \
             RETURNING {BOOKING_COLUMNS}"
        );
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(booking.id)
            .bind(booking.status.as_str())
            .bind(&booking.cancellation_reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.ok_or_else(|| SqlStorageError::NotFound("Booking not found".to_owned()))?
            .try_into()
    }

    async fn bookings_count_open_for_account(&self, account: Uuid) -> Result<u64, SqlStorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings \
             WHERE (user_id = $1 OR owner_id = $1) \
             AND status IN ('pending', 'booked', 'on_rent')",
        )
        .bind(account)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count.max(0) as u64)
    }

    async fn bookings_delete_for_account(&self, account: Uuid) -> Result<u64, SqlStorageError> {
        let result = sqlx::query("DELETE FROM bookings WHERE user_id = $1 OR owner_id = $1")
            .bind(account)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn reviews_insert(&self, review: Review) -> Result<Review, SqlStorageError> {
        let sql = format!(
            "INSERT INTO reviews ({REVIEW_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {REVIEW_COLUMNS}"
        );
        let row: ReviewRow = sqlx::query_as(&sql)
            .bind(review.id)
            .bind(review.car)
            .bind(review.user)
            .bind(review.booking)
            .bind(review.rating)
            .bind(&review.comment)
            .bind(review.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_on(UNIQUE_VIOLATION, REVIEW_CONFLICT))?;
        Ok(row.into())
    }

    async fn reviews_list_for_car(&self, car: Uuid) -> Result<Vec<Review>, SqlStorageError> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE car_id = $1 ORDER BY created_at DESC"
        );
        let rows: Vec<ReviewRow> = sqlx::query_as(&sql)
            .bind(car)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn reviews_list_for_user(&self, user: Uuid) -> Result<Vec<Review>, SqlStorageError> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows: Vec<ReviewRow> = sqlx::query_as(&sql)
            .bind(user)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn reviews_delete_for_account(
        &self,
        account: Uuid,
        cars: &[Uuid],
    ) -> Result<u64, SqlStorageError> {
        let result = sqlx::query(
            "DELETE FROM reviews \
             WHERE user_id = $1 \
             OR car_id = ANY($2) \
             OR booking_id IN (SELECT id FROM bookings WHERE user_id = $1 OR owner_id = $1)",
        )
        .bind(account)
        .bind(cars)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn notifications_insert(
        &self,
        notification: Notification,
    ) -> Result<Notification, SqlStorageError> {
        let sql = format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        let row: NotificationRow = sqlx::query_as(&sql)
            .bind(notification.id)
            .bind(notification.user)
            .bind(notification.kind.as_str())
            .bind(&notification.message)
            .bind(notification.booking)
            .bind(notification.read)
            .bind(notification.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        row.try_into()
    }

    async fn notifications_list_for_user(
        &self,
        user: Uuid,
    ) -> Result<Vec<Notification>, SqlStorageError> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(user)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn notifications_mark_read(&self, user: Uuid, id: Uuid) -> Result<bool, SqlStorageError> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn notifications_mark_all_read(&self, user: Uuid) -> Result<u64, SqlStorageError> {
        let result =
            sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
                .bind(user)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn notifications_delete_for_user(&self, user: Uuid) -> Result<u64, SqlStorageError> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn otp_replace(&self, record: OtpRecord) -> Result<OtpRecord, SqlStorageError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query("DELETE FROM otp_records WHERE email = $1")
            .bind(&record.email)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        let sql = format!(
            "INSERT INTO otp_records ({OTP_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {OTP_COLUMNS}"
        );
        let row: OtpRow = sqlx::query_as(&sql)
            .bind(record.id)
            .bind(&record.email)
            .bind(&record.code)
            .bind(record.verified)
            .bind(record.attempts)
            .bind(record.expires_at)
            .bind(record.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(row.into())
    }

    async fn otp_get(&self, id: Uuid) -> Result<Option<OtpRecord>, SqlStorageError> {
        let sql = format!("SELECT {OTP_COLUMNS} FROM otp_records WHERE id = $1");
        let row: Option<OtpRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(OtpRecord::from))
    }

    async fn otp_latest_for_email(&self, email: &str) -> Result<Option<OtpRecord>, SqlStorageError> {
        let sql = format!(
            "SELECT {OTP_COLUMNS} FROM otp_records WHERE email = $1 \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row: Option<OtpRow> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(OtpRecord::from))
    }

    async fn otp_record_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<i32>, SqlStorageError> {
        sqlx::query_scalar(
            "UPDATE otp_records SET attempts = attempts + 1 \
             WHERE id = $1 AND attempts < $2 RETURNING attempts",
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)
    }

    async fn otp_mark_verified(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<OtpRecord>, SqlStorageError> {
        let sql = format!(
            "UPDATE otp_records SET verified = TRUE WHERE id = $1 AND attempts < $2 \
             RETURNING {OTP_COLUMNS}"
        );
        let row: Option<OtpRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(max_attempts)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(OtpRecord::from))
    }

    async fn otp_delete(&self, id: Uuid) -> Result<bool, SqlStorageError> {
        let result = sqlx::query("DELETE FROM otp_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }
}
