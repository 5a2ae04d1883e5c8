//! Bookings: status lifecycle, date-range overlap, and pricing.

pub mod routes;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use crate::cars::{Car, CarSummary};
use crate::database::{SqlStorage, SqlStorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Booked,
    OnRent,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Booked => "booked",
            BookingStatus::OnRent => "on_rent",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Statuses whose price counts towards owner revenue.
    pub fn counts_as_revenue(&self) -> bool {
        matches!(
            self,
            BookingStatus::Booked | BookingStatus::OnRent | BookingStatus::Completed
        )
    }

    /// Transitions an owner may apply to a booking on one of their cars.
    pub fn owner_can_move_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Booked) | (Pending, Cancelled) | (Booked, OnRent) | (Booked, Cancelled) | (OnRent, Completed)
        )
    }

    /// A renter may withdraw until the car has been picked up.
    pub fn renter_can_cancel(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Booked)
    }
}

impl Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid booking status: {0}")]
pub struct InvalidStatus(pub String);

impl FromStr for BookingStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "booked" => Ok(BookingStatus::Booked),
            "on_rent" => Ok(BookingStatus::OnRent),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(InvalidStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub car: Uuid,
    pub user: Uuid,
    pub owner: Uuid,
    pub pickup_date: NaiveDate,
    pub return_date: NaiveDate,
    pub status: BookingStatus,
    pub price: i64,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        car: Uuid,
        user: Uuid,
        owner: Uuid,
        pickup_date: NaiveDate,
        return_date: NaiveDate,
        price: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            car,
            user,
            owner,
            pickup_date,
            return_date,
            status: BookingStatus::Pending,
            price,
            cancellation_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn overlaps(&self, pickup: NaiveDate, ret: NaiveDate) -> bool {
        ranges_overlap(self.pickup_date, self.return_date, pickup, ret)
    }

    /// Whether this booking holds its dates against other renters.
    pub fn blocks_dates(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    pub fn rental_days(&self) -> i64 {
        rental_days(self.pickup_date, self.return_date)
    }

    pub fn involves(&self, account: Uuid) -> bool {
        self.user == account || self.owner == account
    }
}

/// Closed-interval overlap: `a_pickup <= b_return AND a_return >= b_pickup`.
pub fn ranges_overlap(
    a_pickup: NaiveDate,
    a_return: NaiveDate,
    b_pickup: NaiveDate,
    b_return: NaiveDate,
) -> bool {
    a_pickup <= b_return && a_return >= b_pickup
}

/// Number of billed days, counting both the pickup and the return day.
pub fn rental_days(pickup: NaiveDate, ret: NaiveDate) -> i64 {
    (ret - pickup).num_days() + 1
}

/// Total price of a rental; `None` when it does not fit in an `i64`.
pub fn rental_price(pickup: NaiveDate, ret: NaiveDate, price_per_day: i64) -> Option<i64> {
    rental_days(pickup, ret).checked_mul(price_per_day)
}

/// A booking with its car embedded, as listed to renters and owners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Uuid,
    pub car: CarSummary,
    pub user: Uuid,
    pub owner: Uuid,
    pub pickup_date: NaiveDate,
    pub return_date: NaiveDate,
    pub status: BookingStatus,
    pub price: i64,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BookingView {
    pub fn new(booking: Booking, car: CarSummary) -> Self {
        Self {
            id: booking.id,
            car,
            user: booking.user,
            owner: booking.owner,
            pickup_date: booking.pickup_date,
            return_date: booking.return_date,
            status: booking.status,
            price: booking.price,
            cancellation_reason: booking.cancellation_reason,
            created_at: booking.created_at,
        }
    }
}

/// Load every car referenced by `bookings`.
pub async fn cars_of<S: SqlStorage>(
    storage: &S,
    bookings: &[Booking],
) -> Result<Vec<Car>, SqlStorageError> {
    let mut ids: Vec<Uuid> = bookings.iter().map(|b| b.car).collect();
    ids.sort_unstable();
    ids.dedup();
    storage.cars_get_many(&ids).await
}

/// Attach car summaries, keeping the order of `bookings`. Bookings whose car
/// is not in `cars` are dropped.
pub fn with_cars(bookings: Vec<Booking>, cars: &[Car]) -> Vec<BookingView> {
    let by_id: HashMap<Uuid, &Car> = cars.iter().map(|c| (c.id, c)).collect();
    bookings
        .into_iter()
        .filter_map(|booking| match by_id.get(&booking.car) {
            Some(car) => Some(BookingView::new(booking, car.summary())),
            None => {
                tracing::warn!(booking_id = %booking.id, car_id = %booking.car, "Booking refers to a missing car");
                None
            }
        })
        .collect()
}
