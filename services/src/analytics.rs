//! Owner dashboard and revenue analytics.
//!
//! Everything here is a pure pass over cars and bookings already loaded for
//! one owner. Revenue counts bookings that are booked, on rent, or completed;
//! time windows are applied to the booking's creation time.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::bookings::{Booking, BookingStatus, BookingView, with_cars};
use crate::cars::Car;

const RECENT_BOOKINGS: usize = 3;
const MOST_RENTED: usize = 5;
const MONTH_PERIOD_DAYS: i64 = 30;
const YEAR_PERIOD_DAYS: i64 = 365;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_cars: usize,
    pub total_bookings: usize,
    pub pending_bookings: usize,
    pub completed_bookings: usize,
    pub recent_bookings: Vec<BookingView>,
    pub monthly_revenue: i64,
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

fn start_of_year(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Summarize an owner's bookings, ordered newest first. `cars` resolves the
/// cars of those bookings, including listings the owner has since removed.
pub fn dashboard(
    total_cars: usize,
    bookings: Vec<Booking>,
    cars: &[Car],
    now: DateTime<Utc>,
) -> Dashboard {
    let month_start = start_of_month(now);
    let count = |status: BookingStatus| bookings.iter().filter(|b| b.status == status).count();

    let pending_bookings = count(BookingStatus::Pending);
    let completed_bookings = count(BookingStatus::Completed);
    let monthly_revenue = bookings
        .iter()
        .filter(|b| b.status.counts_as_revenue() && b.created_at >= month_start)
        .map(|b| b.price)
        .fold(0, i64::saturating_add);
    let total_bookings = bookings.len();

    let recent: Vec<Booking> = bookings.into_iter().take(RECENT_BOOKINGS).collect();

    Dashboard {
        total_cars,
        total_bookings,
        pending_bookings,
        completed_bookings,
        recent_bookings: with_cars(recent, cars),
        monthly_revenue,
    }
}

/// Query string of `GET /api/owner/analytics`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub date_range: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub car_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyticsQueryError {
    #[error("Unknown date range: {0}")]
    UnknownRange(String),

    #[error("Start and end dates are required for a custom range")]
    MissingCustomDates,

    #[error("Start date must not be after end date")]
    InvertedCustomDates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    All,
    Month,
    Year,
    /// Inclusive on both ends.
    Custom { start: NaiveDate, end: NaiveDate },
}

impl DateRange {
    pub fn contains(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            DateRange::All => true,
            DateRange::Month => created_at >= start_of_month(now),
            DateRange::Year => created_at >= start_of_year(now),
            DateRange::Custom { start, end } => {
                let day = created_at.date_naive();
                *start <= day && day <= *end
            }
        }
    }

    /// Days an occupancy rate is measured against.
    pub fn period_days(&self) -> i64 {
        match self {
            DateRange::Year => YEAR_PERIOD_DAYS,
            _ => MONTH_PERIOD_DAYS,
        }
    }
}

impl AnalyticsQuery {
    pub fn date_range(&self) -> Result<DateRange, AnalyticsQueryError> {
        match self.date_range.as_deref().map(str::trim).unwrap_or("all") {
            "" | "all" => Ok(DateRange::All),
            "month" => Ok(DateRange::Month),
            "year" => Ok(DateRange::Year),
            "custom" => match (self.start_date, self.end_date) {
                (Some(start), Some(end)) if start <= end => Ok(DateRange::Custom { start, end }),
                (Some(_), Some(_)) => Err(AnalyticsQueryError::InvertedCustomDates),
                _ => Err(AnalyticsQueryError::MissingCustomDates),
            },
            other => Err(AnalyticsQueryError::UnknownRange(other.to_owned())),
        }
    }

    /// `None` selects every category.
    pub fn category(&self) -> Option<&str> {
        self.car_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("all"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarRevenue {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub image: String,
    pub year: i32,
    pub category: String,
    pub is_available: bool,
    pub total_revenue: i64,
    pub total_bookings: usize,
    pub average_rate: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarRentals {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub rentals: usize,
    pub percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarOccupancy {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub image: String,
    pub occupancy_rate: i64,
    pub booked_days: i64,
    pub total_days: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub monthly_earnings: BTreeMap<String, i64>,
    pub yearly_earnings: BTreeMap<String, i64>,
    pub revenue_per_car: Vec<CarRevenue>,
    pub most_rented_cars: Vec<CarRentals>,
    pub occupancy_rates: Vec<CarOccupancy>,
    pub total_revenue: i64,
    pub total_bookings: usize,
}

#[derive(Default)]
struct CarTotals {
    revenue: i64,
    bookings: usize,
    booked_days: i64,
}

fn percent(part: f64, whole: f64) -> i64 {
    if whole <= 0.0 {
        return 0;
    }
    (part / whole * 100.0).round() as i64
}

/// Aggregate revenue bookings created inside `range` on the cars matching
/// `category`.
pub fn analytics(
    cars: &[Car],
    bookings: &[Booking],
    range: DateRange,
    category: Option<&str>,
    now: DateTime<Utc>,
) -> Analytics {
    let selected: Vec<&Car> = cars
        .iter()
        .filter(|car| category.is_none_or(|c| car.category.eq_ignore_ascii_case(c)))
        .collect();

    let mut totals: HashMap<Uuid, CarTotals> =
        selected.iter().map(|c| (c.id, CarTotals::default())).collect();

    let mut monthly_earnings = BTreeMap::new();
    let mut yearly_earnings = BTreeMap::new();
    let mut total_revenue = 0;
    let mut total_bookings = 0;

    for booking in bookings {
        if !booking.status.counts_as_revenue() || !range.contains(booking.created_at, now) {
            continue;
        }
        let Some(car) = totals.get_mut(&booking.car) else {
            continue;
        };

        car.revenue = car.revenue.saturating_add(booking.price);
        car.bookings += 1;
        car.booked_days = car.booked_days.saturating_add(booking.rental_days());
        total_revenue = i64::saturating_add(total_revenue, booking.price);
        total_bookings += 1;

        let created = booking.created_at;
        let month = monthly_earnings
            .entry(format!("{}-{:02}", created.year(), created.month()))
            .or_insert(0i64);
        *month = month.saturating_add(booking.price);
        let year = yearly_earnings.entry(created.year().to_string()).or_insert(0i64);
        *year = year.saturating_add(booking.price);
    }

    let none = CarTotals::default();
    let totals_for = |id: &Uuid| totals.get(id).unwrap_or(&none);

    let revenue_per_car = selected
        .iter()
        .map(|car| {
            let t = totals_for(&car.id);
            let average_rate = if t.bookings == 0 {
                car.price_per_day
            } else {
                (t.revenue as f64 / t.bookings as f64).round() as i64
            };
            CarRevenue {
                id: car.id,
                brand: car.brand.clone(),
                model: car.model.clone(),
                image: car.image.clone(),
                year: car.year,
                category: car.category.clone(),
                is_available: car.is_available,
                total_revenue: t.revenue,
                total_bookings: t.bookings,
                average_rate,
            }
        })
        .collect();

    let mut most_rented_cars: Vec<CarRentals> = selected
        .iter()
        .filter_map(|car| {
            let t = totals_for(&car.id);
            (t.bookings > 0).then(|| CarRentals {
                id: car.id,
                brand: car.brand.clone(),
                model: car.model.clone(),
                rentals: t.bookings,
                percentage: percent(t.bookings as f64, total_bookings as f64),
            })
        })
        .collect();
    most_rented_cars.sort_by(|a, b| b.rentals.cmp(&a.rentals));
    most_rented_cars.truncate(MOST_RENTED);

    let period = range.period_days();
    let mut occupancy_rates: Vec<CarOccupancy> = selected
        .iter()
        .map(|car| {
            let t = totals_for(&car.id);
            CarOccupancy {
                id: car.id,
                brand: car.brand.clone(),
                model: car.model.clone(),
                image: car.image.clone(),
                occupancy_rate: percent(t.booked_days as f64, period as f64).min(100),
                booked_days: t.booked_days,
                total_days: period,
            }
        })
        .collect();
    occupancy_rates.sort_by(|a, b| b.occupancy_rate.cmp(&a.occupancy_rate));

    Analytics {
        monthly_earnings,
        yearly_earnings,
        revenue_per_car,
        most_rented_cars,
        occupancy_rates,
        total_revenue,
        total_bookings,
    }
}
