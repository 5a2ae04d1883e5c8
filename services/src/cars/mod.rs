//! Car listings: the stored model, owner-submitted drafts, and search filters.

pub mod routes;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State bucket used by the search filter for cars listed without an address.
pub const UNKNOWN_STATE: &str = "Other";

const MIN_YEAR: i32 = 1900;
const MAX_SEATS: i32 = 50;
pub const MAX_PRICE_PER_DAY: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub landmark: String,
    #[serde(default)]
    pub zip_code: String,
}

/// A car listing.
///
/// `owner` becomes `None` once the owner deletes the listing; the row stays
/// so past bookings and reviews keep pointing at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: Uuid,
    pub owner: Option<Uuid>,
    pub brand: String,
    pub model: String,
    pub image: String,
    pub year: i32,
    pub category: String,
    pub seating_capacity: i32,
    pub fuel_type: String,
    pub transmission: String,
    pub price_per_day: i64,
    pub location: String,
    pub address: Option<CarAddress>,
    pub description: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

impl Car {
    pub fn new(owner: Uuid, image: impl Into<String>, spec: CarSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: Some(owner),
            brand: spec.brand,
            model: spec.model,
            image: image.into(),
            year: spec.year,
            category: spec.category,
            seating_capacity: spec.seating_capacity,
            fuel_type: spec.fuel_type,
            transmission: spec.transmission,
            price_per_day: spec.price_per_day,
            location: spec.location,
            address: spec.address,
            description: spec.description,
            is_available: true,
            created_at: Utc::now(),
        }
    }

    /// Overwrite the descriptive fields with a validated draft. Identity,
    /// owner, image, and availability are left alone.
    pub fn apply(&mut self, spec: CarSpec) {
        self.brand = spec.brand;
        self.model = spec.model;
        self.year = spec.year;
        self.category = spec.category;
        self.seating_capacity = spec.seating_capacity;
        self.fuel_type = spec.fuel_type;
        self.transmission = spec.transmission;
        self.price_per_day = spec.price_per_day;
        self.location = spec.location;
        self.address = spec.address;
        self.description = spec.description;
    }

    pub fn is_owned_by(&self, user: Uuid) -> bool {
        self.owner == Some(user)
    }

    /// A car can be booked only while it is listed and flagged available.
    pub fn is_bookable(&self) -> bool {
        self.owner.is_some() && self.is_available
    }

    pub fn state(&self) -> &str {
        self.address
            .as_ref()
            .map(|a| a.state.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_STATE)
    }

    /// Case-insensitive match on either the listing location or the address city.
    pub fn is_located_in(&self, location: &str) -> bool {
        let location = location.trim();
        if location.is_empty() {
            return false;
        }
        self.location.eq_ignore_ascii_case(location)
            || self
                .address
                .as_ref()
                .is_some_and(|a| a.city.eq_ignore_ascii_case(location))
    }

    pub fn summary(&self) -> CarSummary {
        CarSummary {
            id: self.id,
            brand: self.brand.clone(),
            model: self.model.clone(),
            image: self.image.clone(),
            year: self.year,
            category: self.category.clone(),
            location: self.location.clone(),
            price_per_day: self.price_per_day,
        }
    }
}

/// Compact car view embedded in booking listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarSummary {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub image: String,
    pub year: i32,
    pub category: String,
    pub location: String,
    pub price_per_day: i64,
}

/// The car form as submitted by an owner. Every field is optional on the
/// wire so that missing ones can be reported together.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarDraft {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub seating_capacity: Option<i32>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub price_per_day: Option<i64>,
    pub location: Option<String>,
    pub address: Option<CarAddress>,
    pub description: Option<String>,
}

/// A validated car draft.
#[derive(Debug, Clone, PartialEq)]
pub struct CarSpec {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub category: String,
    pub seating_capacity: i32,
    pub fuel_type: String,
    pub transmission: String,
    pub price_per_day: i64,
    pub location: String,
    pub address: Option<CarAddress>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CarDraftError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Address state is required")]
    MissingState,

    #[error("Year must be between 1900 and {0}")]
    InvalidYear(i32),

    #[error("Price per day must be between 1 and {MAX_PRICE_PER_DAY}")]
    InvalidPrice,

    #[error("Seating capacity must be between 1 and 50")]
    InvalidSeatingCapacity,
}

fn required_text(value: Option<String>, name: &'static str, missing: &mut Vec<&'static str>) -> String {
    match value.map(|v| v.trim().to_owned()) {
        Some(v) if !v.is_empty() => v,
        _ => {
            missing.push(name);
            String::new()
        }
    }
}

fn required<T: Default>(value: Option<T>, name: &'static str, missing: &mut Vec<&'static str>) -> T {
    value.unwrap_or_else(|| {
        missing.push(name);
        T::default()
    })
}

impl CarDraft {
    pub fn validate(self) -> Result<CarSpec, CarDraftError> {
        self.validate_at(Utc::now().year())
    }

    fn validate_at(self, current_year: i32) -> Result<CarSpec, CarDraftError> {
        let mut missing = Vec::new();

        let brand = required_text(self.brand, "brand", &mut missing);
        let model = required_text(self.model, "model", &mut missing);
        let year = required(self.year, "year", &mut missing);
        let price_per_day = required(self.price_per_day, "pricePerDay", &mut missing);
        let category = required_text(self.category, "category", &mut missing);
        let transmission = required_text(self.transmission, "transmission", &mut missing);
        let fuel_type = required_text(self.fuel_type, "fuelType", &mut missing);
        let seating_capacity = required(self.seating_capacity, "seatingCapacity", &mut missing);
        let location = required_text(self.location, "location", &mut missing);
        let description = required_text(self.description, "description", &mut missing);

        if !missing.is_empty() {
            return Err(CarDraftError::MissingFields(missing));
        }

        if let Some(address) = &self.address
            && address.state.trim().is_empty()
        {
            return Err(CarDraftError::MissingState);
        }

        let max_year = current_year + 1;
        if !(MIN_YEAR..=max_year).contains(&year) {
            return Err(CarDraftError::InvalidYear(max_year));
        }
        if !(1..=MAX_PRICE_PER_DAY).contains(&price_per_day) {
            return Err(CarDraftError::InvalidPrice);
        }
        if !(1..=MAX_SEATS).contains(&seating_capacity) {
            return Err(CarDraftError::InvalidSeatingCapacity);
        }

        Ok(CarSpec {
            brand,
            model,
            year,
            category,
            seating_capacity,
            fuel_type,
            transmission,
            price_per_day,
            location,
            address: self.address,
            description,
        })
    }
}

/// Query parameters accepted by the public car search.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarFilter {
    pub search: Option<String>,
    pub state: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub seating_capacity: Option<i32>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn same(expected: Option<&str>, actual: &str) -> bool {
    expected.is_none_or(|e| e.eq_ignore_ascii_case(actual))
}

impl CarFilter {
    pub fn matches(&self, car: &Car) -> bool {
        if let Some(term) = non_empty(&self.search) {
            let term = term.to_lowercase();
            let mut haystack = vec![
                car.brand.as_str(),
                car.model.as_str(),
                car.category.as_str(),
                car.transmission.as_str(),
                car.location.as_str(),
            ];
            if let Some(address) = &car.address {
                haystack.extend([
                    address.city.as_str(),
                    address.state.as_str(),
                    address.street.as_str(),
                ]);
            }
            if !haystack
                .iter()
                .any(|field| field.to_lowercase().contains(&term))
            {
                return false;
            }
        }

        if let Some(state) = non_empty(&self.state)
            && car.state() != state
        {
            return false;
        }

        same(non_empty(&self.brand), &car.brand)
            && same(non_empty(&self.category), &car.category)
            && same(non_empty(&self.fuel_type), &car.fuel_type)
            && same(non_empty(&self.transmission), &car.transmission)
            && self
                .seating_capacity
                .is_none_or(|seats| car.seating_capacity == seats)
            && self.min_price.is_none_or(|min| car.price_per_day >= min)
            && self.max_price.is_none_or(|max| car.price_per_day <= max)
    }
}
