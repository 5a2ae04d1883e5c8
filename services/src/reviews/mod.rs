//! Ratings renters leave on completed bookings, one per booking.

pub mod routes;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub car: Uuid,
    pub user: Uuid,
    pub booking: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(car: Uuid, user: Uuid, booking: Uuid, rating: i32, comment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            car,
            user,
            booking,
            rating,
            comment: comment.into(),
            created_at: Utc::now(),
        }
    }
}

pub fn is_valid_rating(rating: i32) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&rating)
}

/// Mean rating rounded to one decimal place, `0.0` when there are no reviews.
pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    let mean = total as f64 / reviews.len() as f64;
    (mean * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: i32) -> Review {
        Review::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), rating, "")
    }

    #[test]
    fn average_of_nothing_is_zero() {
        assert_eq!(average_rating(&[]), 0.0);
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        let reviews = [review(5), review(4), review(4)];
        assert_eq!(average_rating(&reviews), 4.3);

        let reviews = [review(5), review(4)];
        assert_eq!(average_rating(&reviews), 4.5);
    }

    #[test]
    fn rating_bounds() {
        assert!(!is_valid_rating(0));
        assert!(is_valid_rating(1));
        assert!(is_valid_rating(5));
        assert!(!is_valid_rating(6));
    }
}
