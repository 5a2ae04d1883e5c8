//! In-memory `SqlStorage` for tests.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::{BOOKING_CONFLICT, REVIEW_CONFLICT, SqlStorage, SqlStorageError};
use crate::bookings::Booking;
use crate::cars::Car;
use crate::notifications::Notification;
use crate::otp::OtpRecord;
use crate::reviews::Review;

#[derive(Default)]
struct Tables {
    cars: HashMap<Uuid, Car>,
    bookings: HashMap<Uuid, Booking>,
    reviews: HashMap<Uuid, Review>,
    notifications: HashMap<Uuid, Notification>,
    otps: HashMap<Uuid, OtpRecord>,
}

/// Thread-safe in-memory storage. Overlap and uniqueness rules are checked
/// under the write lock, mirroring the database constraints.
#[derive(Clone)]
pub struct MockSqlStorage {
    tables: Arc<RwLock<Tables>>,
    connected: Arc<AtomicBool>,
    failing: Arc<RwLock<HashSet<&'static str>>>,
}

impl Default for MockSqlStorage {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            connected: Arc::new(AtomicBool::new(true)),
            failing: Arc::default(),
        }
    }
}

impl MockSqlStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the database going away; every call then fails.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make one write fail from now on, named after its trait method
    /// (`"cars_insert"`, `"bookings_delete_for_account"`, ...).
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.write().expect("lock poisoned").insert(operation);
    }

    fn fail_point(&self, operation: &'static str) -> Result<(), SqlStorageError> {
        if self.failing.read().expect("lock poisoned").contains(operation) {
            return Err(SqlStorageError::Storage(format!("{operation} failed")));
        }
        Ok(())
    }

    /// Seed a car directly (test fixtures).
    pub fn with_car(self, car: Car) -> Self {
        self.tables
            .write()
            .expect("lock poisoned")
            .cars
            .insert(car.id, car);
        self
    }

    /// Seed a booking directly, bypassing the overlap check.
    pub fn with_booking(self, booking: Booking) -> Self {
        self.tables
            .write()
            .expect("lock poisoned")
            .bookings
            .insert(booking.id, booking);
        self
    }

    pub fn car_count(&self) -> usize {
        self.tables.read().expect("lock poisoned").cars.len()
    }

    pub fn booking_count(&self) -> usize {
        self.tables.read().expect("lock poisoned").bookings.len()
    }

    pub fn review_count(&self) -> usize {
        self.tables.read().expect("lock poisoned").reviews.len()
    }

    pub fn notification_count(&self) -> usize {
        self.tables.read().expect("lock poisoned").notifications.len()
    }

    fn ensure_connected(&self) -> Result<(), SqlStorageError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SqlStorageError::Storage("mock storage disconnected".to_owned()))
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, SqlStorageError> {
        self.ensure_connected()?;
        let tables = self.tables.read().expect("lock poisoned");
        Ok(f(&tables))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, SqlStorageError>,
    ) -> Result<T, SqlStorageError> {
        self.ensure_connected()?;
        let mut tables = self.tables.write().expect("lock poisoned");
        f(&mut tables)
    }
}

fn newest_first<T>(mut items: Vec<T>, created: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created(item)));
    items
}

impl SqlStorage for MockSqlStorage {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn cars_insert(&self, car: Car) -> Result<Car, SqlStorageError> {
        self.fail_point("cars_insert")?;
        self.write(|t| {
            t.cars.insert(car.id, car.clone());
            Ok(car)
        })
    }

    async fn cars_get(&self, id: Uuid) -> Result<Option<Car>, SqlStorageError> {
        self.read(|t| t.cars.get(&id).cloned())
    }

    async fn cars_get_many(&self, ids: &[Uuid]) -> Result<Vec<Car>, SqlStorageError> {
        self.read(|t| ids.iter().filter_map(|id| t.cars.get(id).cloned()).collect())
    }

    async fn cars_list_available(&self) -> Result<Vec<Car>, SqlStorageError> {
        let cars: Vec<Car> = self.read(|t| t.cars.values().filter(|c| c.is_bookable()).cloned().collect())?;
        Ok(newest_first(cars, |c: &Car| c.created_at))
    }

    async fn cars_list_by_owner(&self, owner: Uuid) -> Result<Vec<Car>, SqlStorageError> {
        let cars: Vec<Car> = self.read(|t| {
            t.cars
                .values()
                .filter(|c| c.is_owned_by(owner))
                .cloned()
                .collect()
        })?;
        Ok(newest_first(cars, |c: &Car| c.created_at))
    }

    async fn cars_update(&self, car: Car) -> Result<Car, SqlStorageError> {
        self.fail_point("cars_update")?;
        self.write(|t| match t.cars.get_mut(&car.id) {
            Some(existing) => {
                *existing = car.clone();
                Ok(car)
            }
            None => Err(SqlStorageError::NotFound("Car not found".to_owned())),
        })
    }

    async fn cars_delete_by_owner(&self, owner: Uuid) -> Result<u64, SqlStorageError> {
        self.fail_point("cars_delete_by_owner")?;
        self.write(|t| {
            let before = t.cars.len();
            t.cars.retain(|_, c| !c.is_owned_by(owner));
            Ok((before - t.cars.len()) as u64)
        })
    }

    async fn bookings_insert(&self, booking: Booking) -> Result<Booking, SqlStorageError> {
        self.write(|t| {
            let clash = t.bookings.values().any(|b| {
                b.car == booking.car
                    && b.blocks_dates()
                    && b.overlaps(booking.pickup_date, booking.return_date)
            });
            if clash && booking.blocks_dates() {
                return Err(SqlStorageError::Conflict(BOOKING_CONFLICT.to_owned()));
            }
            t.bookings.insert(booking.id, booking.clone());
            Ok(booking)
        })
    }

    async fn bookings_get(&self, id: Uuid) -> Result<Option<Booking>, SqlStorageError> {
        self.read(|t| t.bookings.get(&id).cloned())
    }

    async fn bookings_get_many(&self, ids: &[Uuid]) -> Result<Vec<Booking>, SqlStorageError> {
        self.read(|t| ids.iter().filter_map(|id| t.bookings.get(id).cloned()).collect())
    }

    async fn bookings_list_for_user(&self, user: Uuid) -> Result<Vec<Booking>, SqlStorageError> {
        let bookings: Vec<Booking> = self.read(|t| {
            t.bookings
                .values()
                .filter(|b| b.user == user)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(bookings, |b: &Booking| b.created_at))
    }

    async fn bookings_list_for_owner(&self, owner: Uuid) -> Result<Vec<Booking>, SqlStorageError> {
        let bookings: Vec<Booking> = self.read(|t| {
            t.bookings
                .values()
                .filter(|b| b.owner == owner)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(bookings, |b: &Booking| b.created_at))
    }

    async fn bookings_list_active_for_car(
        &self,
        car: Uuid,
    ) -> Result<Vec<Booking>, SqlStorageError> {
        let mut bookings: Vec<Booking> = self.read(|t| {
            t.bookings
                .values()
                .filter(|b| b.car == car && b.blocks_dates())
                .cloned()
                .collect()
        })?;
        bookings.sort_by_key(|b| b.pickup_date);
        Ok(bookings)
    }

    async fn bookings_list_overlapping(
        &self,
        pickup: NaiveDate,
        ret: NaiveDate,
    ) -> Result<Vec<Booking>, SqlStorageError> {
        self.read(|t| {
            t.bookings
                .values()
                .filter(|b| b.blocks_dates() && b.overlaps(pickup, ret))
                .cloned()
                .collect()
        })
    }

    async fn bookings_update(&self, booking: Booking) -> Result<Booking, SqlStorageError> {
        self.write(|t| match t.bookings.get_mut(&booking.id) {
            Some(existing) => {
                existing.status = booking.status;
                existing.cancellation_reason = booking.cancellation_reason.clone();
                Ok(existing.clone())
            }
            None => Err(SqlStorageError::NotFound("Booking not found".to_owned())),
        })
    }

    async fn bookings_count_open_for_account(&self, account: Uuid) -> Result<u64, SqlStorageError> {
        self.read(|t| {
            t.bookings
                .values()
                .filter(|b| b.involves(account) && !b.status.is_terminal())
                .count() as u64
        })
    }

    async fn bookings_delete_for_account(&self, account: Uuid) -> Result<u64, SqlStorageError> {
        self.fail_point("bookings_delete_for_account")?;
        self.write(|t| {
            let before = t.bookings.len();
            t.bookings.retain(|_, b| !b.involves(account));
            Ok((before - t.bookings.len()) as u64)
        })
    }

    async fn reviews_insert(&self, review: Review) -> Result<Review, SqlStorageError> {
        self.write(|t| {
            if t.reviews.values().any(|r| r.booking == review.booking) {
                return Err(SqlStorageError::Conflict(REVIEW_CONFLICT.to_owned()));
            }
            t.reviews.insert(review.id, review.clone());
            Ok(review)
        })
    }

    async fn reviews_list_for_car(&self, car: Uuid) -> Result<Vec<Review>, SqlStorageError> {
        let reviews: Vec<Review> = self.read(|t| {
            t.reviews
                .values()
                .filter(|r| r.car == car)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(reviews, |r: &Review| r.created_at))
    }

    async fn reviews_list_for_user(&self, user: Uuid) -> Result<Vec<Review>, SqlStorageError> {
        let reviews: Vec<Review> = self.read(|t| {
            t.reviews
                .values()
                .filter(|r| r.user == user)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(reviews, |r: &Review| r.created_at))
    }

    async fn reviews_delete_for_account(
        &self,
        account: Uuid,
        cars: &[Uuid],
    ) -> Result<u64, SqlStorageError> {
        self.fail_point("reviews_delete_for_account")?;
        self.write(|t| {
            let bookings = &t.bookings;
            let touches_account = |r: &Review| {
                r.user == account
                    || cars.contains(&r.car)
                    || bookings.get(&r.booking).is_some_and(|b| b.involves(account))
            };
            let before = t.reviews.len();
            t.reviews.retain(|_, r| !touches_account(r));
            Ok((before - t.reviews.len()) as u64)
        })
    }

    async fn notifications_insert(
        &self,
        notification: Notification,
    ) -> Result<Notification, SqlStorageError> {
        self.write(|t| {
            t.notifications
                .insert(notification.id, notification.clone());
            Ok(notification)
        })
    }

    async fn notifications_list_for_user(
        &self,
        user: Uuid,
    ) -> Result<Vec<Notification>, SqlStorageError> {
        let notifications: Vec<Notification> = self.read(|t| {
            t.notifications
                .values()
                .filter(|n| n.user == user)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(notifications, |n: &Notification| n.created_at))
    }

    async fn notifications_mark_read(&self, user: Uuid, id: Uuid) -> Result<bool, SqlStorageError> {
        self.write(|t| match t.notifications.get_mut(&id) {
            Some(n) if n.user == user => {
                n.read = true;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    async fn notifications_mark_all_read(&self, user: Uuid) -> Result<u64, SqlStorageError> {
        self.write(|t| {
            let mut changed = 0;
            for n in t.notifications.values_mut() {
                if n.user == user && !n.read {
                    n.read = true;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    async fn notifications_delete_for_user(&self, user: Uuid) -> Result<u64, SqlStorageError> {
        self.fail_point("notifications_delete_for_user")?;
        self.write(|t| {
            let before = t.notifications.len();
            t.notifications.retain(|_, n| n.user != user);
            Ok((before - t.notifications.len()) as u64)
        })
    }

    async fn otp_replace(&self, record: OtpRecord) -> Result<OtpRecord, SqlStorageError> {
        self.write(|t| {
            t.otps.retain(|_, r| r.email != record.email);
            t.otps.insert(record.id, record.clone());
            Ok(record)
        })
    }

    async fn otp_get(&self, id: Uuid) -> Result<Option<OtpRecord>, SqlStorageError> {
        self.read(|t| t.otps.get(&id).cloned())
    }

    async fn otp_latest_for_email(&self, email: &str) -> Result<Option<OtpRecord>, SqlStorageError> {
        self.read(|t| {
            t.otps
                .values()
                .filter(|r| r.email == email)
                .max_by_key(|r| r.created_at)
                .cloned()
        })
    }

    async fn otp_record_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<i32>, SqlStorageError> {
        self.write(|t| match t.otps.get_mut(&id) {
            Some(record) if record.attempts < max_attempts => {
                record.attempts += 1;
                Ok(Some(record.attempts))
            }
            _ => Ok(None),
        })
    }

    async fn otp_mark_verified(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<OtpRecord>, SqlStorageError> {
        self.write(|t| match t.otps.get_mut(&id) {
            Some(record) if record.attempts < max_attempts => {
                record.verified = true;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        })
    }

    async fn otp_delete(&self, id: Uuid) -> Result<bool, SqlStorageError> {
        self.write(|t| Ok(t.otps.remove(&id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::BookingStatus;
    use chrono::Utc;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn booking(car: Uuid, pickup: &str, ret: &str) -> Booking {
        Booking::new(car, Uuid::new_v4(), Uuid::new_v4(), date(pickup), date(ret), 100)
    }

    #[tokio::test]
    async fn overlapping_booking_is_a_conflict() {
        let storage = MockSqlStorage::new();
        let car = Uuid::new_v4();

        storage
            .bookings_insert(booking(car, "2025-05-01", "2025-05-03"))
            .await
            .unwrap();

        let err = storage
            .bookings_insert(booking(car, "2025-05-03", "2025-05-06"))
            .await
            .unwrap_err();
        assert!(matches!(err, SqlStorageError::Conflict(_)));

        // other cars and disjoint ranges are fine
        storage
            .bookings_insert(booking(Uuid::new_v4(), "2025-05-02", "2025-05-02"))
            .await
            .unwrap();
        storage
            .bookings_insert(booking(car, "2025-05-04", "2025-05-06"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_booking_releases_dates() {
        let storage = MockSqlStorage::new();
        let car = Uuid::new_v4();

        let mut first = storage
            .bookings_insert(booking(car, "2025-05-01", "2025-05-03"))
            .await
            .unwrap();
        first.status = BookingStatus::Cancelled;
        storage.bookings_update(first).await.unwrap();

        storage
            .bookings_insert(booking(car, "2025-05-02", "2025-05-04"))
            .await
            .unwrap();
        assert_eq!(storage.bookings_list_active_for_car(car).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_review_per_booking() {
        let storage = MockSqlStorage::new();
        let booking = Uuid::new_v4();
        let review = || Review::new(Uuid::new_v4(), Uuid::new_v4(), booking, 5, "great");

        storage.reviews_insert(review()).await.unwrap();
        let err = storage.reviews_insert(review()).await.unwrap_err();
        assert!(matches!(err, SqlStorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn otp_replace_drops_older_records() {
        let storage = MockSqlStorage::new();
        let now = Utc::now();

        let first = storage
            .otp_replace(OtpRecord::issue("a@example.com", now))
            .await
            .unwrap();
        let second = storage
            .otp_replace(OtpRecord::issue("a@example.com", now))
            .await
            .unwrap();

        assert!(storage.otp_get(first.id).await.unwrap().is_none());
        let latest = storage
            .otp_latest_for_email("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn otp_failures_stop_at_the_limit() {
        let storage = MockSqlStorage::new();
        let record = storage
            .otp_replace(OtpRecord::issue("a@example.com", Utc::now()))
            .await
            .unwrap();

        let guesses = guess_concurrently(&storage, record.id, 8).await;
        let mut counted: Vec<i32> = guesses.into_iter().flatten().collect();
        counted.sort_unstable();
        assert_eq!(counted, vec![1, 2, 3]);

        assert!(storage.otp_mark_verified(record.id, 3).await.unwrap().is_none());
        assert!(storage.otp_mark_verified(record.id, 4).await.unwrap().is_some());
    }

    /// Fire `n` failed guesses concurrently with a limit of 3.
    async fn guess_concurrently(storage: &MockSqlStorage, id: Uuid, n: usize) -> Vec<Option<i32>> {
        let tasks: Vec<_> = (0..n)
            .map(|_| {
                let storage = storage.clone();
                tokio::spawn(async move { storage.otp_record_failure(id, 3).await.unwrap() })
            })
            .collect();
        let mut out = Vec::with_capacity(n);
        for task in tasks {
            out.push(task.await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn notifications_mark_read_is_scoped_to_owner() {
        let storage = MockSqlStorage::new();
        let user = Uuid::new_v4();
        let n = storage
            .notifications_insert(Notification::new(
                user,
                crate::notifications::NotificationKind::BookingCreated,
                "hello",
                None,
            ))
            .await
            .unwrap();

        assert!(!storage.notifications_mark_read(Uuid::new_v4(), n.id).await.unwrap());
        assert!(storage.notifications_mark_read(user, n.id).await.unwrap());
        assert_eq!(storage.notifications_mark_all_read(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disconnected_storage_fails() {
        let storage = MockSqlStorage::new();
        storage.set_connected(false);
        assert!(!storage.is_connected().await);
        assert!(storage.cars_list_available().await.is_err());
    }
}
