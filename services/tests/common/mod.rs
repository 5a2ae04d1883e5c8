//! Shared test utilities for integration tests.
//!
//! Builds the full router over the in-memory stores and exposes those stores
//! so tests can seed fixtures and inspect side effects.

#![allow(dead_code)]

use axum_test::TestServer;
use carrental_services::{
    bookings::{Booking, BookingStatus},
    cars::{Car, CarAddress, CarSpec},
    config::Config,
    database::MockSqlStorage,
    images::{ImageStore, MockFileStorage},
    otp::mailer::Mailer,
    routes,
    users::{
        password::hash_password,
        storage::{MockUserStorage, Role, StoredUser},
        token::generate_session_token,
    },
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

/// JWT secret used by `Config::new_for_test`.
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-key-for-local-development";

pub const TEST_PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub server: TestServer,
    pub sql: MockSqlStorage,
    pub users: MockUserStorage,
    pub files: MockFileStorage,
    pub mailer: Mailer,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_storage(MockSqlStorage::new(), MockUserStorage::new()).await
    }

    pub async fn with_storage(sql: MockSqlStorage, users: MockUserStorage) -> Self {
        let files = MockFileStorage::new();
        let mailer = Mailer::new_for_test();
        let app = routes(
            sql.clone(),
            users.clone(),
            ImageStore::new_for_test(files.clone()),
            mailer.clone(),
            Config::new_for_test(),
        )
        .await;

        Self {
            server: TestServer::new(app).unwrap(),
            sql,
            users,
            files,
            mailer,
        }
    }

    /// The most recent code mailed to `email`.
    pub fn last_code_for(&self, email: &str) -> String {
        let mail = self
            .mailer
            .outbox()
            .into_iter()
            .rev()
            .find(|m| m.to == email)
            .expect("no mail sent");
        mail.text
            .split(|c: char| !c.is_ascii_digit())
            .find(|chunk| chunk.len() == 6)
            .expect("no code in mail")
            .to_owned()
    }
}

/// An account whose password is [`TEST_PASSWORD`].
pub async fn account(name: &str, email: &str, role: Role) -> StoredUser {
    let now = Utc::now();
    StoredUser {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        email: email.to_owned(),
        password_hash: hash_password(TEST_PASSWORD).await.unwrap(),
        role,
        image: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn token_for(user: &StoredUser) -> String {
    generate_session_token(user.id, TEST_JWT_SECRET).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn car_spec() -> CarSpec {
    CarSpec {
        brand: "Toyota".to_owned(),
        model: "Corolla".to_owned(),
        year: 2021,
        category: "Sedan".to_owned(),
        seating_capacity: 5,
        fuel_type: "Petrol".to_owned(),
        transmission: "Automatic".to_owned(),
        price_per_day: 60,
        location: "Denver".to_owned(),
        address: Some(CarAddress {
            street: "12 Main St".to_owned(),
            city: "Denver".to_owned(),
            state: "Colorado".to_owned(),
            landmark: String::new(),
            zip_code: "80202".to_owned(),
        }),
        description: "Clean and reliable".to_owned(),
    }
}

pub fn car_of(owner: &StoredUser) -> Car {
    Car::new(owner.id, "https://img.test/cars/seed.jpg", car_spec())
}

pub fn booking_with_status(
    car: &Car,
    renter: &StoredUser,
    pickup: NaiveDate,
    ret: NaiveDate,
    status: BookingStatus,
) -> Booking {
    let owner = car.owner.expect("seeded car has an owner");
    let mut booking = Booking::new(car.id, renter.id, owner, pickup, ret, 60);
    booking.status = status;
    booking
}

/// JPEG magic bytes followed by padding; enough for content-type checks.
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(len.max(4), 0);
    bytes
}
