//! Availability search, booking creation, lifecycle, and cancellation.

use axum::http::StatusCode;
use carrental_services::{
    bookings::BookingStatus,
    database::{MockSqlStorage, SqlStorage},
    users::storage::{MockUserStorage, Role, StoredUser},
};
use serde_json::{Value, json};
use uuid::Uuid;

mod common;

use common::{TestApp, account, booking_with_status, car_of, date, token_for};

struct Fixture {
    app: TestApp,
    owner: StoredUser,
    renter: StoredUser,
    car_id: Uuid,
}

async fn fixture() -> Fixture {
    let owner = account("Olive", "olive@example.com", Role::Owner).await;
    let renter = account("Ron", "ron@example.com", Role::User).await;
    let car = car_of(&owner);
    let car_id = car.id;

    let app = TestApp::with_storage(
        MockSqlStorage::new().with_car(car),
        MockUserStorage::new()
            .with_user(owner.clone())
            .with_user(renter.clone()),
    )
    .await;

    Fixture {
        app,
        owner,
        renter,
        car_id,
    }
}

async fn book(f: &Fixture, pickup: &str, ret: &str) -> axum_test::TestResponse {
    f.app
        .server
        .post("/api/bookings/create")
        .authorization_bearer(token_for(&f.renter))
        .json(&json!({ "car": f.car_id, "pickupDate": pickup, "returnDate": ret }))
        .await
}

#[tokio::test]
async fn create_booking_prices_inclusive_days_and_notifies_owner() {
    let f = fixture().await;

    let response = book(&f, "2030-06-01", "2030-06-03").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Booking Created");
    assert_eq!(body["booking"]["status"], "pending");
    assert_eq!(body["booking"]["price"], 180);

    let notifications = f
        .app
        .sql
        .notifications_list_for_user(f.owner.id)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn overlapping_booking_conflicts() {
    let f = fixture().await;

    book(&f, "2030-06-01", "2030-06-05").await.assert_status_ok();

    let overlapping = book(&f, "2030-06-05", "2030-06-07").await;
    overlapping.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        overlapping.json::<Value>()["message"],
        "Car is already booked for the selected dates"
    );

    book(&f, "2030-06-06", "2030-06-07").await.assert_status_ok();
    assert_eq!(f.app.sql.booking_count(), 2);
}

#[tokio::test]
async fn cancelled_booking_frees_dates() {
    let f = fixture().await;
    let cancelled = booking_with_status(
        &f.app.sql.cars_get(f.car_id).await.unwrap().unwrap(),
        &f.renter,
        date(2030, 6, 1),
        date(2030, 6, 5),
        BookingStatus::Cancelled,
    );
    let _ = f.app.sql.clone().with_booking(cancelled);

    book(&f, "2030-06-02", "2030-06-03").await.assert_status_ok();
}

#[tokio::test]
async fn create_booking_rejections() {
    let f = fixture().await;

    let own = f
        .app
        .server
        .post("/api/bookings/create")
        .authorization_bearer(token_for(&f.owner))
        .json(&json!({ "car": f.car_id, "pickupDate": "2030-06-01", "returnDate": "2030-06-02" }))
        .await;
    own.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(own.json::<Value>()["message"], "You cannot book your own car");

    let inverted = book(&f, "2030-06-03", "2030-06-01").await;
    inverted.assert_status(StatusCode::BAD_REQUEST);

    let missing = f
        .app
        .server
        .post("/api/bookings/create")
        .authorization_bearer(token_for(&f.renter))
        .json(&json!({ "car": Uuid::new_v4(), "pickupDate": "2030-06-01", "returnDate": "2030-06-02" }))
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);

    let malformed = f
        .app
        .server
        .post("/api/bookings/create")
        .authorization_bearer(token_for(&f.renter))
        .json(&json!({ "car": f.car_id, "pickupDate": "June 1st" }))
        .await;
    malformed.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(malformed.json::<Value>()["success"], false);

    assert_eq!(f.app.sql.booking_count(), 0);
}

#[tokio::test]
async fn check_availability_excludes_booked_cars() {
    let f = fixture().await;

    let search = |pickup: &'static str, ret: &'static str| {
        f.app
            .server
            .post("/api/bookings/check-availability")
            .json(&json!({ "location": "denver", "pickupDate": pickup, "returnDate": ret }))
    };

    let before = search("2030-06-01", "2030-06-03").await;
    before.assert_status_ok();
    assert_eq!(before.json::<Value>()["availableCars"].as_array().unwrap().len(), 1);

    book(&f, "2030-06-02", "2030-06-04").await.assert_status_ok();

    let after = search("2030-06-01", "2030-06-03").await;
    assert!(after.json::<Value>()["availableCars"].as_array().unwrap().is_empty());

    let later = search("2030-06-05", "2030-06-06").await;
    assert_eq!(later.json::<Value>()["availableCars"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn owner_moves_booking_through_lifecycle() {
    let f = fixture().await;
    let booking_id = book(&f, "2030-06-01", "2030-06-02").await.json::<Value>()["booking"]["id"]
        .as_str()
        .unwrap()
        .to_owned();

    let change = |status: &'static str, who: &StoredUser| {
        f.app
            .server
            .post("/api/bookings/change-status")
            .authorization_bearer(token_for(who))
            .json(&json!({ "bookingId": booking_id, "status": status }))
    };

    change("booked", &f.renter)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    change("completed", &f.owner)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    change("teleported", &f.owner)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    for status in ["booked", "on_rent", "completed"] {
        let response = change(status, &f.owner).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["booking"]["status"], status);
    }

    // renter was notified of each transition
    let renter_notes = f
        .app
        .sql
        .notifications_list_for_user(f.renter.id)
        .await
        .unwrap();
    assert_eq!(renter_notes.len(), 3);
}

#[tokio::test]
async fn renter_cancels_with_reason() {
    let f = fixture().await;
    let booking_id = book(&f, "2030-06-01", "2030-06-02").await.json::<Value>()["booking"]["id"]
        .as_str()
        .unwrap()
        .to_owned();

    let stranger = f
        .app
        .server
        .post("/api/bookings/cancel")
        .authorization_bearer(token_for(&f.owner))
        .json(&json!({ "bookingId": booking_id }))
        .await;
    stranger.assert_status(StatusCode::FORBIDDEN);

    let response = f
        .app
        .server
        .post("/api/bookings/cancel")
        .authorization_bearer(token_for(&f.renter))
        .json(&json!({ "bookingId": booking_id, "reason": "  Plans changed " }))
        .await;
    response.assert_status_ok();
    let booking = response.json::<Value>()["booking"].clone();
    assert_eq!(booking["status"], "cancelled");
    assert_eq!(booking["cancellationReason"], "Plans changed");

    let again = f
        .app
        .server
        .post("/api/bookings/cancel")
        .authorization_bearer(token_for(&f.renter))
        .json(&json!({ "bookingId": booking_id }))
        .await;
    again.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_lists_embed_car() {
    let f = fixture().await;
    book(&f, "2030-06-01", "2030-06-02").await.assert_status_ok();

    let mine = f
        .app
        .server
        .get("/api/bookings/user")
        .authorization_bearer(token_for(&f.renter))
        .await;
    mine.assert_status_ok();
    let bookings = mine.json::<Value>()["bookings"].clone();
    assert_eq!(bookings.as_array().unwrap().len(), 1);
    assert_eq!(bookings[0]["car"]["id"], f.car_id.to_string());

    let owned = f
        .app
        .server
        .get("/api/bookings/owner")
        .authorization_bearer(token_for(&f.owner))
        .await;
    owned.assert_status_ok();
    assert_eq!(owned.json::<Value>()["bookings"].as_array().unwrap().len(), 1);

    f.app
        .server
        .get("/api/bookings/owner")
        .authorization_bearer(token_for(&f.renter))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn booked_dates_for_car() {
    let f = fixture().await;
    book(&f, "2030-07-10", "2030-07-12").await.assert_status_ok();
    book(&f, "2030-06-01", "2030-06-02").await.assert_status_ok();

    let response = f
        .app
        .server
        .get(&format!("/api/bookings/car/{}/dates", f.car_id))
        .await;
    response.assert_status_ok();
    let dates = response.json::<Value>()["bookedDates"].clone();
    assert_eq!(dates[0]["pickupDate"], "2030-06-01");
    assert_eq!(dates[1]["returnDate"], "2030-07-12");

    f.app
        .server
        .get(&format!("/api/bookings/car/{}/dates", Uuid::new_v4()))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    f.app
        .server
        .get("/api/bookings/car/not-a-uuid/dates")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn runaway_price_is_rejected() {
    let owner = account("Olive", "olive@example.com", Role::Owner).await;
    let renter = account("Ron", "ron@example.com", Role::User).await;
    let mut car = car_of(&owner);
    car.price_per_day = i64::MAX / 2;
    let car_id = car.id;

    let app = TestApp::with_storage(
        MockSqlStorage::new().with_car(car),
        MockUserStorage::new()
            .with_user(owner.clone())
            .with_user(renter.clone()),
    )
    .await;
    let f = Fixture {
        app,
        owner,
        renter,
        car_id,
    };

    let response = book(&f, "2030-06-01", "2030-06-03").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Rental price is out of range"
    );
    assert_eq!(f.app.sql.booking_count(), 0);
    assert_eq!(f.app.sql.notification_count(), 0);
}
