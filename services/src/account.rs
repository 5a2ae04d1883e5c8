//! Account deletion.
//!
//! Removal runs in a fixed order so that nothing is left pointing at a row
//! that is already gone: notifications, reviews, bookings, cars, then the
//! account itself. Each step is its own statement; a failure stops the
//! sequence and earlier steps stay applied.

use uuid::Uuid;

use crate::api::{ApiError, ApiResult};
use crate::database::SqlStorage;
use crate::images::ImageKind;
use crate::state::AppState;
use crate::users::storage::{StoredUser, UserStorage};

pub const OPEN_BOOKINGS_MESSAGE: &str = "Cannot delete account with active bookings. Please complete or cancel all active bookings first.";

/// Row counts removed by [`delete_account`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub notifications: u64,
    pub reviews: u64,
    pub bookings: u64,
    pub cars: u64,
}

/// Fails with 409 before touching anything while the account is renter or
/// owner of a booking that is still pending, booked, or on rent.
pub async fn ensure_no_open_bookings<S: SqlStorage>(storage: &S, account: Uuid) -> ApiResult<()> {
    let open = storage.bookings_count_open_for_account(account).await?;
    if open > 0 {
        tracing::info!(%account, open, "Account deletion refused");
        return Err(ApiError::conflict(OPEN_BOOKINGS_MESSAGE));
    }
    Ok(())
}

#[tracing::instrument(skip_all, fields(account = %user.id))]
pub async fn delete_account<S, U>(state: &AppState<S, U>, user: &StoredUser) -> ApiResult<DeletionReport>
where
    S: SqlStorage,
    U: UserStorage,
{
    let storage = &state.sql_storage;
    ensure_no_open_bookings(storage, user.id).await?;

    let mut report = DeletionReport {
        notifications: storage.notifications_delete_for_user(user.id).await?,
        ..DeletionReport::default()
    };

    let cars = storage.cars_list_by_owner(user.id).await?;
    let car_ids: Vec<Uuid> = cars.iter().map(|c| c.id).collect();

    report.reviews = storage.reviews_delete_for_account(user.id, &car_ids).await?;
    report.bookings = storage.bookings_delete_for_account(user.id).await?;
    report.cars = storage.cars_delete_by_owner(user.id).await?;
    for car in &cars {
        state.images.remove(ImageKind::Car, user.id, &car.image).await;
    }

    if !state.user_storage.delete_user(user.id).await? {
        tracing::warn!(?report, "Account vanished during deletion");
        return Err(ApiError::not_found("User not found"));
    }
    if let Some(image) = &user.image {
        state.images.remove(ImageKind::Avatar, user.id, image).await;
    }

    tracing::info!(?report, "Account deleted");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockSqlStorage;
    use crate::images::{ImageStore, MockFileStorage};
    use crate::otp::mailer::Mailer;
    use crate::users::storage::{MockUserStorage, Role};
    use chrono::Utc;

    fn ghost() -> StoredUser {
        let now = Utc::now();
        StoredUser {
            id: Uuid::new_v4(),
            name: "Ghost".to_owned(),
            email: "ghost@example.com".to_owned(),
            password_hash: String::new(),
            role: Role::User,
            image: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn missing_account_row_is_reported() {
        let state = AppState::new(
            MockSqlStorage::new(),
            MockUserStorage::new(),
            ImageStore::new_for_test(MockFileStorage::new()),
            Mailer::new_for_test(),
        );

        let err = delete_account(&state, &ghost()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
