//! User storage trait and implementations.
//!
//! - `UserStorage` trait: interface for account persistence
//! - `PgUserStorage`: PostgreSQL implementation sharing the `PgStorage` pool
//! - `MockUserStorage`: in-memory implementation for testing
//!
//! ```rust,ignore
//! use carrental_services::users::storage::{MockUserStorage, NewUser, UserStorage};
//!
//! async fn example(storage: &MockUserStorage) {
//!     let user = storage
//!         .create_user(NewUser::new("Alice", "alice@example.com", "$2b$10$..."))
//!         .await?;
//! }
//! ```

use crate::database::PgStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Owner => "owner",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }
}

/// A stored account, including its password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: Uuid,
    pub name: String,
    /// Lowercased, trimmed email; unique across accounts.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            image: self.image.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password_hash: password_hash.into(),
        }
    }

    fn into_stored(self) -> StoredUser {
        let now = Utc::now();
        StoredUser {
            id: Uuid::new_v4(),
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role: Role::User,
            image: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Error type for user storage operations.
#[derive(Debug, thiserror::Error)]
pub enum UserStorageError {
    /// An account with this email already exists.
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    /// A database or storage error occurred.
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub trait UserStorage: Clone + Send + Sync + 'static {
    /// Creates an account. Fails with `UserAlreadyExists` if the email is taken.
    fn create_user(
        &self,
        user: NewUser,
    ) -> impl Future<Output = Result<StoredUser, UserStorageError>> + Send;

    fn get_user(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<StoredUser>, UserStorageError>> + Send;

    fn get_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<StoredUser>, UserStorageError>> + Send;

    /// Accounts for `ids`; unknown ids are skipped.
    fn get_users_many(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<StoredUser>, UserStorageError>> + Send;

    fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> impl Future<Output = Result<StoredUser, UserStorageError>> + Send;

    /// Sets (`Some`) or clears (`None`) the profile image.
    fn update_image(
        &self,
        id: Uuid,
        image: Option<String>,
    ) -> impl Future<Output = Result<StoredUser, UserStorageError>> + Send;

    fn update_role(
        &self,
        id: Uuid,
        role: Role,
    ) -> impl Future<Output = Result<StoredUser, UserStorageError>> + Send;

    /// Returns `true` if the account was deleted, `false` if it didn't exist.
    fn delete_user(&self, id: Uuid) -> impl Future<Output = Result<bool, UserStorageError>> + Send;
}

fn validate_new_user(user: &NewUser) -> Result<(), UserStorageError> {
    if user.name.trim().is_empty() {
        return Err(UserStorageError::InvalidInput(
            "Name cannot be empty".to_owned(),
        ));
    }
    if user.email.is_empty() {
        return Err(UserStorageError::InvalidInput(
            "Email cannot be empty".to_owned(),
        ));
    }
    if user.password_hash.is_empty() {
        return Err(UserStorageError::InvalidInput(
            "Password hash cannot be empty".to_owned(),
        ));
    }
    Ok(())
}

/// In-memory mock implementation of `UserStorage` for testing.
#[derive(Clone, Default)]
pub struct MockUserStorage {
    pub(crate) users: Arc<RwLock<HashMap<Uuid, StoredUser>>>,
}

impl MockUserStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully-formed user (builder pattern), e.g. to seed an owner
    /// whose id other fixtures refer to.
    pub fn with_user(self, user: StoredUser) -> Self {
        self.users
            .write()
            .expect("lock poisoned")
            .insert(user.id, user);
        self
    }

    pub fn len(&self) -> usize {
        self.users.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn modify(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut StoredUser),
    ) -> Result<StoredUser, UserStorageError> {
        let mut users = self.users.write().expect("lock poisoned");
        let user = users
            .get_mut(&id)
            .ok_or_else(|| UserStorageError::UserNotFound(id.to_string()))?;
        f(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

impl UserStorage for MockUserStorage {
    async fn create_user(&self, user: NewUser) -> Result<StoredUser, UserStorageError> {
        validate_new_user(&user)?;

        let mut users = self.users.write().expect("lock poisoned");
        if users.values().any(|u| u.email == user.email) {
            return Err(UserStorageError::UserAlreadyExists(user.email));
        }

        let stored = user.into_stored();
        users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<StoredUser>, UserStorageError> {
        let users = self.users.read().expect("lock poisoned");
        Ok(users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<StoredUser>, UserStorageError> {
        let users = self.users.read().expect("lock poisoned");
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn get_users_many(&self, ids: &[Uuid]) -> Result<Vec<StoredUser>, UserStorageError> {
        let users = self.users.read().expect("lock poisoned");
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<StoredUser, UserStorageError> {
        if password_hash.is_empty() {
            return Err(UserStorageError::InvalidInput(
                "Password hash cannot be empty".to_owned(),
            ));
        }
        self.modify(id, |u| u.password_hash = password_hash.to_owned())
    }

    async fn update_image(
        &self,
        id: Uuid,
        image: Option<String>,
    ) -> Result<StoredUser, UserStorageError> {
        self.modify(id, |u| u.image = image)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<StoredUser, UserStorageError> {
        self.modify(id, |u| u.role = role)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, UserStorageError> {
        let mut users = self.users.write().expect("lock poisoned");
        Ok(users.remove(&id).is_some())
    }
}

/// PostgreSQL implementation of `UserStorage` for production use.
///
/// Uses the `users` table from `migrations/0001_init.sql`.
#[derive(Clone)]
pub struct PgUserStorage {
    storage: PgStorage,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for StoredUser {
    type Error = UserStorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| UserStorageError::StorageError(format!("Unknown role: {}", row.role)))?;
        Ok(StoredUser {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            image: row.image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, image, created_at, updated_at";

fn storage_err(e: sqlx::Error) -> UserStorageError {
    UserStorageError::StorageError(e.to_string())
}

fn updated(id: Uuid, row: Option<UserRow>) -> Result<StoredUser, UserStorageError> {
    row.ok_or_else(|| UserStorageError::UserNotFound(id.to_string()))?
        .try_into()
}

impl PgUserStorage {
    pub fn new(storage: PgStorage) -> Self {
        Self { storage }
    }
}

impl UserStorage for PgUserStorage {
    async fn create_user(&self, user: NewUser) -> Result<StoredUser, UserStorageError> {
        validate_new_user(&user)?;
        let stored = user.into_stored();

        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (email) DO NOTHING \
             RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(stored.id)
            .bind(&stored.name)
            .bind(&stored.email)
            .bind(&stored.password_hash)
            .bind(stored.role.as_str())
            .bind(&stored.image)
            .bind(stored.created_at)
            .bind(stored.updated_at)
            .fetch_optional(&self.storage.pool)
            .await
            .map_err(storage_err)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(UserStorageError::UserAlreadyExists(stored.email)),
        }
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<StoredUser>, UserStorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        row.map(StoredUser::try_from).transpose()
    }

    async fn get_users_many(&self, ids: &[Uuid]) -> Result<Vec<StoredUser>, UserStorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)");
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        rows.into_iter().map(StoredUser::try_from).collect()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<StoredUser>, UserStorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        row.map(StoredUser::try_from).transpose()
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<StoredUser, UserStorageError> {
        if password_hash.is_empty() {
            return Err(UserStorageError::InvalidInput(
                "Password hash cannot be empty".to_owned(),
            ));
        }
        let sql = format!(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(password_hash)
            .fetch_optional(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        updated(id, row)
    }

    async fn update_image(
        &self,
        id: Uuid,
        image: Option<String>,
    ) -> Result<StoredUser, UserStorageError> {
        let sql = format!(
            "UPDATE users SET image = $2, updated_at = now() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(image)
            .fetch_optional(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        updated(id, row)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<StoredUser, UserStorageError> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        updated(id, row)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, UserStorageError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser {
        NewUser::new("Alice", "alice@example.com", "hash")
    }

    #[tokio::test]
    async fn create_and_lookup_user() {
        let storage = MockUserStorage::new();

        let user = storage.create_user(alice()).await.unwrap();
        assert_eq!(user.role, Role::User);
        assert!(user.image.is_none());

        let by_email = storage
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(storage.get_user(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let storage = MockUserStorage::new();
        storage.create_user(alice()).await.unwrap();

        let result = storage.create_user(alice()).await;
        assert!(matches!(result, Err(UserStorageError::UserAlreadyExists(_))));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn empty_fields_are_invalid() {
        let storage = MockUserStorage::new();
        let result = storage
            .create_user(NewUser::new(" ", "a@example.com", "hash"))
            .await;
        assert!(matches!(result, Err(UserStorageError::InvalidInput(_))));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn update_image_and_role() {
        let storage = MockUserStorage::new();
        let user = storage.create_user(alice()).await.unwrap();

        let updated = storage
            .update_image(user.id, Some("https://img/a.png".into()))
            .await
            .unwrap();
        assert_eq!(updated.image.as_deref(), Some("https://img/a.png"));

        let cleared = storage.update_image(user.id, None).await.unwrap();
        assert!(cleared.image.is_none());

        let owner = storage.update_role(user.id, Role::Owner).await.unwrap();
        assert!(owner.is_owner());
    }

    #[tokio::test]
    async fn update_missing_user_fails() {
        let storage = MockUserStorage::new();
        let result = storage.update_password(Uuid::new_v4(), "hash").await;
        assert!(matches!(result, Err(UserStorageError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn delete_user_reports_existence() {
        let storage = MockUserStorage::new();
        let user = storage.create_user(alice()).await.unwrap();

        assert!(storage.delete_user(user.id).await.unwrap());
        assert!(!storage.delete_user(user.id).await.unwrap());
    }

    #[test]
    fn profile_hides_password_hash() {
        let user = alice().into_stored();
        let json = serde_json::to_value(user.profile()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "user");
        assert_eq!(json["email"], "alice@example.com");
    }
}
