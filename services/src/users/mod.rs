//! User accounts.
//!
//! This module provides:
//! - Registration and login backed by bcrypt password hashes
//! - Session JWTs and the `RequireAuth` extractor
//! - Profile image, password change and reset endpoints under `/api/user`
//! - Storage abstraction for accounts

pub mod password;
pub mod routes;
pub mod session_auth;
pub mod storage;
pub mod token;

pub use routes::user_routes;
pub use session_auth::{RequireAuth, load_owner, load_user};
pub use storage::{MockUserStorage, PgUserStorage, Role, StoredUser, UserStorage, UserStorageError};
