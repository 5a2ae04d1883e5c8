//! Session-based JWT authentication for protected routes.
//!
//! # Usage
//!
//! ```rust,ignore
//! use carrental_services::users::session_auth::RequireAuth;
//!
//! async fn protected_handler(auth: RequireAuth) -> impl IntoResponse {
//!     format!("Hello, {}!", auth.user_id())
//! }
//! ```
//!
//! # Authentication Flow
//!
//! 1. User logs in via `/api/user/login` (or registers) and receives a JWT
//! 2. Client sends it on later requests as `Authorization: Bearer <token>`;
//!    a bare token without the `Bearer` prefix is accepted as well
//! 3. `RequireAuth` validates the token and exposes the user id to handlers
//!
//! Handlers still load the account: a valid token whose user has since been
//! deleted is rejected with 401 by [`load_user`].

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;

use super::storage::{StoredUser, UserStorage};
use super::token::validate_session_token;
use crate::api::ApiError;
use crate::config::Config;

/// Authenticated user context extracted from a valid session JWT.
///
/// Rejects with 401 when the token is missing, malformed, signed with another
/// secret, expired, or issued by someone else.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    user_id: Uuid,
}

impl RequireAuth {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Extract the token from the Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let header_str = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = header_str.strip_prefix("Bearer ").unwrap_or(header_str).trim();
    if token.is_empty() || token == "Bearer" {
        return None;
    }
    Some(token)
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // JWT secret comes from the Config extension layer
        let config = parts
            .extensions
            .get::<Config>()
            .ok_or_else(|| ApiError::Internal("Config extension missing".to_owned()))?;

        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Not authorized, token missing"))?;

        let claims = validate_session_token(token, config.jwt_secret())?;
        let user_id = claims.user_id()?;

        Ok(RequireAuth { user_id })
    }
}

/// Load the account behind a session, treating a vanished account as
/// unauthorized.
pub async fn load_user<U: UserStorage>(
    users: &U,
    auth: &RequireAuth,
) -> Result<StoredUser, ApiError> {
    users
        .get_user(auth.user_id())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Not authorized, user not found"))
}

/// Like [`load_user`], but also requires the owner role.
pub async fn load_owner<U: UserStorage>(
    users: &U,
    auth: &RequireAuth,
) -> Result<StoredUser, ApiError> {
    let user = load_user(users, auth).await?;
    if !user.is_owner() {
        return Err(ApiError::forbidden("Only owners can perform this action"));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::storage::{MockUserStorage, NewUser, Role};
    use crate::users::token::generate_session_token;
    use axum::http::{Request, StatusCode};

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn extract_bearer_token() {
        assert_eq!(
            extract_token(&headers_with("Bearer my-token-123")),
            Some("my-token-123")
        );
    }

    #[test]
    fn extract_bare_token() {
        assert_eq!(extract_token(&headers_with("my-token-123")), Some("my-token-123"));
    }

    #[test]
    fn extract_missing_or_empty_token() {
        assert_eq!(extract_token(&HeaderMap::new()), None);
        assert_eq!(extract_token(&headers_with("Bearer ")), None);
    }

    async fn extract(header: Option<String>) -> Result<RequireAuth, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let mut request = builder.body(()).unwrap();
        request.extensions_mut().insert(Config::new_for_test());
        let (mut parts, _) = request.into_parts();
        RequireAuth::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn valid_token_yields_user_id() {
        let config = Config::new_for_test();
        let user = Uuid::new_v4();
        let token = generate_session_token(user, config.jwt_secret()).unwrap();

        let auth = extract(Some(format!("Bearer {token}"))).await.unwrap();
        assert_eq!(auth.user_id(), user);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let err = extract(None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_signed_elsewhere_is_unauthorized() {
        let token = generate_session_token(Uuid::new_v4(), "another-secret").unwrap();
        let err = extract(Some(token)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn load_owner_requires_role() {
        let config = Config::new_for_test();
        let users = MockUserStorage::new();
        let user = users
            .create_user(NewUser::new("Bob", "bob@example.com", "hash"))
            .await
            .unwrap();
        let token = generate_session_token(user.id, config.jwt_secret()).unwrap();
        let auth = extract(Some(token)).await.unwrap();

        let err = load_owner(&users, &auth).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        users.update_role(user.id, Role::Owner).await.unwrap();
        assert!(load_owner(&users, &auth).await.is_ok());
    }

    #[tokio::test]
    async fn deleted_user_is_unauthorized() {
        let config = Config::new_for_test();
        let users = MockUserStorage::new();
        let token = generate_session_token(Uuid::new_v4(), config.jwt_secret()).unwrap();
        let auth = extract(Some(token)).await.unwrap();

        let err = load_user(&users, &auth).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
