//! HTTP-facing error type and response envelope.
//!
//! Every response body carries a `success` flag. Failures are rendered as
//! `{"success": false, "message": "..."}` with a status code matching the
//! failure; internal details are logged and replaced by a generic message.

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts,
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::database::SqlStorageError;
use crate::images::FileStorageError;
use crate::otp::mailer::MailError;
use crate::users::password::PasswordError;
use crate::users::storage::UserStorageError;
use crate::users::token::TokenError;

pub type ApiResult<T> = Result<T, ApiError>;

/// `Json` whose rejection is rendered through [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("Upstream service unavailable")]
    BadGateway(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(detail) => tracing::error!(%detail, "Request failed"),
            ApiError::BadGateway(detail) => tracing::warn!(%detail, "Upstream call failed"),
            _ => tracing::debug!(status = %self.status(), message = %self, "Request rejected"),
        }

        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Successful response envelope: `{"success": true, ...body}`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

/// Wrap a serializable struct into the success envelope.
pub fn ok<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

pub fn ok_message(message: impl Into<String>) -> Json<Success<Message>> {
    ok(Message {
        message: message.into(),
    })
}

impl From<SqlStorageError> for ApiError {
    fn from(err: SqlStorageError) -> Self {
        match err {
            SqlStorageError::NotFound(what) => ApiError::NotFound(what),
            SqlStorageError::Conflict(what) => ApiError::Conflict(what),
            SqlStorageError::Storage(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<UserStorageError> for ApiError {
    fn from(err: UserStorageError) -> Self {
        match err {
            UserStorageError::UserAlreadyExists(_) => ApiError::conflict("User already exists"),
            UserStorageError::UserNotFound(_) => ApiError::not_found("User not found"),
            UserStorageError::InvalidInput(reason) => ApiError::BadRequest(reason),
            UserStorageError::StorageError(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<FileStorageError> for ApiError {
    fn from(err: FileStorageError) -> Self {
        match err {
            FileStorageError::InvalidFileType(_) => ApiError::bad_request(err.to_string()),
            FileStorageError::FileTooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            FileStorageError::NotFound(path) => ApiError::NotFound(path),
            FileStorageError::StorageError(detail) | FileStorageError::ConnectionError(detail) => {
                ApiError::BadGateway(detail)
            }
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        ApiError::BadGateway(err.to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encode(detail) => ApiError::Internal(detail),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(err.body_text());
        }
        ApiError::BadRequest(err.body_text())
    }
}
