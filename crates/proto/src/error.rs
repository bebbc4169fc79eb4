//! Service error taxonomy and its wire/HTTP mapping.

use crate::wire::{ErrorCode, ErrorResponse};

/// Failure classes surfaced by every service operation.
///
/// `Conflict` is an ordinary control-flow outcome of optimistic
/// concurrency, not a fault; callers retry after a fresh read. Only
/// `Internal` indicates something worth alerting on.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The wire-level error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Conflict(_) => ErrorCode::Conflict,
            ApiError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ApiError::NoSuchKey(_) => ErrorCode::NoSuchKey,
            ApiError::Auth(_) => ErrorCode::Auth,
            ApiError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The HTTP status code paired with this error on the wire.
    pub fn http_status(&self) -> u16 {
        match self {
            ApiError::Conflict(_) => 409,
            ApiError::InvalidRequest(_) => 400,
            ApiError::NoSuchKey(_) => 404,
            ApiError::Auth(_) => 401,
            ApiError::Internal(_) => 500,
        }
    }

    /// Build the wire body for this error.
    ///
    /// Internal failure details stay server-side; the client sees a
    /// generic message.
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            ApiError::Internal(_) => "unexpected server error".to_string(),
            other => other.to_string(),
        };
        ErrorResponse {
            error_code: self.code() as i32,
            message,
        }
    }
}
