use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{services::BrowserError, store::StoreError};

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Translate a browser failure. `action` names the operation for store
    /// failures, e.g. "list objects" renders as "Failed to list objects: ...".
    pub fn from_browser(action: &str, err: BrowserError) -> Self {
        match err {
            BrowserError::Validation(msg) => Self::bad_request(msg),
            BrowserError::NotFound { .. } | BrowserError::Store(StoreError::NoSuchKey { .. }) => {
                Self::not_found("File not found")
            }
            BrowserError::Store(StoreError::NoSuchBucket(bucket)) => {
                Self::not_found(format!("Failed to {action}: bucket `{bucket}` not found"))
            }
            BrowserError::Store(StoreError::BucketAlreadyExists(bucket)) => Self::new(
                StatusCode::CONFLICT,
                format!("Bucket `{bucket}` already exists"),
            ),
            BrowserError::Cancelled => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down")
            }
            other => {
                tracing::error!("failed to {}: {}", action, other);
                Self::internal(format!("Failed to {action}: {other}"))
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_name_the_operation() {
        let err = AppError::from_browser(
            "list objects",
            BrowserError::Store(StoreError::Backend("connection refused".into())),
        );
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Failed to list objects: connection refused");
    }

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (BrowserError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                BrowserError::NotFound {
                    bucket: "b".into(),
                    key: "k".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                BrowserError::Store(StoreError::NoSuchBucket("b".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                BrowserError::Store(StoreError::BucketAlreadyExists("b".into())),
                StatusCode::CONFLICT,
            ),
            (BrowserError::Cancelled, StatusCode::SERVICE_UNAVAILABLE),
            (
                BrowserError::Store(StoreError::Protocol("loop".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from_browser("do it", err).status, status);
        }
    }

    #[test]
    fn missing_file_message() {
        let err = AppError::from_browser(
            "download file",
            BrowserError::NotFound {
                bucket: "b".into(),
                key: "k".into(),
            },
        );
        assert_eq!(err.message, "File not found");
    }
}
