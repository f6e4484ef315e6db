use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Failure reported by a storage backend. Orchestrators wrap it with the
/// key/bucket they were operating on and never retry.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("upload of `{key}` to bucket `{bucket}` failed: {source}")]
    Upload {
        key: String,
        bucket: String,
        #[source]
        source: ProviderError,
    },
    #[error("delete of `{key}` from bucket `{bucket}` failed: {source}")]
    Delete {
        key: String,
        bucket: String,
        #[source]
        source: ProviderError,
    },
    #[error("resolving path of `{key}` in bucket `{bucket}` failed: {source}")]
    ResolvePath {
        key: String,
        bucket: String,
        #[source]
        source: ProviderError,
    },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("cannot upload a file for a record that has not been persisted")]
    NotPersisted,
    #[error("record `{0}` not found")]
    RecordNotFound(String),
    #[error("record `{0}` was modified concurrently")]
    Conflict(String),
    #[error("invalid upload configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

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

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
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

impl From<AttachmentError> for AppError {
    fn from(err: AttachmentError) -> Self {
        let status = match &err {
            AttachmentError::Validation(_) => StatusCode::BAD_REQUEST,
            AttachmentError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            AttachmentError::Conflict(_) => StatusCode::CONFLICT,
            AttachmentError::NotPersisted => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_errors_map_to_http_status() {
        let cases = [
            (AttachmentError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AttachmentError::RecordNotFound("r1".into()), StatusCode::NOT_FOUND),
            (AttachmentError::Conflict("r1".into()), StatusCode::CONFLICT),
            (AttachmentError::NotPersisted, StatusCode::UNPROCESSABLE_ENTITY),
            (
                AttachmentError::Upload {
                    key: "k".into(),
                    bucket: "b".into(),
                    source: ProviderError::Rejected("full".into()),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn upload_error_names_key_and_bucket() {
        let err = AttachmentError::Upload {
            key: "r1/a.png".into(),
            bucket: "public".into(),
            source: ProviderError::Rejected("quota".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("r1/a.png"));
        assert!(msg.contains("public"));
        assert!(msg.contains("quota"));
    }
}
