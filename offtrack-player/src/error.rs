//! Error types for offtrack-player
//!
//! Store, resolver, and controller faults propagate to the caller as
//! [`Error`]; the HTTP layer turns them into status codes through
//! [`IntoResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Main error type for offtrack-player
#[derive(Error, Debug)]
pub enum Error {
    /// The storage medium rejected a read or write
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// File I/O errors (folder import, database folder)
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Referenced id has no record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Index or value outside its documented bounds
    #[error("Out of range: {0}")]
    Range(String),

    /// The transport rejected or failed to start a source
    #[error("Playback error: {0}")]
    Playback(String),

    /// Stored payload is present but empty
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Media route id that is not a positive integer
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience Result type using offtrack-player Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<offtrack_common::Error> for Error {
    fn from(err: offtrack_common::Error) -> Self {
        match err {
            offtrack_common::Error::Database(e) => Error::Storage(e),
            offtrack_common::Error::Io(e) => Error::Io(e),
            offtrack_common::Error::Config(msg) => Error::Config(msg),
            offtrack_common::Error::Schema(msg) => Error::Config(format!("schema: {}", msg)),
        }
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Range(_) | Error::InvalidIdentifier(_) | Error::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::Playback(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Storage(_) | Error::Io(_) | Error::Corrupt(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
