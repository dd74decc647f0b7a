//! Common error types for Offtrack

use thiserror::Error;

/// Common result type for Offtrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by the storage bootstrap and configuration loading
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored schema cannot be brought up to date automatically
    #[error("Schema error: {0}")]
    Schema(String),
}
