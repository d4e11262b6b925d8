//! Error types for recruitsync-core

use thiserror::Error;

/// Result type alias using recruitsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in recruitsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote backend returned a non-success response
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
