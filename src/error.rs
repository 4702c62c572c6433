//! Application-wide error types using thiserror
//!
//! Layer errors (`SourceError`, `ClientError`) convert into `AppError`
//! so binaries and setup code can propagate them with `?`.

use crate::adapters::errors::SourceError;
use crate::client::errors::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
