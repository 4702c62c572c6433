//! Result source error types
//!
//! Every failure to query the ranking or balance backend surfaces as
//! `SourceError`. The aggregation loop recovers from all of them locally.

use thiserror::Error;

/// Error returned by a [`ResultSource`](super::ResultSource) query
#[derive(Error, Debug)]
pub enum SourceError {
    /// Backend could not be reached or answered with a failure status
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Backend answered but the body did not have the expected shape
    #[error("Invalid source payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::InvalidPayload(e.to_string())
        } else {
            SourceError::Unavailable(e.to_string())
        }
    }
}

/// Result type alias for source queries
pub type SourceResult<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_display() {
        let err = SourceError::Unavailable("timeout".to_string());
        assert_eq!(err.to_string(), "Source unavailable: timeout");
    }

    #[test]
    fn test_invalid_payload_display() {
        let err = SourceError::InvalidPayload("expected array".to_string());
        assert_eq!(err.to_string(), "Invalid source payload: expected array");
    }
}
