//! Result source adapters
//!
//! This module provides the query seam between the broadcast pipeline and the
//! subsystem that computes rankings and stores balances.

pub mod errors;
pub mod http;
pub mod traits;

// Re-export commonly used types for convenience
pub use errors::{SourceError, SourceResult};
pub use http::HttpResultSource;
pub use traits::ResultSource;
