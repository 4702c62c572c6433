//! Result source trait definition
//!
//! The ResultSource trait is the only thing the aggregation loop and the
//! broadcaster know about the ranking/persistence subsystem.

use async_trait::async_trait;

use crate::adapters::errors::SourceResult;
use crate::core::types::{BalanceSnapshot, OpportunityRecord};

/// Read-only query interface over the latest computed results
///
/// Implementations must be side-effect free from the pipeline's point of
/// view: calling either method any number of times changes nothing.
///
/// # Example Implementation
///
/// ```ignore
/// struct FixedSource(Vec<OpportunityRecord>);
///
/// #[async_trait]
/// impl ResultSource for FixedSource {
///     async fn ranking(&self) -> SourceResult<Vec<OpportunityRecord>> {
///         Ok(self.0.clone())
///     }
///     async fn latest_balance(&self) -> SourceResult<Option<BalanceSnapshot>> {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Current ranked list of opportunities, best first
    async fn ranking(&self) -> SourceResult<Vec<OpportunityRecord>>;

    /// Most recent balance snapshot
    ///
    /// `Ok(None)` means "no data yet", which is a valid state and distinct
    /// from a failed query.
    async fn latest_balance(&self) -> SourceResult<Option<BalanceSnapshot>>;

    /// Short name for logging
    fn source_name(&self) -> &'static str {
        "source"
    }
}
