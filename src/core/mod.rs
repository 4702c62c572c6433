//! Core module - Broadcast pipeline types, channel broadcaster and aggregation loop
//!
//! Prefer importing from `crate::core`:
//! ```ignore
//! use crate::core::{AggregationLoop, ChannelBroadcaster, ChannelEvent};
//! ```

pub mod aggregator;
pub mod broadcaster;
pub mod types;

pub use aggregator::{AggregationLoop, BalanceOutcome, RankingOutcome, TickReport};
pub use broadcaster::{
    ChannelBroadcaster, ChannelSubscriber, ChannelTopicState, DeliveryError, Subscriber,
    SubscriberId,
};
pub use types::{
    current_time_ms, BalancePayload, BalanceSnapshot, ChannelEvent, EventKind, FeeInfo,
    OpportunityRecord, OutboundEvent, SideQuote,
};
