//! Spot arbitrage feed
//!
//! Real-time aggregation-and-broadcast pipeline:
//! - Result source adapter (HTTP ranking + balance endpoints)
//! - Per-channel aggregation loop and broadcaster with join-time replay
//! - axum WebSocket server exposing each channel
//! - Resilient client connection manager with bounded exponential backoff

pub mod adapters;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod server;

pub use error::AppError;
