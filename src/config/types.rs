//! Configuration types for the feed server and monitor client
//!
//! Everything here is loaded from YAML. Omitted keys fall back to the
//! defaults in [`constants`](super::constants).

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::ReconnectPolicy;
use crate::error::AppError;

use super::constants::*;

// ============================================================================
// Configuration Structs
// ============================================================================

/// HTTP/WebSocket listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outbound events queued per subscriber before it counts as lagging
    pub subscriber_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where a channel's ranking and balance come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub ranking_url: String,
    pub balance_url: String,
    pub ranking_limit: usize,
    pub timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            ranking_url: DEFAULT_RANKING_URL.to_string(),
            balance_url: DEFAULT_BALANCE_URL.to_string(),
            ranking_limit: DEFAULT_RANKING_LIMIT,
            timeout_ms: DEFAULT_SOURCE_TIMEOUT_MS,
        }
    }
}

/// One logical broadcast topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Route path, e.g. "/arbitrage"
    pub name: String,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub source: SourceConfig,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHANNEL.to_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            source: SourceConfig::default(),
        }
    }
}

impl ChannelConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Worst-case events one tick queues per subscriber: one `spot-arb` per
    /// record, then `top_20_data` and `balances-update`.
    pub fn events_per_tick(&self) -> usize {
        self.source.ranking_limit.saturating_add(TICK_FIXED_EVENTS)
    }

    /// Validate channel configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        // Rule: name is a route path
        if !self.name.starts_with('/') || self.name.len() < 2 {
            return Err(AppError::Config(format!(
                "Channel '{}': name must start with '/' and be non-empty",
                self.name
            )));
        }

        if self.name == HEALTH_PATH {
            return Err(AppError::Config(format!(
                "Channel name '{}' is reserved",
                HEALTH_PATH
            )));
        }

        if self.tick_interval_ms == 0 {
            return Err(AppError::Config(format!(
                "Channel '{}': tick_interval_ms must be > 0",
                self.name
            )));
        }

        if self.source.ranking_limit == 0 {
            return Err(AppError::Config(format!(
                "Channel '{}': ranking_limit must be > 0",
                self.name
            )));
        }

        if self.source.timeout_ms == 0 {
            return Err(AppError::Config(format!(
                "Channel '{}': timeout_ms must be > 0",
                self.name
            )));
        }

        for (field, url) in [
            ("ranking_url", &self.source.ranking_url),
            ("balance_url", &self.source.balance_url),
        ] {
            validate_url(url, &["http", "https"]).map_err(|reason| {
                AppError::Config(format!("Channel '{}': {} {}", self.name, field, reason))
            })?;
        }

        Ok(())
    }
}

/// Monitor client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Channel endpoint, e.g. "ws://127.0.0.1:8080/arbitrage"
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub backoff_unit_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CLIENT_URL.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff_unit_ms: DEFAULT_BACKOFF_UNIT_MS,
        }
    }
}

impl ClientConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_reconnect_attempts,
            Duration::from_millis(self.backoff_unit_ms),
        )
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_url(&self.url, &["ws", "wss"])
            .map_err(|reason| AppError::Config(format!("Client url {}", reason)))?;

        if self.backoff_unit_ms == 0 {
            return Err(AppError::Config(
                "Client backoff_unit_ms must be > 0".to_string(),
            ));
        }

        if self.max_reconnect_attempts > MAX_RECONNECT_ATTEMPTS_LIMIT {
            return Err(AppError::Config(format!(
                "Client max_reconnect_attempts must be <= {}, got {}",
                MAX_RECONNECT_ATTEMPTS_LIMIT, self.max_reconnect_attempts
            )));
        }

        Ok(())
    }
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub client: ClientConfig,
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![ChannelConfig::default()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            channels: default_channels(),
            client: ClientConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        // Rule: At least one channel must be configured
        if self.channels.is_empty() {
            return Err(AppError::Config(
                "Configuration must contain at least one channel".to_string(),
            ));
        }

        if self.server.subscriber_buffer == 0 {
            return Err(AppError::Config(
                "server.subscriber_buffer must be > 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            channel.validate()?;

            // Rule: one tick must fit in an undrained subscriber queue,
            // otherwise the trailing top_20_data is dropped every tick
            let per_tick = channel.events_per_tick();
            if self.server.subscriber_buffer < per_tick {
                return Err(AppError::Config(format!(
                    "Channel '{}': server.subscriber_buffer ({}) must be >= ranking_limit + {} ({})",
                    channel.name,
                    self.server.subscriber_buffer,
                    TICK_FIXED_EVENTS,
                    per_tick
                )));
            }

            // Rule: channel names are unique routes
            if !seen.insert(channel.name.as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate channel name '{}'",
                    channel.name
                )));
            }
        }

        self.client.validate()?;

        Ok(())
    }
}

/// Check that `raw` parses as a URL with one of the allowed schemes.
fn validate_url(raw: &str, schemes: &[&str]) -> Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| format!("'{}' is not a valid URL: {}", raw, e))?;
    if !schemes.contains(&url.scheme()) {
        return Err(format!(
            "'{}' must use one of {:?}, got '{}'",
            raw,
            schemes,
            url.scheme()
        ));
    }
    if url.host_str().is_none() {
        return Err(format!("'{}' has no host", raw));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
