//! Application-wide defaults and environment overrides
//!
//! Defaults are used by the serde layer when a YAML key is omitted. Only the
//! deployment knobs (`CONFIG_PATH`, `PORT`) are read from the environment.

use std::path::PathBuf;

// =============================================================================
// Server & Channels
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Channel served when no channel list is configured
pub const DEFAULT_CHANNEL: &str = "/arbitrage";

/// Reserved path for the health probe; cannot be used as a channel name
pub const HEALTH_PATH: &str = "/health";

/// Per-subscriber outbound queue depth (events)
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Delay between the end of one tick and the start of the next
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 5000;

// =============================================================================
// Result Source
// =============================================================================

pub const DEFAULT_RANKING_URL: &str = "http://127.0.0.1:3000/api/spot-arb/ranking";
pub const DEFAULT_BALANCE_URL: &str = "http://127.0.0.1:3000/api/balances/latest";

/// Maximum records kept from one ranking ("top 20")
pub const DEFAULT_RANKING_LIMIT: usize = 20;

/// Events a tick queues besides the per-record `spot-arb` ones
/// (`top_20_data` and `balances-update`)
pub const TICK_FIXED_EVENTS: usize = 2;

/// Per-request timeout for the result source
pub const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 3000;

// =============================================================================
// Client Reconnect
// =============================================================================

pub const DEFAULT_CLIENT_URL: &str = "ws://127.0.0.1:8080/arbitrage";
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

/// Upper bound on `max_reconnect_attempts` (2^31 units is already ~68 years)
pub const MAX_RECONNECT_ATTEMPTS_LIMIT: u32 = 31;

// =============================================================================
// Environment
// =============================================================================

/// Configuration file path (default: `config.yaml`)
///
/// Environment variable: `CONFIG_PATH`
pub fn config_path() -> PathBuf {
    std::env::var("CONFIG_PATH")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"))
}

/// Listening port override
///
/// Environment variable: `PORT`. Unparseable values are ignored.
pub fn port_override() -> Option<u16> {
    std::env::var("PORT").ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_path_default() {
        std::env::remove_var("CONFIG_PATH");
        assert_eq!(config_path(), PathBuf::from("config.yaml"));
    }

    #[test]
    #[serial]
    fn test_config_path_from_env() {
        std::env::set_var("CONFIG_PATH", "/etc/feed/config.yaml");
        assert_eq!(config_path(), PathBuf::from("/etc/feed/config.yaml"));
        std::env::remove_var("CONFIG_PATH");
    }

    #[test]
    #[serial]
    fn test_port_override() {
        std::env::set_var("PORT", "9001");
        assert_eq!(port_override(), Some(9001));

        std::env::set_var("PORT", "not-a-port");
        assert_eq!(port_override(), None);

        std::env::remove_var("PORT");
        assert_eq!(port_override(), None);
    }
}
