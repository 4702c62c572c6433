//! Configuration module for server, channel and client settings
//!
//! This module provides:
//! - Configuration types (`AppConfig`, `ServerConfig`, `ChannelConfig`, `SourceConfig`, `ClientConfig`)
//! - YAML loading functionality (`load_config`)
//! - Defaults and environment overrides (`constants`)
//! - Logging initialization (`init_logging`)

pub mod constants;
pub mod logging;
mod loader;
mod types;

pub use types::{AppConfig, ChannelConfig, ClientConfig, ServerConfig, SourceConfig};

pub use loader::{load_config, load_config_from_str};

pub use logging::init_logging;
