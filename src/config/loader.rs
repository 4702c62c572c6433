//! Configuration loader for YAML files
//!
//! Both entry points parse into `AppConfig` and run `AppConfig::validate`, so
//! a config that loads is one the server and monitor can start with.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::AppError;

use super::types::AppConfig;

/// Load and validate configuration from a YAML file
///
/// Steps:
/// 1. Check the file exists (reported as a config error, not an IO error)
/// 2. Parse the YAML; omitted keys take their serde defaults
/// 3. Validate channels, buffer sizing and client settings
///
/// # Arguments
/// * `path` - Path to the YAML file, usually `constants::config_path()`
///
/// # Returns
/// * `Ok(AppConfig)` - Successfully loaded and validated configuration
/// * `Err(AppError)` - File not found, parse error, or validation failure
///
/// # Example
/// ```ignore
/// use std::path::Path;
/// use spot_arb_feed::config::load_config;
///
/// let config = load_config(Path::new("config.yaml"))?;
/// ```
pub fn load_config(path: &Path) -> Result<AppConfig, AppError> {
    // Missing file
    if !path.exists() {
        return Err(AppError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);

    // Parse, keeping the path in the message
    let config: AppConfig = serde_yaml::from_reader(reader).map_err(|e| {
        AppError::Config(format!("YAML parse error in '{}': {}", path.display(), e))
    })?;

    // Cross-field rules (unique channels, buffer >= one tick, URLs)
    config.validate()?;

    Ok(config)
}

/// Load configuration from a YAML string
///
/// Same parsing and validation as [`load_config`]; used by tests and by
/// callers that embed the config.
///
/// # Arguments
/// * `yaml_content` - YAML document; `{}` yields the full default config
pub fn load_config_from_str(yaml_content: &str) -> Result<AppConfig, AppError> {
    let config: AppConfig = serde_yaml::from_str(yaml_content)
        .map_err(|e| AppError::Config(format!("YAML parse error: {}", e)))?;

    config.validate()?;

    Ok(config)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_CONFIG_YAML: &str = r#"
server:
  host: 127.0.0.1
  port: 9090
  subscriber_buffer: 32
channels:
  - name: /arbitrage
    tick_interval_ms: 2000
    source:
      ranking_url: http://ranker.local/ranking
      balance_url: http://ranker.local/balance
      ranking_limit: 10
      timeout_ms: 1500
  - name: /arbitrage-futures
client:
  url: ws://127.0.0.1:9090/arbitrage
  max_reconnect_attempts: 3
  backoff_unit_ms: 500
"#;

    #[test]
    fn test_load_config_from_str_valid() {
        let config = load_config_from_str(VALID_CONFIG_YAML).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].source.ranking_limit, 10);
        assert_eq!(config.client.max_reconnect_attempts, 3);
    }

    #[test]
    fn test_omitted_keys_use_defaults() {
        let config = load_config_from_str(VALID_CONFIG_YAML).unwrap();
        let futures = &config.channels[1];
        assert_eq!(futures.tick_interval_ms, 5000);
        assert_eq!(futures.source.ranking_limit, 20);
        assert_eq!(futures.source.timeout_ms, 3000);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.client.backoff_unit_ms, 1000);
    }

    #[test]
    fn test_load_config_from_str_invalid_yaml() {
        let result = load_config_from_str("invalid: yaml: content: [");
        assert!(result.unwrap_err().to_string().contains("YAML parse error"));
    }

    #[test]
    fn test_load_config_from_str_validation_failure() {
        let yaml = r#"
channels:
  - name: /arbitrage
  - name: /arbitrage
"#;
        let err = load_config_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("Duplicate channel"));
    }

    #[test]
    fn test_ranking_limit_larger_than_buffer_rejected() {
        let yaml = r#"
server:
  subscriber_buffer: 64
channels:
  - name: /arbitrage
    source:
      ranking_limit: 100
"#;
        let err = load_config_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("must be >= ranking_limit + 2"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(VALID_CONFIG_YAML.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }
}
