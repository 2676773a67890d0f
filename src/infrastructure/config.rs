//! Configuration management for the feed client
//!
//! Loads configuration from config.toml (or `CONFIG_PATH`) at startup.
//! Every field has a default, so a missing file or a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Feed client configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub batching: BatchingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// WebSocket endpoint of the feed server
    #[serde(default = "default_url")]
    pub url: String,

    /// Auth token, appended as the `token` query parameter
    #[serde(default)]
    pub token: Option<String>,

    /// Fixed delay between a close and the next connection attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Version byte written into outgoing frame headers
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u8,

    /// Symbols registered locally before any server mapping arrives
    #[serde(default)]
    pub symbols: Vec<String>,
}

/// Coalescing settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchingConfig {
    /// Display refresh rate the render batcher aligns to
    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: u32,
}

/// Log output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write rolling log files in addition to the console
    #[serde(default = "default_file_output")]
    pub file_output: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            protocol_version: default_protocol_version(),
            symbols: Vec::new(),
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: default_frame_rate_hz(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            level: default_log_level(),
            file_output: default_file_output(),
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_protocol_version() -> u8 {
    crate::protocol::PROTOCOL_VERSION
}

fn default_frame_rate_hz() -> u32 {
    60
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_output() -> bool {
    true
}

impl Config {
    /// Load configuration from `CONFIG_PATH` or config.toml
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(config_path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl FeedConfig {
    #[inline(always)]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[inline(always)]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Endpoint with the auth token embedded
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        let mut url = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::InvalidUrl(format!("unsupported scheme {other}"))),
        }
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.into())
    }
}

impl BatchingConfig {
    /// One display refresh; a zero rate falls back to 60 Hz
    pub fn frame_interval(&self) -> Duration {
        let hz = if self.frame_rate_hz == 0 {
            default_frame_rate_hz()
        } else {
            self.frame_rate_hz
        };
        Duration::from_secs_f64(1.0 / hz as f64)
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid feed url: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed.url, "ws://127.0.0.1:8080/ws");
        assert_eq!(config.feed.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.feed.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.feed.protocol_version, 1);
        assert_eq!(config.batching.frame_rate_hz, 60);
        assert_eq!(config.logging.directory, PathBuf::from("logs"));
        assert!(config.logging.file_output);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            [feed]
            url = "wss://feed.example.com/stream"
            token = "abc"
            symbols = ["BTCUSD", "ETHUSD"]

            [batching]
            frame_rate_hz = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.feed.reconnect_delay_ms, 5_000);
        assert_eq!(config.feed.symbols.len(), 2);
        assert_eq!(config.batching.frame_rate_hz, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml("[feed\nurl = 1").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_from("/nonexistent/tick-feed/config.toml").unwrap();
        assert_eq!(config.feed.url, default_url());
    }

    #[test]
    fn test_connection_url_embeds_token() {
        let feed = FeedConfig {
            token: Some("s3cr3t&x".to_string()),
            ..FeedConfig::default()
        };
        assert_eq!(feed.connection_url().unwrap(), "ws://127.0.0.1:8080/ws?token=s3cr3t%26x");

        let plain = FeedConfig::default();
        assert_eq!(plain.connection_url().unwrap(), "ws://127.0.0.1:8080/ws");
    }

    #[test]
    fn test_connection_url_rejects_bad_urls() {
        let bad = FeedConfig {
            url: "http://127.0.0.1/ws".to_string(),
            ..FeedConfig::default()
        };
        assert!(matches!(bad.connection_url(), Err(ConfigError::InvalidUrl(_))));

        let garbage = FeedConfig {
            url: "not a url".to_string(),
            ..FeedConfig::default()
        };
        assert!(garbage.connection_url().is_err());
    }

    #[test]
    fn test_frame_interval() {
        let batching = BatchingConfig { frame_rate_hz: 50 };
        assert_eq!(batching.frame_interval(), Duration::from_millis(20));
        let zero = BatchingConfig { frame_rate_hz: 0 };
        assert_eq!(zero.frame_interval(), BatchingConfig::default().frame_interval());
    }
}
