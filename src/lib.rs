//! Real-time market tick client
//!
//! Binary wire codec over a shared symbol registry, a reconnecting WebSocket
//! transport with typed dispatch, and frame/microtask-aligned coalescing of
//! updates before they reach presentation code.

pub mod core;
pub mod engine;
pub mod hot_path;
pub mod infrastructure;
pub mod protocol;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use engine::FeedEngine;
pub use infrastructure::config::{BatchingConfig, Config, FeedConfig, LoggingConfig};

use thiserror::Error;

/// Main error type for the feed client
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),

    #[error("Registry error: {0}")]
    Registry(#[from] crate::core::RegistryError),

    #[error("Connection error: {0}")]
    Connection(#[from] crate::ws::ConnectionError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::infrastructure::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine already started")]
    AlreadyStarted,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FeedError>;
