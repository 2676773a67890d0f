//! Infrastructure - cold path only
//!
//! This module contains non-latency-critical code:
//! - Configuration management
//! - Logging
//! - Metrics

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{BatchingConfig, Config, ConfigError, FeedConfig, LoggingConfig};
pub use metrics::{MetricsCollector, MetricsSink, MetricsSnapshot, NoopMetrics};
