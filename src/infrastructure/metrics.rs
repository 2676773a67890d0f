//! Metrics collection for the feed client
//!
//! The transport and batchers only see the [`MetricsSink`] boundary:
//! `increment(name)` and `record(name, value)`. [`MetricsCollector`] keeps
//! the well-known transport counters in atomics and everything else in a
//! locked map; snapshots are taken off the hot path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Well-known metric names
pub mod names {
    pub const WS_MESSAGES: &str = "ws.messages";
    pub const WS_DECODE_ERRORS: &str = "ws.decode_errors";
    pub const WS_PARSE_ERRORS: &str = "ws.parse_errors";
    pub const WS_RECONNECTS: &str = "ws.reconnects";
    pub const WS_ERRORS: &str = "ws.errors";
    pub const WS_OUTBOUND_QUEUED: &str = "ws.outbound_queued";
    pub const WS_HEARTBEATS: &str = "ws.heartbeats";
    pub const BATCHER_FLUSH_SIZE: &str = "batcher.flush_size";
    pub const BATCHER_MARKER_FLUSH_SIZE: &str = "batcher.marker_flush_size";
}

/// Counter/sample sink
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str);
    fn record(&self, name: &str, value: f64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    #[inline(always)]
    fn increment(&self, _name: &str) {}

    #[inline(always)]
    fn record(&self, _name: &str, _value: f64) {}
}

/// Running summary of recorded samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
}

impl SampleStats {
    fn new(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
            last: value,
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.last = value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Thread-safe metrics collector
pub struct MetricsCollector {
    /// Inbound frames, text and binary
    messages: AtomicU64,
    decode_errors: AtomicU64,
    parse_errors: AtomicU64,
    reconnects: AtomicU64,
    /// Everything without a dedicated atomic
    counters: Mutex<HashMap<String, u64>>,
    samples: Mutex<HashMap<String, SampleStats>>,
    start_time: Instant,
}

/// Metrics snapshot for export
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub messages: u64,
    pub decode_errors: u64,
    pub parse_errors: u64,
    pub reconnects: u64,
    pub counters: HashMap<String, u64>,
    pub samples: HashMap<String, SampleStats>,
    pub message_rate: f64, // messages per second
    pub uptime_seconds: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            counters: Mutex::new(HashMap::new()),
            samples: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    #[inline]
    fn atomic_for(&self, name: &str) -> Option<&AtomicU64> {
        match name {
            names::WS_MESSAGES => Some(&self.messages),
            names::WS_DECODE_ERRORS => Some(&self.decode_errors),
            names::WS_PARSE_ERRORS => Some(&self.parse_errors),
            names::WS_RECONNECTS => Some(&self.reconnects),
            _ => None,
        }
    }

    /// Current value of a counter; 0 if never incremented
    pub fn counter(&self, name: &str) -> u64 {
        match self.atomic_for(name) {
            Some(atomic) => atomic.load(Ordering::Relaxed),
            None => self.counters.lock().get(name).copied().unwrap_or(0),
        }
    }

    pub fn sample(&self, name: &str) -> Option<SampleStats> {
        self.samples.lock().get(name).copied()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let messages = self.messages.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            messages as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            messages,
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            counters: self.counters.lock().clone(),
            samples: self.samples.lock().clone(),
            message_rate: rate,
            uptime_seconds: uptime,
        }
    }
}

impl MetricsSink for MetricsCollector {
    #[inline]
    fn increment(&self, name: &str) {
        match self.atomic_for(name) {
            Some(atomic) => {
                atomic.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                *self.counters.lock().entry(name.to_string()).or_insert(0) += 1;
            }
        }
    }

    fn record(&self, name: &str, value: f64) {
        let mut samples = self.samples.lock();
        match samples.get_mut(name) {
            Some(stats) => stats.add(value),
            None => {
                samples.insert(name.to_string(), SampleStats::new(value));
            }
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_well_known_counters() {
        let metrics = MetricsCollector::new();
        metrics.increment(names::WS_MESSAGES);
        metrics.increment(names::WS_MESSAGES);
        metrics.increment(names::WS_DECODE_ERRORS);

        let snap = metrics.snapshot();
        assert_eq!(snap.messages, 2);
        assert_eq!(snap.decode_errors, 1);
        assert_eq!(snap.parse_errors, 0);
        assert!(snap.counters.is_empty());
    }

    #[test]
    fn test_named_counters() {
        let metrics = MetricsCollector::new();
        metrics.increment(names::WS_HEARTBEATS);
        metrics.increment("custom");
        metrics.increment("custom");

        assert_eq!(metrics.counter(names::WS_HEARTBEATS), 1);
        assert_eq!(metrics.counter("custom"), 2);
        assert_eq!(metrics.counter("never"), 0);
    }

    #[test]
    fn test_recorded_samples() {
        let metrics = MetricsCollector::new();
        metrics.record(names::BATCHER_FLUSH_SIZE, 3.0);
        metrics.record(names::BATCHER_FLUSH_SIZE, 1.0);
        metrics.record(names::BATCHER_FLUSH_SIZE, 5.0);

        let stats = metrics.sample(names::BATCHER_FLUSH_SIZE).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.last, 5.0);
        assert_eq!(stats.mean(), 3.0);
        assert!(metrics.sample("missing").is_none());
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.increment(names::WS_MESSAGES);
                        m.increment("other");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.counter(names::WS_MESSAGES), 4000);
        assert_eq!(metrics.counter("other"), 4000);
    }

    #[test]
    fn test_noop_sink() {
        let sink: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);
        sink.increment(names::WS_ERRORS);
        sink.record(names::BATCHER_FLUSH_SIZE, 1.0);
    }
}
