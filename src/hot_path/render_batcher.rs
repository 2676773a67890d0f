//! Frame-aligned coalescing of inbound updates
//!
//! Messages are appended to a lock-free queue. The first push after the
//! queue was idle schedules one flush on the next frame boundary. A flush
//! drains the queue, keeps the last message per aggregation key in the
//! order keys were first seen, delivers to the live subscriber set and only
//! then clears the scheduled flag. Anything pushed while a flush is
//! delivering gets exactly one follow-up flush.

use crate::core::TickEvent;
use crate::hot_path::schedule::ScheduleOnce;
use crate::infrastructure::metrics::{names, MetricsSink};
use crate::ws::{EventBus, FeedEvent, Handler, Subscription};
use crossbeam_queue::SegQueue;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bus topic flushed messages are published under
const FLUSH_TOPIC: &str = "flush";

/// Payload fields that override the symbol as aggregation key
const SECONDARY_KEYS: [&str; 3] = ["ticketId", "ticket_id", "roomId"];

/// Identity messages are coalesced by
pub trait AggregationKey {
    fn aggregation_key(&self) -> Cow<'_, str>;
}

impl AggregationKey for TickEvent {
    #[inline(always)]
    fn aggregation_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.symbol)
    }
}

impl AggregationKey for FeedEvent {
    /// Ticks by symbol; messages by ticket id, then symbol, then type
    fn aggregation_key(&self) -> Cow<'_, str> {
        match self {
            FeedEvent::Tick(tick) => tick.aggregation_key(),
            FeedEvent::Mapping { symbol, .. } => Cow::Owned(format!("mapping:{symbol}")),
            FeedEvent::Message { kind, payload } => {
                let field = |key: &str| payload.get(key).and_then(value_key);
                SECONDARY_KEYS
                    .iter()
                    .find_map(|&key| field(key))
                    .or_else(|| field("symbol"))
                    .map(|id| Cow::Owned(format!("{kind}:{id}")))
                    .unwrap_or(Cow::Borrowed(kind.as_str()))
            }
            other => Cow::Borrowed(other.tag()),
        }
    }
}

fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Keep the last item per key, ordered by first appearance of the key
pub fn coalesce<T: AggregationKey>(items: Vec<T>) -> Vec<T> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let slot = slots.get(item.aggregation_key().as_ref()).copied();
        match slot {
            Some(idx) => out[idx] = item,
            None => {
                slots.insert(item.aggregation_key().into_owned(), out.len());
                out.push(item);
            }
        }
    }
    out
}

struct Inner<T> {
    queue: SegQueue<T>,
    scheduled: AtomicBool,
    subscribers: EventBus<T>,
    scheduler: ScheduleOnce,
    metrics: Arc<dyn MetricsSink>,
}

impl<T: AggregationKey + Send + Sync + 'static> Inner<T> {
    fn request_flush(self: &Arc<Self>) {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        self.scheduler.schedule(move || inner.flush());
    }

    fn flush(self: &Arc<Self>) {
        let mut drained = Vec::with_capacity(self.queue.len());
        while let Some(item) = self.queue.pop() {
            drained.push(item);
        }
        let batch = coalesce(drained);
        self.metrics.record(names::BATCHER_FLUSH_SIZE, batch.len() as f64);

        for item in &batch {
            self.subscribers.publish(FLUSH_TOPIC, item);
        }

        // Pairs with the swap in request_flush
        self.scheduled.store(false, Ordering::SeqCst);
        if !self.queue.is_empty() {
            self.request_flush();
        }
    }
}

/// Frame-aligned batcher; clones share one queue
pub struct RenderBatcher<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RenderBatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: AggregationKey + Send + Sync + 'static> RenderBatcher<T> {
    pub fn new(scheduler: ScheduleOnce, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: SegQueue::new(),
                scheduled: AtomicBool::new(false),
                subscribers: EventBus::new(),
                scheduler,
                metrics,
            }),
        }
    }

    /// Queue a message for the next frame
    #[inline]
    pub fn push(&self, item: T) {
        self.inner.queue.push(item);
        self.inner.request_flush();
    }

    pub fn on(&self, handler: Handler<T>) -> Subscription {
        self.inner.subscribers.on(FLUSH_TOPIC, handler)
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(FLUSH_TOPIC, f)
    }

    pub fn off(&self, handler: &Handler<T>) -> bool {
        self.inner.subscribers.off(FLUSH_TOPIC, handler)
    }

    /// Messages waiting for the next flush
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    #[inline(always)]
    pub fn is_scheduled(&self) -> bool {
        self.inner.scheduled.load(Ordering::Acquire)
    }
}

// HFT Checklist:
// ✓ Lock-free queue on the push path
// ✓ One scheduled flush per burst
// ✓ Subscribers read at delivery time

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::metrics::{MetricsCollector, NoopMetrics};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;

    const FRAME: Duration = Duration::from_millis(16);

    fn tick(symbol: &str, price: f32) -> TickEvent {
        TickEvent::new(symbol, 1, price, 1.0, price, price)
    }

    fn batcher() -> (RenderBatcher<TickEvent>, Arc<Mutex<Vec<TickEvent>>>) {
        let batcher = RenderBatcher::new(ScheduleOnce::frame(FRAME), Arc::new(NoopMetrics));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        batcher.subscribe(move |t: &TickEvent| s.lock().push(t.clone()));
        (batcher, seen)
    }

    #[test]
    fn test_coalesce_keeps_last_in_first_seen_order() {
        let out = coalesce(vec![tick("A", 1.0), tick("B", 1.0), tick("A", 2.0), tick("C", 1.0), tick("B", 3.0)]);
        let got: Vec<(&str, f32)> = out.iter().map(|t| (t.symbol.as_str(), t.price)).collect();
        assert_eq!(got, vec![("A", 2.0), ("B", 3.0), ("C", 1.0)]);
    }

    #[test]
    fn test_feed_event_keys() {
        let t = FeedEvent::Tick(tick("BTCUSD", 1.0));
        assert_eq!(t.aggregation_key(), "BTCUSD");

        let ticket = FeedEvent::Message {
            kind: "ticket_message".into(),
            payload: json!({"ticketId": 42, "symbol": "BTCUSD"}),
        };
        assert_eq!(ticket.aggregation_key(), "ticket_message:42");

        let by_symbol = FeedEvent::Message {
            kind: "signal".into(),
            payload: json!({"symbol": "ETHUSD"}),
        };
        assert_eq!(by_symbol.aggregation_key(), "signal:ETHUSD");

        let bare = FeedEvent::Message {
            kind: "notice".into(),
            payload: Value::Null,
        };
        assert_eq!(bare.aggregation_key(), "notice");
        assert_eq!(FeedEvent::Heartbeat { ts: 1 }.aggregation_key(), "heartbeat");
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_delivery_per_symbol_per_frame() {
        let (batcher, seen) = batcher();
        for k in 1..=10 {
            batcher.push(tick("BTCUSD", k as f32));
        }
        assert!(batcher.is_scheduled());
        assert_eq!(batcher.pending(), 10);
        assert!(seen.lock().is_empty());

        sleep(FRAME * 2).await;
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].price, 10.0);
        assert!(!batcher.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cross_symbol_coalescing() {
        let (batcher, seen) = batcher();
        for k in 0..6 {
            let symbol = if k % 2 == 0 { "A" } else { "B" };
            batcher.push(tick(symbol, k as f32));
        }
        sleep(FRAME * 2).await;
        let got: Vec<(String, f32)> = seen.lock().iter().map(|t| (t.symbol.clone(), t.price)).collect();
        assert_eq!(got, vec![("A".to_string(), 4.0), ("B".to_string(), 5.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_during_flush_gets_one_more_flush() {
        let batcher = RenderBatcher::new(ScheduleOnce::frame(FRAME), Arc::new(NoopMetrics));
        let flushes = Arc::new(Mutex::new(Vec::new()));
        let (f, b) = (flushes.clone(), batcher.clone());
        batcher.subscribe(move |t: &TickEvent| {
            f.lock().push(t.price);
            if t.price < 3.0 {
                b.push(tick("BTCUSD", t.price + 1.0));
                b.push(tick("BTCUSD", t.price + 2.0));
            }
        });

        batcher.push(tick("BTCUSD", 1.0));
        sleep(FRAME + Duration::from_millis(1)).await;
        assert_eq!(*flushes.lock(), vec![1.0]);
        assert!(batcher.is_scheduled());

        sleep(FRAME).await;
        assert_eq!(*flushes.lock(), vec![1.0, 3.0]);

        sleep(FRAME * 4).await;
        assert_eq!(*flushes.lock(), vec![1.0, 3.0]);
        assert!(!batcher.is_scheduled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_are_all_delivered() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;

        let batcher = RenderBatcher::new(ScheduleOnce::microtask(), Arc::new(NoopMetrics));
        let seen = Arc::new(Mutex::new(std::collections::HashSet::new()));
        let s = seen.clone();
        batcher.subscribe(move |t: &TickEvent| {
            s.lock().insert(t.symbol.clone());
        });

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let batcher = batcher.clone();
                tokio::spawn(async move {
                    for i in 0..PER_PRODUCER {
                        batcher.push(tick(&format!("S{p}-{i}"), 1.0));
                        if i % 64 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        let delivered = tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().len() < PRODUCERS * PER_PRODUCER {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
        assert!(delivered.is_ok(), "stranded ticks: {}", batcher.pending());
        assert_eq!(batcher.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_before_flush() {
        let (batcher, seen) = batcher();
        let late = Arc::new(Mutex::new(0));
        let l = late.clone();
        let sub = batcher.subscribe(move |_: &TickEvent| *l.lock() += 1);

        batcher.push(tick("A", 1.0));
        sub.unsubscribe();
        sleep(FRAME * 2).await;
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(*late.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_size_metric() {
        let metrics = Arc::new(MetricsCollector::new());
        let batcher: RenderBatcher<TickEvent> = RenderBatcher::new(ScheduleOnce::frame(FRAME), metrics.clone());
        batcher.push(tick("A", 1.0));
        batcher.push(tick("A", 2.0));
        batcher.push(tick("B", 1.0));
        sleep(FRAME * 2).await;

        let stats = metrics.sample(names::BATCHER_FLUSH_SIZE).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.last, 2.0);
    }
}
