//! Microtask-aligned coalescing of chart markers
//!
//! `queue_marker_update` appends markers to a pending list and arms one
//! microtask. The flush dedupes by `(time, text)` keeping the last marker,
//! sorts ascending by time and calls the most recently supplied callback once.

use crate::core::Marker;
use crate::hot_path::schedule::ScheduleOnce;
use crate::infrastructure::metrics::{names, MetricsSink, NoopMetrics};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives the final marker list of a flush
pub type MarkerCallback = Arc<dyn Fn(&[Marker]) + Send + Sync>;

/// Last marker per `(time, text)`, stably sorted by time
pub fn dedupe_markers(markers: Vec<Marker>) -> Vec<Marker> {
    let mut slots: HashMap<(u32, String), usize> = HashMap::with_capacity(markers.len());
    let mut out: Vec<Marker> = Vec::with_capacity(markers.len());
    for marker in markers {
        let key = (marker.time, marker.text.clone());
        match slots.get(&key) {
            Some(&idx) => out[idx] = marker,
            None => {
                slots.insert(key, out.len());
                out.push(marker);
            }
        }
    }
    out.sort_by_key(|m| m.time);
    out
}

struct Inner {
    pending: Mutex<Vec<Marker>>,
    on_update: Mutex<Option<MarkerCallback>>,
    scheduled: AtomicBool,
    scheduler: ScheduleOnce,
    metrics: Arc<dyn MetricsSink>,
}

impl Inner {
    fn request_flush(self: &Arc<Self>) {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        self.scheduler.schedule(move || inner.flush());
    }

    fn flush(self: &Arc<Self>) {
        let drained = std::mem::take(&mut *self.pending.lock());
        let markers = dedupe_markers(drained);
        let callback = self.on_update.lock().clone();
        self.metrics.record(names::BATCHER_MARKER_FLUSH_SIZE, markers.len() as f64);

        if let Some(callback) = callback {
            callback(&markers);
        }

        self.scheduled.store(false, Ordering::SeqCst);
        if !self.pending.lock().is_empty() {
            self.request_flush();
        }
    }
}

/// Marker batcher; clones share one pending list
#[derive(Clone)]
pub struct MarkerBatcher {
    inner: Arc<Inner>,
}

impl MarkerBatcher {
    pub fn new(scheduler: ScheduleOnce, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(Vec::new()),
                on_update: Mutex::new(None),
                scheduled: AtomicBool::new(false),
                scheduler,
                metrics,
            }),
        }
    }

    /// Queue markers; `on_update` replaces any callback from earlier calls
    pub fn queue_marker_update<I>(&self, markers: I, on_update: MarkerCallback)
    where
        I: IntoIterator<Item = Marker>,
    {
        self.inner.pending.lock().extend(markers);
        *self.inner.on_update.lock() = Some(on_update);
        self.inner.request_flush();
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    #[inline(always)]
    pub fn is_scheduled(&self) -> bool {
        self.inner.scheduled.load(Ordering::Acquire)
    }
}

impl Default for MarkerBatcher {
    fn default() -> Self {
        Self::new(ScheduleOnce::microtask(), Arc::new(NoopMetrics))
    }
}
