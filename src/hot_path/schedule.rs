//! Schedule-once primitive for the batchers
//!
//! Two policies:
//! - `Frame { interval }`: run on the next frame boundary, i.e. the next
//!   multiple of `interval` since the scheduler's epoch
//! - `Microtask`: run as soon as the current task yields
//!
//! Both run the callback on a spawned tokio task. Outside a runtime the
//! callback runs inline.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{sleep_until, Instant};

/// When a scheduled callback fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// Next display refresh
    Frame { interval: Duration },
    /// Before the next frame or I/O callback
    Microtask,
}

#[derive(Debug, Clone)]
pub struct ScheduleOnce {
    policy: SchedulePolicy,
    /// Frame boundaries are counted from here
    epoch: Instant,
}

impl ScheduleOnce {
    pub fn new(policy: SchedulePolicy) -> Self {
        Self {
            policy,
            epoch: Instant::now(),
        }
    }

    pub fn frame(interval: Duration) -> Self {
        Self::new(SchedulePolicy::Frame { interval })
    }

    pub fn microtask() -> Self {
        Self::new(SchedulePolicy::Microtask)
    }

    #[inline(always)]
    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    /// First frame boundary strictly after `now`
    pub fn next_boundary(&self, now: Instant) -> Instant {
        let SchedulePolicy::Frame { interval } = self.policy else {
            return now;
        };
        let step = interval.as_nanos();
        if step == 0 {
            return now;
        }
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos();
        let frames = elapsed / step + 1;
        let offset = u64::try_from(frames * step).unwrap_or(u64::MAX);
        self.epoch + Duration::from_nanos(offset)
    }

    /// Run `f` once, according to the policy
    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(target: "batcher", "No runtime, running scheduled callback inline");
            f();
            return;
        };

        match self.policy {
            SchedulePolicy::Frame { .. } => {
                let at = self.next_boundary(Instant::now());
                runtime.spawn(async move {
                    sleep_until(at).await;
                    f();
                });
            }
            SchedulePolicy::Microtask => {
                runtime.spawn(async move {
                    tokio::task::yield_now().await;
                    f();
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_next_boundary_alignment() {
        let scheduler = ScheduleOnce::frame(Duration::from_millis(10));
        let epoch = Instant::now();
        assert_eq!(scheduler.next_boundary(epoch), epoch + Duration::from_millis(10));
        assert_eq!(
            scheduler.next_boundary(epoch + Duration::from_millis(13)),
            epoch + Duration::from_millis(20)
        );
        assert_eq!(
            scheduler.next_boundary(epoch + Duration::from_millis(20)),
            epoch + Duration::from_millis(30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_callback_fires_on_boundary() {
        let scheduler = ScheduleOnce::frame(Duration::from_millis(16));
        let start = Instant::now();
        let fired_at = Arc::new(parking_lot::Mutex::new(None));
        let f = fired_at.clone();
        scheduler.schedule(move || *f.lock() = Some(Instant::now()));

        assert!(fired_at.lock().is_none());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let at = fired_at.lock().expect("callback fired");
        assert!(at >= start + Duration::from_millis(16));
    }

    #[tokio::test]
    async fn test_microtask_runs_after_yield() {
        let scheduler = ScheduleOnce::microtask();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inline_without_runtime() {
        let scheduler = ScheduleOnce::microtask();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
