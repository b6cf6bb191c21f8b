//! Rate limiting for "records dropped" warnings.
//!
//! Drops are counted on every call; a warning carrying the accumulated count
//! is emitted at most once per interval. Timing uses the monotonic clock, so
//! wall-clock jumps on the relay host neither suppress nor flood warnings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default minimum interval between drop warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Drop counter with a minimum spacing between warnings.
#[derive(Debug)]
pub struct RateLimitedWarner {
    dropped: AtomicU64,
    last_warn: Mutex<Option<Instant>>,
    interval: Duration,
}

impl RateLimitedWarner {
    /// The first warning is never held back.
    pub fn new(interval: Duration) -> Self {
        Self {
            dropped: AtomicU64::new(0),
            last_warn: Mutex::new(None),
            interval,
        }
    }

    /// Minimum spacing between warnings.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drops counted since the last warning.
    pub fn pending(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Count one dropped record.
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Call `warn` with the pending count if the interval has elapsed.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = Instant::now();
        let mut last = self.last_warn.lock();
        let due = last.is_none_or(|at| now.duration_since(at) >= self.interval);
        if !due {
            return;
        }
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            *last = Some(now);
            warn(count);
        }
    }

    /// Call `warn` with the pending count regardless of the interval.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let mut last = self.last_warn.lock();
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            *last = Some(Instant::now());
            warn(count);
        }
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn collect(warner: &RateLimitedWarner) -> Option<u64> {
        let mut seen = None;
        warner.warn_if_due(|count| seen = Some(count));
        seen
    }

    #[test]
    fn first_drop_warns_immediately() {
        let warner = RateLimitedWarner::default();
        warner.record_drop();
        assert_eq!(collect(&warner), Some(1));
        assert_eq!(warner.pending(), 0);
    }

    #[test]
    fn later_drops_accumulate_until_the_interval_passes() {
        let warner = RateLimitedWarner::new(Duration::from_millis(40));
        warner.record_drop();
        assert_eq!(collect(&warner), Some(1));

        warner.record_drop();
        warner.record_drop();
        assert_eq!(collect(&warner), None);
        assert_eq!(warner.pending(), 2);

        thread::sleep(Duration::from_millis(60));
        assert_eq!(collect(&warner), Some(2));
    }

    #[test]
    fn no_warning_without_drops() {
        let warner = RateLimitedWarner::new(Duration::ZERO);
        assert_eq!(collect(&warner), None);
        let mut flushed = None;
        warner.flush(|count| flushed = Some(count));
        assert_eq!(flushed, None);
    }

    #[test]
    fn flush_ignores_the_interval() {
        let warner = RateLimitedWarner::new(Duration::from_secs(3600));
        warner.record_drop();
        assert_eq!(collect(&warner), Some(1));
        warner.record_drop();
        let mut flushed = None;
        warner.flush(|count| flushed = Some(count));
        assert_eq!(flushed, Some(1));
    }
}
