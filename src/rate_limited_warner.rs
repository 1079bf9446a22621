//! Rate-limited warning helper for repeated pipeline failures.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// How often to emit warnings about dropped or rejected entries.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Coalesces repeated failures into periodic summary warnings.
///
/// The caller counts events via [`record`](Self::record). The next call to
/// [`warn_if_due`](Self::warn_if_due) emits a warning through the provided
/// callback if the interval has elapsed since the previous one.
/// [`flush`](Self::flush) emits immediately if anything was counted.
pub struct RateLimitedWarner {
    origin: Instant,
    interval_ms: u64,
    next_due_ms: AtomicU64,
    count: AtomicU64,
}

impl RateLimitedWarner {
    /// Create a new warner. The first warning can be emitted immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            next_due_ms: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Increment the event counter.
    pub fn record(&self) {
        self.record_many(1);
    }

    /// Count `events` occurrences at once.
    pub fn record_many(&self, events: u64) {
        self.count.fetch_add(events, Ordering::Relaxed);
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = self.now_ms();
        let due = self.next_due_ms.load(Ordering::Relaxed);
        if now < due {
            return;
        }
        let next = now.saturating_add(self.interval_ms);
        if self
            .next_due_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            // Another thread claimed this interval.
            return;
        }
        let count = self.count.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
        }
    }

    /// Immediately warn about any counted events.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let count = self.count.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.next_due_ms
                .store(self.now_ms().saturating_add(self.interval_ms), Ordering::Relaxed);
        }
    }

    /// Events counted since the last emitted warning.
    pub fn pending(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
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
    use rstest::rstest;

    #[rstest]
    fn emits_first_warning_immediately() {
        let warner = RateLimitedWarner::default();
        let mut warnings = Vec::new();
        warner.record();
        warner.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
    }

    #[rstest]
    fn rate_limits_subsequent_warnings() {
        let warner = RateLimitedWarner::default();
        let mut warnings = Vec::new();
        warner.record();
        warner.warn_if_due(|c| warnings.push(c));
        warner.record();
        warner.record();
        warner.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
        assert_eq!(warner.pending(), 2);
    }

    #[rstest]
    fn zero_interval_never_suppresses() {
        let warner = RateLimitedWarner::new(Duration::ZERO);
        let mut warnings = Vec::new();
        for _ in 0..3 {
            warner.record();
            warner.warn_if_due(|c| warnings.push(c));
        }
        assert_eq!(warnings, vec![1, 1, 1]);
    }

    #[rstest]
    fn flush_emits_pending_warning() {
        let warner = RateLimitedWarner::default();
        let mut warnings = Vec::new();
        warner.record();
        warner.warn_if_due(|_| {});
        warner.record();
        warner.flush(|c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
        warner.flush(|c| warnings.push(c));
        assert_eq!(warnings, vec![1], "nothing left to flush");
    }

    #[rstest]
    fn record_many_counts_every_event() {
        let warner = RateLimitedWarner::default();
        let mut warnings = Vec::new();
        warner.record_many(3);
        warner.record();
        warner.flush(|c| warnings.push(c));
        assert_eq!(warnings, vec![4]);
    }
}
