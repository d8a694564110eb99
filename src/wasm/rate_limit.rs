//! A small per-kind token bucket so failed-call logging doesn't flood the
//! log on a persistently broken module (`spec.md` §7: "logged at debug
//! with rate limiting"). Hand-rolled atomics, in the texture of
//! `promptkit-executor::resource::MemoryLimiter` -- the pack has no shared
//! crate for this and the teacher inlines small guards like this itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct RateLimiter {
    min_interval: Duration,
    last: AtomicU64,
    epoch: Instant,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Returns `true` if a log event should be emitted now, and records
    /// that one was.
    pub fn allow(&self) -> bool {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last.load(Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        let min_interval_ms = self.min_interval.as_millis() as u64;
        if now.saturating_sub(last) < min_interval_ms {
            return false;
        }
        self.last
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}
