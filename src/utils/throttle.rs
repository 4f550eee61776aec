//! Log throttling utility
//!
//! Limits how often the same log message is recorded, so a camera that keeps
//! timing out does not flood the log.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Log throttler that limits how often the same message is logged
///
/// ```rust
/// use camhub::utils::LogThrottler;
/// use std::time::Duration;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
/// assert_eq!(throttler.check("capture_timeout"), Some(0));
/// assert_eq!(throttler.check("capture_timeout"), None);
/// ```
pub struct LogThrottler {
    /// Per key: last time the message was let through and how many were swallowed since
    entries: Mutex<HashMap<String, (Instant, u64)>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            interval,
        }
    }

    /// `Some(suppressed)` if the message for `key` should be logged now,
    /// where `suppressed` counts the messages swallowed since the last one
    /// let through. `None` while the interval has not elapsed.
    pub fn check(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some((last, suppressed)) if now.duration_since(*last) < self.interval => {
                *suppressed = suppressed.saturating_add(1);
                None
            }
            Some((last, suppressed)) => {
                *last = now;
                Some(std::mem::take(suppressed))
            }
            None => {
                entries.insert(key.to_string(), (now, 0));
                Some(0)
            }
        }
    }

    /// Forget `key`, so the next occurrence is logged immediately.
    /// Call when the error condition recovers.
    pub fn clear(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Throttled `tracing::warn!`
///
/// Emits at most once per interval for `key`. Each emitted event carries a
/// `suppressed` field counting the occurrences swallowed since the last one.
///
/// ```rust
/// use camhub::utils::LogThrottler;
/// use camhub::warn_throttled;
/// use std::time::Duration;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
/// warn_throttled!(throttler, "my_error", "Error occurred: {}", "details");
/// ```
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)+) => {
        if let Some(suppressed) = $throttler.check($key) {
            tracing::warn!(suppressed, $($arg)+);
        }
    };
}
