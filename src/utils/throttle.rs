//! Log throttling utility
//!
//! Keeps a flood of identical failures (a malfunctioning client, a gadget
//! that went away) from drowning the log.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Limits how often a message with a given key is logged
pub struct LogThrottler {
    /// Message key -> (last logged, suppressed since)
    last_logged: Mutex<HashMap<&'static str, (Instant, u32)>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` if a message for `key` should be logged now
    ///
    /// A `true` result restarts the interval for that key.
    pub fn should_log(&self, key: &'static str) -> bool {
        self.check(key).is_some()
    }

    /// Like [`should_log`](Self::should_log), but also returns how many
    /// messages were suppressed since the last one that got through
    pub fn check(&self, key: &'static str) -> Option<u32> {
        let now = Instant::now();
        let mut map = self.last_logged.lock();
        match map.entry(key) {
            Entry::Occupied(mut entry) => {
                let (last, suppressed) = entry.get_mut();
                if now.duration_since(*last) < self.interval {
                    *suppressed += 1;
                    return None;
                }
                *last = now;
                Some(std::mem::take(suppressed))
            }
            Entry::Vacant(entry) => {
                entry.insert((now, 0));
                Some(0)
            }
        }
    }

    /// Forget `key`, so the next failure is logged immediately
    pub fn clear(&self, key: &'static str) {
        self.last_logged.lock().remove(key);
    }
}

impl Default for LogThrottler {
    /// 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// Throttled `tracing::warn!`
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::warn!($($arg)*);
        }
    };
}

/// Throttled `tracing::debug!`
#[macro_export]
macro_rules! debug_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::debug!($($arg)*);
        }
    };
}
