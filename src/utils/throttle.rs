//! Log throttling utility
//!
//! Limits how often the same message is recorded, so a signaling outage
//! does not flood the log with one line per dropped message.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Log throttler that limits how often the same message is logged
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use dbmeter_agent::utils::LogThrottler;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
///
/// assert!(throttler.should_log("channel_closed"));
/// assert!(!throttler.should_log("channel_closed"));
/// ```
pub struct LogThrottler {
    /// Map of message key to last log time
    last_logged: RwLock<HashMap<String, Instant>>,
    /// Throttle interval
    interval: Duration,
}

impl LogThrottler {
    /// Create a new log throttler with the specified interval
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: RwLock::new(HashMap::new()),
            interval,
        }
    }

    /// Create a new log throttler with interval specified in seconds
    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` if the message should be logged and records the time.
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();

        {
            let map = self.last_logged.read();
            if let Some(last) = map.get(key) {
                if now.duration_since(*last) < self.interval {
                    return false;
                }
            }
        }

        let mut map = self.last_logged.write();
        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key.to_string(), now);
        true
    }

    /// Clear throttle state for a specific key
    ///
    /// Called when the condition recovers, so the next occurrence is logged immediately.
    pub fn clear(&self, key: &str) {
        self.last_logged.write().remove(key);
    }

    /// Get the number of tracked keys
    pub fn len(&self) -> usize {
        self.last_logged.read().len()
    }

    /// Check if the throttler is empty
    pub fn is_empty(&self) -> bool {
        self.last_logged.read().is_empty()
    }
}

impl Default for LogThrottler {
    /// Create a default log throttler with 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// Macro for throttled warning logging
///
/// # Example
///
/// ```rust
/// use dbmeter_agent::utils::LogThrottler;
/// use dbmeter_agent::warn_throttled;
///
/// let throttler = LogThrottler::default();
/// warn_throttled!(throttler, "send_dropped", "Dropping message: {}", "channel closed");
/// ```
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::warn!($($arg)*);
        }
    };
}
