//! Per-key rate limiting for bursty push messages.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Default minimum spacing between accepted messages per key.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

/// Drops messages that arrive within `window` of the last accepted one for
/// the same key.
///
/// Dropped messages are not replayed; the next accepted message carries the
/// latest state.
#[derive(Debug)]
pub struct Throttle<K> {
    window: Duration,
    last_accepted: HashMap<K, Instant>,
}

impl<K: Eq + Hash> Throttle<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// Returns `true` and records `now` if a message for `key` may pass.
    pub fn accept(&mut self, key: K, now: Instant) -> bool {
        match self.last_accepted.get(&key) {
            Some(last) if now.saturating_duration_since(*last) < self.window => false,
            _ => {
                self.last_accepted.insert(key, now);
                true
            }
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn clear(&mut self) {
        self.last_accepted.clear();
    }
}

impl<K: Eq + Hash> Default for Throttle<K> {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE)
    }
}
