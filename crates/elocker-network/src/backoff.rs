//! Reconnect delay schedule.

use elocker_core::constants::{RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY};
use std::time::Duration;

/// Doubling delay with an upper bound.
///
/// # Example
///
/// ```
/// use elocker_network::ReconnectBackoff;
/// use std::time::Duration;
///
/// let mut backoff = ReconnectBackoff::default();
/// assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    /// A `max` below `base` is raised to `base`.
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to wait now; the following call returns twice as much, capped.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the base delay after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RECONNECT_BASE_DELAY),
            Duration::from_millis(RECONNECT_MAX_DELAY),
        )
    }
}
