//! # Connect Backoff
//!
//! Fibonacci backoff between attempts to reach the agent socket.
//! Delays are kept in milliseconds and capped low: the agent either comes up
//! within a few seconds or the proxy gives up and retries on its next pass.
//! Sequence with the defaults: 100ms, 100ms, 200ms, 300ms, 500ms, 800ms, 1s (max).

use std::time::Duration;

/// Default first delay in milliseconds
pub const DEFAULT_MIN_MILLIS: u64 = 100;
/// Default delay cap in milliseconds
pub const DEFAULT_MAX_MILLIS: u64 = 1_000;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at `max_millis`.
#[derive(Debug, Clone)]
pub struct ConnectBackoff {
    min_millis: u64,
    prev_millis: u64,
    current_millis: u64,
    max_millis: u64,
}

impl ConnectBackoff {
    /// Create a backoff starting at `min_millis` and capped at `max_millis`
    #[must_use]
    pub fn new(min_millis: u64, max_millis: u64) -> Self {
        Self {
            min_millis,
            prev_millis: 0,
            current_millis: min_millis,
            max_millis,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_delay(&mut self) -> Duration {
        let result = self.current_millis;
        let next = self.prev_millis + self.current_millis;
        self.prev_millis = self.current_millis;
        self.current_millis = std::cmp::min(next, self.max_millis);
        Duration::from_millis(result)
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_millis = 0;
        self.current_millis = self.min_millis;
    }
}

impl Default for ConnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_MILLIS, DEFAULT_MAX_MILLIS)
    }
}
