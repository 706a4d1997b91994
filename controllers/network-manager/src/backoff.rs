//! # Fibonacci Backoff
//!
//! Progressive delay between attempts of long-running background work such as
//! tenant cancellation. It grows more slowly than exponential backoff, so a task
//! that keeps failing is retried often at first without hammering the backends
//! once a dependency is down for a while.
//!
//! Sequence with `new(1, 10)`: 1s, 1s, 2s, 3s, 5s, 8s, 10s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at `max_secs`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous delay in seconds
    prev_secs: u64,
    /// Current delay in seconds
    current_secs: u64,
    /// Maximum delay in seconds
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with minimum and maximum values in seconds
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Get the next delay in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;

        let next = self.prev_secs + self.current_secs;
        self.prev_secs = self.current_secs;
        self.current_secs = std::cmp::min(next, self.max_secs);

        result
    }

    /// Get the next delay as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }
}
