//! # Fibonacci Backoff
//!
//! Progressive backoff for error-driven requeues. Grows more slowly than
//! exponential backoff, so an API server that is briefly unreachable is
//! retried quickly while a persistent fault settles at the cap.
//!
//! The sequence is expressed in multiples of the base interval:
//! base, base, 2×base, 3×base, 5×base, 8×base, … capped at `max`.

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, starting from `base` twice.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value
    prev: Duration,
    /// Current backoff value
    current: Duration,
    /// Maximum backoff value
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff starting at `base` and capped at `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            prev: Duration::ZERO,
            current: base.min(max),
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);

        result
    }
}
