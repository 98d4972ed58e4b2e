//! Poll delays.

use std::time::Duration;

/// Exponential poll delays: starts at the initial backoff and doubles up to
/// a tenth of the timeout.
///
/// For a 30s timeout and a 0.5s initial backoff this yields
/// `0.5, 1, 2, 3, 3, ...`. The sequence never ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    next: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, timeout: Duration) -> Self {
        let cap = timeout / 10;
        Self {
            next: initial.min(cap),
            cap,
        }
    }

    /// Upper bound of every delay.
    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Returns the current delay and advances to the next one.
    pub fn advance(&mut self) -> Duration {
        let current = self.next;
        self.next = self.next.saturating_mul(2).min(self.cap);
        current
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.advance())
    }
}
