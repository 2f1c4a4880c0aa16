//! Trailing-edge debouncing
//!
//! Collapses a burst of raw filesystem events into a single change signal.
//! A burst settles once no event has arrived for `window`; a burst that never
//! settles is cut after `max_delay` so recomputations keep happening under
//! continuous writes.

use std::time::Duration;
use tokio::time::Instant;

/// Burst tracker driven by the watcher's event loop
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    max_delay: Duration,
    /// First event of the pending burst
    first: Option<Instant>,
    /// Most recent event of the pending burst
    last: Option<Instant>,
}

impl Debouncer {
    /// Create a debouncer; `max_delay` is raised to at least `window`
    pub fn new(window: Duration, max_delay: Duration) -> Self {
        Self {
            window,
            max_delay: max_delay.max(window),
            first: None,
            last: None,
        }
    }

    /// Record a raw event observed at `now`
    pub fn record(&mut self, now: Instant) {
        if self.first.is_none() {
            self.first = Some(now);
        }
        self.last = Some(now);
    }

    /// Whether a burst is waiting to settle
    pub fn is_pending(&self) -> bool {
        self.first.is_some()
    }

    /// When the pending burst should fire, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        let first = self.first?;
        let last = self.last.unwrap_or(first);
        Some((last + self.window).min(first + self.max_delay))
    }

    /// Fire the pending burst if its deadline has passed
    ///
    /// Returns true exactly once per burst.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if deadline <= now => {
                self.first = None;
                self.last = None;
                true
            }
            _ => false,
        }
    }
}
