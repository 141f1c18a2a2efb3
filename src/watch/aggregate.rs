//! Change coalescing for watch mode

use std::time::Duration;

use tokio::time::Instant;

/// Collects change notifications and reports when a rebuild is due.
///
/// A rebuild is due once `timeout` has elapsed since the most recent change.
/// Every change pushes the deadline back, so a burst yields a single rebuild.
#[derive(Debug, Clone)]
pub struct ChangeAggregator {
    timeout: Duration,
    last_change: Option<Instant>,
    pending: usize,
}

impl ChangeAggregator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_change: None,
            pending: 0,
        }
    }

    /// Record a change observed at `now`
    pub fn record(&mut self, now: Instant) {
        self.last_change = Some(match self.last_change {
            Some(last) if last > now => last,
            _ => now,
        });
        self.pending += 1;
    }

    /// When the pending changes become due, if there are any
    pub fn deadline(&self) -> Option<Instant> {
        self.last_change.map(|last| last + self.timeout)
    }

    /// If the deadline has passed, reset and return the number of coalesced changes
    pub fn take_due(&mut self, now: Instant) -> Option<usize> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                let changes = self.pending;
                self.last_change = None;
                self.pending = 0;
                Some(changes)
            }
            _ => None,
        }
    }
}
