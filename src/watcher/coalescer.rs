//! Per-cycle coalescing of change events.
//!
//! The watch source forwards at most one change per polling cycle. Bursts
//! collapse into the first change of the cycle.

use super::event::ChangeEvent;

/// Holds at most one pending change event.
#[derive(Debug, Default)]
pub struct Coalescer {
    /// The first change recorded since the last take.
    pending: Option<ChangeEvent>,
    /// Changes folded into a pending one since creation.
    coalesced: u64,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change event.
    ///
    /// Returns `false` when a change is already pending and this one was
    /// folded into it.
    pub fn record(&mut self, event: ChangeEvent) -> bool {
        if self.pending.is_some() {
            self.coalesced += 1;
            return false;
        }
        self.pending = Some(event);
        true
    }

    /// Take the pending change, leaving the slot empty.
    pub fn take_ready(&mut self) -> Option<ChangeEvent> {
        self.pending.take()
    }

    pub fn coalesced_count(&self) -> u64 {
        self.coalesced
    }
}
