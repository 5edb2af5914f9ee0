//! Transfer completion tracking.
//!
//! Counts transfers awaiting completion so the dispatcher knows when the
//! last one has finished and the circuit can go.

use metrics::counter;

/// Counter of transfers pending completion for one batch.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    pending: u64,
}

impl ProgressTracker {
    /// Create a tracker with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected count of transfers awaiting completion, computed
    /// from the reachable count of the size aggregation.
    pub fn set_pending(&mut self, pending: u64) {
        self.pending = pending;
    }

    /// Transfers still awaiting completion.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Record one finished transfer and return the remaining count.
    ///
    /// Decrementing below zero is a logic error in the caller's event
    /// stream; the count is floored at 0 with a warning rather than
    /// crashing.
    pub fn on_transfer_finish(&mut self) -> u64 {
        match self.pending.checked_sub(1) {
            Some(remaining) => {
                self.pending = remaining;
            }
            None => {
                tracing::warn!(
                    "Transfer finished with no transfers pending, completion count stays at 0"
                );
                counter!("lightpath_progress_underflow_total").increment(1);
            }
        }
        self.pending
    }
}
