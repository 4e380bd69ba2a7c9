//! Types used by the bridge context object.

use std::fmt;

use crate::batching::QueueState;

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// Constructed but not yet opened
    Created,
    /// Ensuring indexes exist
    Opening,
    /// Accepting writes and searches
    Ready,
    /// Draining the indexing queue
    Closing,
    /// Closed; writes and searches fail with `NotOpen`
    Closed,
}

impl BridgeState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BridgeState::Created => "Created",
            BridgeState::Opening => "Opening",
            BridgeState::Ready => "Ready",
            BridgeState::Closing => "Closing",
            BridgeState::Closed => "Closed",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeStatus {
    pub state: BridgeState,
    /// `None` until the queue has been started
    pub queue: Option<QueueState>,
    pub pending_items: usize,
    pub strict_consistency: bool,
}

impl BridgeStatus {
    /// Ready with nothing buffered or in flight.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.state == BridgeState::Ready
            && self.pending_items == 0
            && matches!(self.queue, Some(QueueState::Idle))
    }
}

/// A search page after entity loading.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPage<T> {
    /// Total matches in the engine, not just this page
    pub total_hits: u64,
    pub entities: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_state_display() {
        assert_eq!(format!("{}", BridgeState::Created), "Created");
        assert_eq!(format!("{}", BridgeState::Ready), "Ready");
        assert_eq!(format!("{}", BridgeState::Closing), "Closing");
    }

    #[test]
    fn test_quiescent_status() {
        let idle = BridgeStatus {
            state: BridgeState::Ready,
            queue: Some(QueueState::Idle),
            pending_items: 0,
            strict_consistency: false,
        };
        assert!(idle.is_quiescent());

        let busy = BridgeStatus {
            queue: Some(QueueState::Accumulating),
            pending_items: 3,
            ..idle.clone()
        };
        assert!(!busy.is_quiescent());

        let closed = BridgeStatus { state: BridgeState::Closed, queue: None, ..idle };
        assert!(!closed.is_quiescent());
    }
}
