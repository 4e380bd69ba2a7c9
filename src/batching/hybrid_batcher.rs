// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Count/time batching.
//!
//! The [`HybridBatcher`] accumulates items in FIFO order and reports when a
//! batch should be flushed: as soon as the item count reaches
//! `flush_count`, or once the oldest pending item is older than `flush_ms`.
//! It is a plain data structure; locking and timers live in
//! [`IndexingQueue`](super::queue::IndexingQueue).
//!
//! # Example
//!
//! ```
//! use search_bridge::batching::{HybridBatcher, BatchConfig, FlushReason};
//!
//! let mut batcher: HybridBatcher<u32> = HybridBatcher::new(BatchConfig {
//!     flush_ms: 3_000,
//!     flush_count: 2,
//! });
//!
//! assert!(batcher.push(1).is_none());
//! assert_eq!(batcher.push(2), Some(FlushReason::Count));
//!
//! let batch = batcher.take(FlushReason::Count).unwrap();
//! assert_eq!(batch.items, vec![1, 2]);
//! assert!(batcher.is_empty());
//! ```

use std::time::{Duration, Instant};
use tracing::debug;

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Periodic timer fired with pending items
    Time,
    /// Item count threshold reached
    Count,
    /// Caller asked for a flush
    Manual,
    /// Final drain on stop
    Shutdown,
}

impl FlushReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FlushReason::Time => "time",
            FlushReason::Count => "count",
            FlushReason::Manual => "manual",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

/// Batch thresholds.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Flush interval in milliseconds
    pub flush_ms: u64,
    /// Flush once this many items are pending
    pub flush_count: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_ms: 3_000,
            flush_count: 100,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_ms.max(1))
    }
}

/// A batch swapped out of the batcher, ready for the writer.
#[derive(Debug)]
pub struct FlushBatch<T> {
    pub items: Vec<T>,
    pub reason: FlushReason,
    /// How long the oldest item waited
    pub age: Duration,
}

impl<T> FlushBatch<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Pending items plus the instant the first one arrived.
#[derive(Debug)]
struct Pending<T> {
    items: Vec<T>,
    first_at: Option<Instant>,
}

impl<T> Pending<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            first_at: None,
        }
    }

    fn age(&self) -> Duration {
        self.first_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

/// Accumulates items until a count or time threshold is hit.
pub struct HybridBatcher<T> {
    config: BatchConfig,
    pending: Pending<T>,
}

impl<T> HybridBatcher<T> {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            pending: Pending::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Append an item; returns `Some(Count)` when the batch is full.
    pub fn push(&mut self, item: T) -> Option<FlushReason> {
        if self.pending.items.is_empty() {
            self.pending.first_at = Some(Instant::now());
        }
        self.pending.items.push(item);

        if self.pending.items.len() >= self.config.flush_count {
            Some(FlushReason::Count)
        } else {
            None
        }
    }

    /// Whether the oldest pending item has waited a full interval.
    #[must_use]
    pub fn should_flush_time(&self) -> bool {
        !self.pending.items.is_empty() && self.pending.age() >= self.config.flush_interval()
    }

    /// Swap out the pending items, leaving an empty batch behind.
    /// Returns `None` when there is nothing to flush.
    pub fn take(&mut self, reason: FlushReason) -> Option<FlushBatch<T>> {
        if self.pending.items.is_empty() {
            return None;
        }
        let old = std::mem::replace(&mut self.pending, Pending::new());
        let age = old.age();
        debug!(count = old.items.len(), reason = reason.as_str(), "Batch swapped out for flush");
        Some(FlushBatch {
            items: old.items,
            reason,
            age,
        })
    }

    /// Take the batch only if a threshold has been reached.
    pub fn take_if_ready(&mut self) -> Option<FlushBatch<T>> {
        if self.pending.items.len() >= self.config.flush_count {
            self.take(FlushReason::Count)
        } else if self.should_flush_time() {
            self.take(FlushReason::Time)
        } else {
            None
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.items.is_empty()
    }
}
