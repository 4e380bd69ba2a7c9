// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write batching: the count/time accumulator and the indexing queue built on it.

pub mod hybrid_batcher;
pub mod queue;

pub use hybrid_batcher::{BatchConfig, FlushBatch, FlushReason, HybridBatcher};
pub use queue::{BulkFailure, FailureKind, IndexingQueue, QueueConfig, QueueState};
