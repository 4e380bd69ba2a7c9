// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for search-bridge.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `search_bridge_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `reason`: time, count, manual, shutdown
//! - `operation`: bulk, refresh, create_index, delete_index, health
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a batch flush
pub fn record_flush(reason: &str, count: usize) {
    counter!(
        "search_bridge_flushes_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    histogram!("search_bridge_batch_size").record(count as f64);
}

/// Record a bulk request outcome and latency
pub fn record_bulk(status: &str, duration: Duration) {
    counter!(
        "search_bridge_bulk_requests_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("search_bridge_bulk_seconds").record(duration.as_secs_f64());
}

/// Record a retried operation
pub fn record_retry(operation: &str) {
    counter!(
        "search_bridge_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record items that could not be delivered
pub fn record_bulk_failure(kind: &str, items: usize) {
    counter!(
        "search_bridge_bulk_failures_total",
        "kind" => kind.to_string()
    )
    .increment(1);
    counter!("search_bridge_undelivered_items_total").increment(items as u64);
}

/// Record an index refresh
pub fn record_refresh(index_count: usize, success: bool) {
    counter!(
        "search_bridge_refreshes_total",
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
    histogram!("search_bridge_refresh_indices").record(index_count as f64);
}

/// Set items waiting in the current batch
pub fn set_pending_items(count: usize) {
    gauge!("search_bridge_pending_items").set(count as f64);
}

/// Record a search request
pub fn record_search(status: &str, duration: Duration, hits: usize) {
    counter!(
        "search_bridge_searches_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("search_bridge_search_seconds").record(duration.as_secs_f64());
    histogram!("search_bridge_search_hits").record(hits as f64);
}

/// Record a search rejected for shard failures
pub fn record_shard_failures(count: usize) {
    counter!("search_bridge_shard_failures_total").increment(count as u64);
}

/// Record an index administration call
pub fn record_index_operation(operation: &str, success: bool) {
    counter!(
        "search_bridge_index_operations_total",
        "operation" => operation.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Set bridge lifecycle state
pub fn set_bridge_state(state: &str) {
    gauge!(
        "search_bridge_state",
        "state" => state.to_string()
    )
    .set(1.0);
}

/// A timing guard that records operation latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(
            "search_bridge_operation_seconds",
            "operation" => self.operation
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}
