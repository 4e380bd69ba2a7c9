//! Configuration for the search bridge.
//!
//! # Example
//!
//! ```
//! use search_bridge::BridgeConfig;
//!
//! // Minimal config (uses defaults)
//! let config = BridgeConfig::default();
//! assert_eq!(config.batch_flush_count, 100);
//! assert_eq!(config.max_page_size, 200);
//!
//! // Strict consistency for test harnesses
//! let config = BridgeConfig {
//!     engine_url: "http://search:9200".into(),
//!     strict_consistency: true,
//!     batch_flush_ms: 500,
//!     ..Default::default()
//! };
//! assert!(config.strict_consistency);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::batching::{BatchConfig, QueueConfig};
use crate::resilience::retry::RetryConfig;
use crate::schema::SchemaConfig;

/// Configuration for the search bridge.
///
/// All fields have defaults; `schema` must list every entity that is
/// indexed or searched.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Engine REST endpoint (e.g., "http://localhost:9200")
    #[serde(default = "default_engine_url")]
    pub engine_url: String,

    /// Per-request timeout for every engine call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Batch flush settings
    #[serde(default = "default_batch_flush_count")]
    pub batch_flush_count: usize,
    #[serde(default = "default_batch_flush_ms")]
    pub batch_flush_ms: u64,

    /// Block each flush until written and refreshed
    #[serde(default)]
    pub strict_consistency: bool,

    /// Upper bound on hits per search
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// How long index creation waits for yellow health
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// Bulk retry policy
    #[serde(default = "default_bulk_max_retries")]
    pub bulk_max_retries: usize,
    #[serde(default = "default_bulk_initial_backoff_ms")]
    pub bulk_initial_backoff_ms: u64,
    #[serde(default = "default_bulk_max_backoff_ms")]
    pub bulk_max_backoff_ms: u64,

    /// Buffered failures per subscriber before the oldest are dropped
    #[serde(default = "default_failure_channel_capacity")]
    pub failure_channel_capacity: usize,

    /// Index for entities that do not name one
    #[serde(default = "default_index_name")]
    pub default_index_name: String,

    /// Drop and recreate every configured index on open (development)
    #[serde(default)]
    pub recreate_indexes_on_open: bool,

    #[serde(default)]
    pub schema: SchemaConfig,
}

fn default_engine_url() -> String { "http://localhost:9200".to_string() }
fn default_request_timeout_ms() -> u64 { 30_000 }
fn default_batch_flush_count() -> usize { 100 }
fn default_batch_flush_ms() -> u64 { 3_000 }
fn default_max_page_size() -> usize { 200 }
fn default_health_timeout_ms() -> u64 { 30_000 }
fn default_bulk_max_retries() -> usize { 5 }
fn default_bulk_initial_backoff_ms() -> u64 { 200 }
fn default_bulk_max_backoff_ms() -> u64 { 5_000 }
fn default_failure_channel_capacity() -> usize { 64 }
fn default_index_name() -> String { "search_bridge".to_string() }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine_url: default_engine_url(),
            request_timeout_ms: default_request_timeout_ms(),
            batch_flush_count: default_batch_flush_count(),
            batch_flush_ms: default_batch_flush_ms(),
            strict_consistency: false,
            max_page_size: default_max_page_size(),
            health_timeout_ms: default_health_timeout_ms(),
            bulk_max_retries: default_bulk_max_retries(),
            bulk_initial_backoff_ms: default_bulk_initial_backoff_ms(),
            bulk_max_backoff_ms: default_bulk_max_backoff_ms(),
            failure_channel_capacity: default_failure_channel_capacity(),
            default_index_name: default_index_name(),
            recreate_indexes_on_open: false,
            schema: SchemaConfig::default(),
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    #[must_use]
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            flush_ms: self.batch_flush_ms,
            flush_count: self.batch_flush_count.max(1),
        }
    }

    #[must_use]
    pub fn bulk_retry(&self) -> RetryConfig {
        RetryConfig::new(
            self.bulk_max_retries,
            Duration::from_millis(self.bulk_initial_backoff_ms),
            Duration::from_millis(self.bulk_max_backoff_ms),
        )
    }

    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            batch: self.batch_config(),
            strict: self.strict_consistency,
            bulk_retry: self.bulk_retry(),
            failure_capacity: self.failure_channel_capacity,
        }
    }
}
