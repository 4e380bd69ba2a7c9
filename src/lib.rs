//! # Search Bridge
//!
//! Bridges an application's indexing and search calls to an external
//! document-search engine.
//!
//! ## Architecture
//!
//! Writes are batched into bulk requests; searches are translated from a
//! boolean/wildcard query tree into the engine's query DSL:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SearchBridge                         │
//! │  • open()/close() lifecycle, watchable state               │
//! │  • Schema resolved once from BridgeConfig                  │
//! └─────────────────────────────────────────────────────────────┘
//!          │ enqueue(WorkItem)                 │ search(QueryNode)
//!          ▼                                   ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │      IndexingQueue        │   │      QueryTranslator      │
//! │  • Flush by count or time │   │  • Analyzed vs raw fields │
//! │  • Ordered bulk writes    │   │  • Empty groups match all │
//! │  • Retry, failure channel │   └───────────────────────────┘
//! │  • Strict mode: refresh   │                │
//! └───────────────────────────┘                ▼
//!          │                      ┌───────────────────────────┐
//!          │                      │      SearchExecutor       │
//!          │                      │  • Type filter, sort, page│
//!          │                      │  • Hits → EntityReference │
//!          │                      └───────────────────────────┘
//!          ▼                                   │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SearchTransport                        │
//! │  • HttpTransport (REST) or InMemoryTransport (tests)       │
//! │  • IndexSchemaManager: idempotent create + yellow health   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use search_bridge::{BridgeConfig, QueryNode, SearchBridge, SortSpec, WorkItem};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> search_bridge::Result<()> {
//!     let config: BridgeConfig = serde_json::from_value(json!({
//!         "engine_url": "http://localhost:9200",
//!         "schema": { "entities": [
//!             { "name": "Person", "index": "people", "id_field": "id",
//!               "fields": [ { "name": "name" }, { "name": "gender", "analyzed": false } ] }
//!         ] }
//!     }))
//!     .expect("valid config");
//!
//!     let bridge = SearchBridge::new(config)?;
//!     bridge.open().await?;
//!
//!     bridge
//!         .enqueue(WorkItem::add("Person", "42").with_field("name", json!("Ada Lovelace")))
//!         .await?;
//!     bridge.flush_and_wait().await?;
//!
//!     let query = QueryNode::boolean().must(QueryNode::wildcard("name", "ada*")).build();
//!     let refs = bridge.search(&query, "Person", &SortSpec::new(), 0, 10).await?;
//!     println!("{refs:?}");
//!
//!     bridge.close().await
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`BridgeConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SearchBridge`] context object
//! - [`search`]: Query model, translation, index management, search execution
//! - [`batching`]: Hybrid batcher and the indexing queue
//! - [`schema`]: Entity descriptors and physical field naming
//! - [`transport`]: Engine transport seam (HTTP, in-memory)
//! - [`resilience`]: Retry with exponential backoff

pub mod batching;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod resilience;
pub mod schema;
pub mod search;
pub mod transport;
pub mod work_item;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use batching::{BatchConfig, BulkFailure, FailureKind, FlushReason, IndexingQueue, QueueState};
pub use config::BridgeConfig;
pub use coordinator::{BridgeState, BridgeStatus, LoadedPage, SearchBridge};
pub use error::{BridgeError, Result};
pub use metrics::LatencyTimer;
pub use resilience::retry::RetryConfig;
pub use schema::{
    FieldMapping, FieldType, IdType, IndexDescriptor, SchemaConfig, SchemaError, SchemaResolver,
    StaticSchemaResolver,
};
pub use search::{
    Clause, EntityId, EntityLoader, EntityReference, IndexSchemaManager, Occur, QueryNode,
    QueryTranslator, SearchExecutor, SearchPage, SearchQuery, SortSpec, TargetQuery,
};
pub use transport::{HttpTransport, InMemoryTransport, SearchTransport, TransportError};
pub use work_item::{WorkItem, WorkKind};
