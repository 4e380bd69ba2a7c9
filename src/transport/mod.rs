// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine transports
//!
//! ```text
//! SearchTransport (trait)
//!     ├─→ HttpTransport      → REST (_bulk, _refresh, _search, index admin)
//!     └─→ InMemoryTransport  → DashMap-backed engine for tests/embedding
//! ```

pub mod http;
pub mod memory;
pub mod traits;

pub use http::HttpTransport;
pub use memory::{InMemoryTransport, RecordedRequest};
pub use traits::{
    BulkItemFailure, BulkOperation, BulkResponse, ClusterHealth, CreateIndexOutcome,
    HealthStatus, SearchHit, SearchRequest, SearchResponse, SearchTransport, ShardFailure,
    SortField, TransportError,
};
