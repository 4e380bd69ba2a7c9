//! Engine transport contract and wire types.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::schema::TYPE_FIELD;
use crate::search::TargetQuery;

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("index '{0}' not found")]
    NotFound(String),
    #[error("malformed engine response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Connection problems, timeouts, throttling and server errors are transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection(_) | TransportError::Timeout(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::NotFound(_) | TransportError::Decode(_) => false,
        }
    }
}

/// One action of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Index {
        index: String,
        doc_type: String,
        id: String,
        source: Map<String, Value>,
    },
    Delete {
        index: String,
        doc_type: String,
        id: String,
    },
}

impl BulkOperation {
    #[must_use]
    pub fn index(&self) -> &str {
        match self {
            BulkOperation::Index { index, .. } | BulkOperation::Delete { index, .. } => index,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index { id, .. } | BulkOperation::Delete { id, .. } => id,
        }
    }

    /// Action line (and source line for index actions) of the NDJSON body.
    /// The source carries the document type in [`TYPE_FIELD`].
    pub fn write_ndjson(&self, out: &mut String) {
        match self {
            BulkOperation::Index { index, doc_type, id, source } => {
                out.push_str(&json!({ "index": { "_index": index, "_id": id } }).to_string());
                out.push('\n');
                let mut doc = source.clone();
                doc.insert(TYPE_FIELD.to_string(), Value::String(doc_type.clone()));
                out.push_str(&Value::Object(doc).to_string());
                out.push('\n');
            }
            BulkOperation::Delete { index, id, .. } => {
                out.push_str(&json!({ "delete": { "_index": index, "_id": id } }).to_string());
                out.push('\n');
            }
        }
    }
}

/// Build the NDJSON body for a whole bulk request, in operation order.
#[must_use]
pub fn bulk_body(ops: &[BulkOperation]) -> String {
    let mut body = String::new();
    for op in ops {
        op.write_ndjson(&mut body);
    }
    body
}

/// A document the engine rejected inside an otherwise accepted bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    /// Position of the operation in the request
    pub position: usize,
    pub id: String,
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub took_ms: u64,
    pub failures: Vec<BulkItemFailure>,
}

impl BulkResponse {
    /// Decode a `_bulk` response body.
    ///
    /// Deletes of missing documents (`404` / `not_found`) are not failures.
    pub fn from_json(body: &Value) -> Result<Self, TransportError> {
        let took_ms = body.get("took").and_then(Value::as_u64).unwrap_or(0);
        let mut failures = Vec::new();

        if body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            let items = body
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| TransportError::Decode("bulk response without items".into()))?;

            for (position, item) in items.iter().enumerate() {
                let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
                    continue;
                };
                let Some(error) = result.get("error") else {
                    continue;
                };
                failures.push(BulkItemFailure {
                    position,
                    id: result.get("_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    status: result.get("status").and_then(Value::as_u64).unwrap_or(0) as u16,
                    reason: error_reason(error),
                });
            }
        }

        Ok(Self { took_ms, failures })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of an index creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateIndexOutcome {
    Created { acknowledged: bool },
    AlreadyExists,
}

/// Engine-reported readiness, ordered `Red < Yellow < Green`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    Red,
    Yellow,
    Green,
}

impl HealthStatus {
    pub fn parse(s: &str) -> Result<Self, TransportError> {
        match s {
            "green" => Ok(HealthStatus::Green),
            "yellow" => Ok(HealthStatus::Yellow),
            "red" => Ok(HealthStatus::Red),
            other => Err(TransportError::Decode(format!("unknown health status '{}'", other))),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterHealth {
    pub status: HealthStatus,
    pub timed_out: bool,
}

/// Physical sort entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub ascending: bool,
}

/// A fully resolved search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    /// Document types to restrict hits to (empty = any)
    pub doc_types: Vec<String>,
    pub query: TargetQuery,
    pub sort: Vec<SortField>,
    pub from: usize,
    pub size: usize,
}

impl SearchRequest {
    /// Request body for `POST /{index}/_search`.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let query = if self.doc_types.is_empty() {
            self.query.to_json()
        } else {
            json!({
                "bool": {
                    "must": [self.query.to_json()],
                    "filter": [{ "terms": { TYPE_FIELD: self.doc_types } }],
                }
            })
        };

        let sort: Vec<Value> = self
            .sort
            .iter()
            .map(|s| {
                let mut entry = Map::new();
                entry.insert(
                    s.field.clone(),
                    json!({ "order": if s.ascending { "asc" } else { "desc" } }),
                );
                Value::Object(entry)
            })
            .collect();

        let mut body = json!({
            "query": query,
            "from": self.from,
            "size": self.size,
            "_source": [TYPE_FIELD],
        });
        if !sort.is_empty() {
            body["sort"] = Value::Array(sort);
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardFailure {
    pub index: Option<String>,
    pub shard: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub index: String,
    /// Document type name, if the engine reported one
    pub doc_type: Option<String>,
    pub id: String,
    pub score: Option<f64>,
    pub sort: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub total_hits: u64,
    pub shard_failures: Vec<ShardFailure>,
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    /// Decode a `_search` response body.
    pub fn from_json(body: &Value) -> Result<Self, TransportError> {
        let shard_failures = body
            .pointer("/_shards/failures")
            .and_then(Value::as_array)
            .map(|failures| {
                failures
                    .iter()
                    .map(|f| ShardFailure {
                        index: f.get("index").and_then(Value::as_str).map(str::to_string),
                        shard: f.get("shard").and_then(Value::as_i64),
                        reason: f.get("reason").map(error_reason).unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let hits_obj = body
            .get("hits")
            .ok_or_else(|| TransportError::Decode("search response without hits".into()))?;

        let total_hits = match hits_obj.get("total") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(total) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
            None => 0,
        };

        let mut hits = Vec::new();
        for hit in hits_obj.get("hits").and_then(Value::as_array).into_iter().flatten() {
            let id = hit
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| TransportError::Decode("hit without _id".into()))?;
            let doc_type = hit
                .pointer(&format!("/_source/{}", TYPE_FIELD))
                .and_then(Value::as_str)
                .or_else(|| hit.get("_type").and_then(Value::as_str).filter(|t| *t != "_doc"))
                .map(str::to_string);
            hits.push(SearchHit {
                index: hit.get("_index").and_then(Value::as_str).unwrap_or_default().to_string(),
                doc_type,
                id: id.to_string(),
                score: hit.get("_score").and_then(Value::as_f64),
                sort: hit.get("sort").and_then(Value::as_array).cloned().unwrap_or_default(),
            });
        }

        Ok(Self {
            total_hits,
            shard_failures,
            hits,
        })
    }
}

/// Error reasons come either as plain strings or as `{type, reason}` objects.
fn error_reason(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(o) => match (o.get("type"), o.get("reason")) {
            (Some(Value::String(t)), Some(Value::String(r))) => format!("{}: {}", t, r),
            (_, Some(Value::String(r))) => r.clone(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    }
}

/// Narrow contract to the document-search engine.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Submit one bulk request; operations are applied in order.
    async fn bulk(&self, ops: &[BulkOperation]) -> Result<BulkResponse, TransportError>;

    /// Make all writes to `indices` visible to search.
    async fn refresh(&self, indices: &[String]) -> Result<(), TransportError>;

    async fn index_exists(&self, index: &str) -> Result<bool, TransportError>;

    async fn create_index(&self, index: &str, mapping: &Value)
        -> Result<CreateIndexOutcome, TransportError>;

    /// Fails with [`TransportError::NotFound`] when the index is absent.
    async fn delete_index(&self, index: &str) -> Result<(), TransportError>;

    /// Wait (engine side) until `index` reaches at least `wait_for`.
    async fn cluster_health(
        &self,
        index: &str,
        wait_for: HealthStatus,
        timeout: Duration,
    ) -> Result<ClusterHealth, TransportError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError>;
}
