//! In-memory search engine.
//!
//! Evaluates the query DSL produced by the translator against documents
//! held in a [`DashMap`], records every request it receives, and can be
//! told to fail in the ways a real cluster does. Used by the test suites
//! and for embedding the bridge without a network.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::traits::{
    BulkItemFailure, BulkOperation, BulkResponse, ClusterHealth, CreateIndexOutcome, HealthStatus,
    SearchHit, SearchRequest, SearchResponse, SearchTransport, ShardFailure, SortField,
    TransportError,
};
use crate::schema::TYPE_FIELD;
use crate::search::TargetQuery;

/// A request as the engine saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Bulk(Vec<BulkOperation>),
    Refresh(Vec<String>),
    IndexExists(String),
    CreateIndex { index: String, mapping: Value },
    DeleteIndex(String),
    ClusterHealth(String),
    Search(SearchRequest),
}

#[derive(Debug, Clone)]
struct StoredDoc {
    id: String,
    doc_type: String,
    source: Map<String, Value>,
}

#[derive(Debug, Default)]
struct MemIndex {
    mapping: Value,
    /// Searchable documents, in first-write order
    docs: Vec<StoredDoc>,
    /// Writes waiting for a refresh (refresh-visibility mode only)
    unrefreshed: Vec<BulkOperation>,
}

impl MemIndex {
    fn apply(&mut self, op: &BulkOperation) {
        match op {
            BulkOperation::Index { id, doc_type, source, .. } => {
                let doc = StoredDoc {
                    id: id.clone(),
                    doc_type: doc_type.clone(),
                    source: source.clone(),
                };
                match self.docs.iter_mut().find(|d| d.id == *id) {
                    Some(existing) => *existing = doc,
                    None => self.docs.push(doc),
                }
            }
            BulkOperation::Delete { id, .. } => self.docs.retain(|d| d.id != *id),
        }
    }
}

/// In-memory [`SearchTransport`] with request recording and fault injection.
pub struct InMemoryTransport {
    indices: DashMap<String, MemIndex>,
    requests: Mutex<Vec<RecordedRequest>>,
    /// Documents only become searchable after a refresh
    refresh_visibility: bool,
    bulk_failures_left: AtomicUsize,
    bulk_failure: Mutex<Option<TransportError>>,
    bulk_delay: Mutex<Duration>,
    refresh_failures_left: AtomicUsize,
    refresh_failure: Mutex<Option<TransportError>>,
    rejected_ids: Mutex<Vec<String>>,
    shard_failure: Mutex<Option<String>>,
    unacknowledged_creates: AtomicBool,
    health: Mutex<HealthStatus>,
    health_delay: Mutex<Duration>,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indices: DashMap::new(),
            requests: Mutex::new(Vec::new()),
            refresh_visibility: false,
            bulk_failures_left: AtomicUsize::new(0),
            bulk_failure: Mutex::new(None),
            bulk_delay: Mutex::new(Duration::ZERO),
            refresh_failures_left: AtomicUsize::new(0),
            refresh_failure: Mutex::new(None),
            rejected_ids: Mutex::new(Vec::new()),
            shard_failure: Mutex::new(None),
            unacknowledged_creates: AtomicBool::new(false),
            health: Mutex::new(HealthStatus::Green),
            health_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Hold writes back until the touched index is refreshed, like a real engine.
    #[must_use]
    pub fn with_refresh_visibility(mut self) -> Self {
        self.refresh_visibility = true;
        self
    }

    // ── fault injection ──

    /// Fail the next `times` bulk calls with `error`.
    pub fn fail_next_bulks(&self, times: usize, error: TransportError) {
        *self.bulk_failure.lock() = Some(error);
        self.bulk_failures_left.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` refresh calls with `error`.
    pub fn fail_next_refreshes(&self, times: usize, error: TransportError) {
        *self.refresh_failure.lock() = Some(error);
        self.refresh_failures_left.store(times, Ordering::SeqCst);
    }

    /// Delay every bulk call.
    pub fn set_bulk_delay(&self, delay: Duration) {
        *self.bulk_delay.lock() = delay;
    }

    /// Reject documents with this id inside otherwise accepted bulk calls.
    pub fn reject_document(&self, id: impl Into<String>) {
        self.rejected_ids.lock().push(id.into());
    }

    /// Report a shard failure on every search until cleared with `None`.
    pub fn set_shard_failure(&self, reason: Option<&str>) {
        *self.shard_failure.lock() = reason.map(str::to_string);
    }

    pub fn set_unacknowledged_creates(&self, unacknowledged: bool) {
        self.unacknowledged_creates.store(unacknowledged, Ordering::SeqCst);
    }

    /// Health reported for every index.
    pub fn set_health(&self, status: HealthStatus) {
        *self.health.lock() = status;
    }

    /// Stall health requests, simulating an unresponsive cluster.
    pub fn set_health_delay(&self, delay: Duration) {
        *self.health_delay.lock() = delay;
    }

    // ── inspection ──

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Operations of every bulk call, in call order.
    #[must_use]
    pub fn bulk_requests(&self) -> Vec<Vec<BulkOperation>> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                RecordedRequest::Bulk(ops) => Some(ops.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn bulk_count(&self) -> usize {
        self.count(|r| matches!(r, RecordedRequest::Bulk(_)))
    }

    #[must_use]
    pub fn create_count(&self) -> usize {
        self.count(|r| matches!(r, RecordedRequest::CreateIndex { .. }))
    }

    #[must_use]
    pub fn health_count(&self) -> usize {
        self.count(|r| matches!(r, RecordedRequest::ClusterHealth(_)))
    }

    /// Indices named by refresh calls, in call order.
    #[must_use]
    pub fn refreshes(&self) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                RecordedRequest::Refresh(indices) => Some(indices.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn last_search(&self) -> Option<SearchRequest> {
        self.requests.lock().iter().rev().find_map(|r| match r {
            RecordedRequest::Search(req) => Some(req.clone()),
            _ => None,
        })
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    #[must_use]
    pub fn has_index(&self, index: &str) -> bool {
        self.indices.contains_key(index)
    }

    #[must_use]
    pub fn mapping_of(&self, index: &str) -> Option<Value> {
        self.indices.get(index).map(|i| i.mapping.clone())
    }

    /// Number of searchable documents in an index.
    #[must_use]
    pub fn doc_count(&self, index: &str) -> usize {
        self.indices.get(index).map(|i| i.docs.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        let idx = self.indices.get(index)?;
        idx.docs.iter().find(|d| d.id == id).map(|d| d.source.clone())
    }

    fn record(&self, request: RecordedRequest) {
        self.requests.lock().push(request);
    }

    fn count(&self, pred: impl Fn(&RecordedRequest) -> bool) -> usize {
        self.requests.lock().iter().filter(|r| pred(r)).count()
    }

    fn take_bulk_failure(&self) -> Option<TransportError> {
        take_failure(&self.bulk_failures_left, &self.bulk_failure)
    }

    fn take_refresh_failure(&self) -> Option<TransportError> {
        take_failure(&self.refresh_failures_left, &self.refresh_failure)
    }
}

fn take_failure(left: &AtomicUsize, error: &Mutex<Option<TransportError>>) -> Option<TransportError> {
    left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .ok()
        .and_then(|_| error.lock().clone())
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchTransport for InMemoryTransport {
    async fn bulk(&self, ops: &[BulkOperation]) -> Result<BulkResponse, TransportError> {
        self.record(RecordedRequest::Bulk(ops.to_vec()));

        let delay = *self.bulk_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.take_bulk_failure() {
            return Err(error);
        }

        let rejected = self.rejected_ids.lock().clone();
        let mut failures = Vec::new();
        for (position, op) in ops.iter().enumerate() {
            if rejected.iter().any(|id| id == op.id()) {
                failures.push(BulkItemFailure {
                    position,
                    id: op.id().to_string(),
                    status: 400,
                    reason: "mapper_parsing_exception: document rejected".to_string(),
                });
                continue;
            }
            // Writes to missing indices create them, as the engine does.
            let mut index = self.indices.entry(op.index().to_string()).or_default();
            if self.refresh_visibility {
                index.unrefreshed.push(op.clone());
            } else {
                index.apply(op);
            }
        }

        Ok(BulkResponse {
            took_ms: delay.as_millis() as u64,
            failures,
        })
    }

    async fn refresh(&self, indices: &[String]) -> Result<(), TransportError> {
        self.record(RecordedRequest::Refresh(indices.to_vec()));
        if let Some(error) = self.take_refresh_failure() {
            return Err(error);
        }
        for name in indices {
            let mut index = self
                .indices
                .get_mut(name)
                .ok_or_else(|| TransportError::NotFound(name.clone()))?;
            let pending = std::mem::take(&mut index.unrefreshed);
            for op in &pending {
                index.apply(op);
            }
        }
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, TransportError> {
        self.record(RecordedRequest::IndexExists(index.to_string()));
        Ok(self.indices.contains_key(index))
    }

    async fn create_index(
        &self,
        index: &str,
        mapping: &Value,
    ) -> Result<CreateIndexOutcome, TransportError> {
        self.record(RecordedRequest::CreateIndex {
            index: index.to_string(),
            mapping: mapping.clone(),
        });
        if self.indices.contains_key(index) {
            return Ok(CreateIndexOutcome::AlreadyExists);
        }
        let acknowledged = !self.unacknowledged_creates.load(Ordering::SeqCst);
        self.indices.insert(
            index.to_string(),
            MemIndex {
                mapping: mapping.clone(),
                ..MemIndex::default()
            },
        );
        Ok(CreateIndexOutcome::Created { acknowledged })
    }

    async fn delete_index(&self, index: &str) -> Result<(), TransportError> {
        self.record(RecordedRequest::DeleteIndex(index.to_string()));
        self.indices
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(index.to_string()))
    }

    async fn cluster_health(
        &self,
        index: &str,
        wait_for: HealthStatus,
        _timeout: Duration,
    ) -> Result<ClusterHealth, TransportError> {
        self.record(RecordedRequest::ClusterHealth(index.to_string()));
        let delay = *self.health_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let status = *self.health.lock();
        Ok(ClusterHealth {
            status,
            timed_out: status < wait_for,
        })
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
        self.record(RecordedRequest::Search(request.clone()));

        let index = self
            .indices
            .get(&request.index)
            .ok_or_else(|| TransportError::NotFound(request.index.clone()))?;

        let mut matched: Vec<&StoredDoc> = index
            .docs
            .iter()
            .filter(|d| request.doc_types.is_empty() || request.doc_types.contains(&d.doc_type))
            .filter(|d| matches(&request.query, &d.source))
            .collect();

        if !request.sort.is_empty() {
            matched.sort_by(|a, b| compare_docs(&request.sort, a, b));
        }

        let total_hits = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .map(|d| SearchHit {
                index: request.index.clone(),
                doc_type: Some(d.doc_type.clone()),
                id: d.id.clone(),
                score: if request.sort.is_empty() { Some(1.0) } else { None },
                sort: request
                    .sort
                    .iter()
                    .map(|s| field_value(&d.source, &s.field).cloned().unwrap_or(Value::Null))
                    .collect(),
            })
            .collect();

        let shard_failures = self
            .shard_failure
            .lock()
            .as_ref()
            .map(|reason| {
                vec![ShardFailure {
                    index: Some(request.index.clone()),
                    shard: Some(0),
                    reason: reason.clone(),
                }]
            })
            .unwrap_or_default();

        Ok(SearchResponse {
            total_hits,
            shard_failures,
            hits,
        })
    }
}

/// Resolve a physical path (`name`, `name.name_raw`) to the source value.
/// Sub-fields are views over their parent's value.
fn field_value<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let top = path.split('.').next().unwrap_or(path);
    source.get(top)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(query: &TargetQuery, source: &Map<String, Value>) -> bool {
    match query {
        TargetQuery::MatchAll => true,
        TargetQuery::Bool { must, must_not, should } => {
            must.iter().all(|q| matches(q, source))
                && !must_not.iter().any(|q| matches(q, source))
                && (should.is_empty()
                    || !must.is_empty()
                    || should.iter().any(|q| matches(q, source)))
        }
        TargetQuery::Wildcard { field, pattern } => field_value(source, field)
            .map(|v| glob_match(pattern, &value_text(v)))
            .unwrap_or(false),
        TargetQuery::QueryString { query } => query_string_matches(query, source),
    }
}

/// Minimal `query_string` semantics: whitespace separated terms with
/// optional `+`/`-` prefixes and `field:` qualifiers, matched
/// case-insensitively against tokens of the field text.
fn query_string_matches(query: &str, source: &Map<String, Value>) -> bool {
    let mut required = Vec::new();
    let mut excluded = Vec::new();
    let mut optional = Vec::new();

    for term in query.split_whitespace() {
        match term.as_bytes()[0] {
            b'+' => required.push(&term[1..]),
            b'-' => excluded.push(&term[1..]),
            _ => optional.push(term),
        }
    }

    let hit = |term: &str| term_matches(term, source);
    required.iter().all(|t| hit(t))
        && !excluded.iter().any(|t| hit(t))
        && (optional.is_empty() || !required.is_empty() || optional.iter().any(|t| hit(t)))
}

fn term_matches(term: &str, source: &Map<String, Value>) -> bool {
    let (field, pattern) = match term.split_once(':') {
        Some((f, p)) => (Some(f), p),
        None => (None, term),
    };
    if field == Some("*") && pattern == "*" {
        return true;
    }
    let pattern = pattern.to_lowercase();
    let text_matches = |value: &Value| {
        let text = value_text(value).to_lowercase();
        glob_match(&pattern, &text)
            || text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .any(|token| glob_match(&pattern, token))
    };

    match field {
        Some(f) => field_value(source, f).map(text_matches).unwrap_or(false),
        None => source
            .iter()
            .filter(|(k, _)| k.as_str() != TYPE_FIELD)
            .any(|(_, v)| text_matches(v)),
    }
}

/// `*` matches any run, `?` matches one character.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// Missing values sort last in either direction.
fn compare_docs(sort: &[SortField], a: &StoredDoc, b: &StoredDoc) -> CmpOrdering {
    for s in sort {
        let ord = match (field_value(&a.source, &s.field), field_value(&b.source, &s.field)) {
            (None, None) => CmpOrdering::Equal,
            (None, Some(_)) => return CmpOrdering::Greater,
            (Some(_), None) => return CmpOrdering::Less,
            (Some(x), Some(y)) => {
                let ord = compare_values(x, y);
                if s.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            }
        };
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    CmpOrdering::Equal
}

fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal),
        _ => value_text(a).cmp(&value_text(b)),
    }
}
