//! Search execution
//!
//! Builds the engine request (translated query, raw-field sort, paging,
//! document-type filter), rejects responses with shard failures, and decodes
//! hits into [`EntityReference`]s in hit order.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::query::{QueryNode, SortSpec};
use super::translator::QueryTranslator;
use crate::error::{BridgeError, Result};
use crate::metrics;
use crate::schema::{IdType, IndexDescriptor, SchemaResolver};
use crate::transport::{SearchRequest, SearchTransport, SortField};

/// Identifier decoded from a hit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    Long(i64),
    Str(String),
}

impl EntityId {
    /// String ids pass through; numeric ids fall back to the raw string
    /// when they do not parse.
    #[must_use]
    pub fn decode(raw: &str, id_type: IdType) -> Self {
        match id_type {
            IdType::String => EntityId::Str(raw.to_string()),
            IdType::Numeric => raw
                .parse::<i64>()
                .map(EntityId::Long)
                .unwrap_or_else(|_| EntityId::Str(raw.to_string())),
        }
    }

    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            EntityId::Long(v) => Some(*v),
            EntityId::Str(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Long(v) => write!(f, "{}", v),
            EntityId::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Pointer to an entity found by a search.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityReference {
    entity_type: String,
    id_field: String,
    id: EntityId,
}

impl EntityReference {
    fn from_hit(descriptor: &IndexDescriptor, raw_id: &str) -> Self {
        Self {
            entity_type: descriptor.entity_type.clone(),
            id_field: descriptor.id_field.clone(),
            id: EntityId::decode(raw_id, descriptor.id_type),
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Total matching documents in the engine, beyond this page
    pub total_hits: u64,
    pub references: Vec<EntityReference>,
}

/// A search over one or more entity types.
///
/// Only the first type's index is queried; hits of every listed type stored
/// there are returned.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    entity_types: Vec<String>,
    node: QueryNode,
    sort: SortSpec,
    offset: usize,
    limit: Option<usize>,
}

impl SearchQuery {
    pub fn new(entity_type: impl Into<String>, node: QueryNode) -> Self {
        Self {
            entity_types: vec![entity_type.into()],
            node,
            sort: SortSpec::default(),
            offset: 0,
            limit: None,
        }
    }

    #[must_use]
    pub fn also(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_types.push(entity_type.into());
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    /// Index of the first hit to return.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Page size, capped by the executor's maximum.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn entity_types(&self) -> &[String] {
        &self.entity_types
    }
}

/// Hydrates entities from the system of record.
#[async_trait]
pub trait EntityLoader: Send + Sync {
    type Entity: Send;

    /// Load entities for `references`, keeping their order.
    async fn load(&self, references: &[EntityReference]) -> Result<Vec<Self::Entity>>;
}

/// Issues searches and decodes hits.
pub struct SearchExecutor {
    transport: Arc<dyn SearchTransport>,
    resolver: Arc<dyn SchemaResolver>,
    translator: QueryTranslator,
    max_page_size: usize,
}

impl SearchExecutor {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        resolver: Arc<dyn SchemaResolver>,
        max_page_size: usize,
    ) -> Self {
        Self {
            translator: QueryTranslator::new(resolver.clone()),
            transport,
            resolver,
            max_page_size: max_page_size.max(1),
        }
    }

    #[must_use]
    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Search one entity type and return references in hit order.
    pub async fn search(
        &self,
        node: &QueryNode,
        entity_type: &str,
        sort: &SortSpec,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EntityReference>> {
        let query = SearchQuery::new(entity_type, node.clone())
            .sort(sort.clone())
            .offset(offset)
            .limit(limit);
        Ok(self.execute(&query).await?.references)
    }

    /// Build the engine request for `query` without sending it.
    pub fn build_request(&self, query: &SearchQuery) -> Result<SearchRequest> {
        let descriptors = self.descriptors(query)?;
        let first = &descriptors[0];

        if descriptors.iter().any(|d| d.index_name != first.index_name) {
            warn!(
                index = %first.index_name,
                entity_types = ?query.entity_types,
                "Entity types span several indexes; only the first index is searched"
            );
        }

        let target = self.translator.translate(&query.node, &first.entity_type)?;

        let mut sort = Vec::with_capacity(query.sort.len());
        for entry in query.sort.entries() {
            let mapping = first.field_mapping(&entry.field)?;
            sort.push(SortField {
                field: mapping.raw_path(),
                ascending: entry.ascending,
            });
        }

        let size = query
            .limit
            .unwrap_or(self.max_page_size)
            .min(self.max_page_size);

        Ok(SearchRequest {
            index: first.index_name.clone(),
            doc_types: descriptors.iter().map(|d| d.entity_type.clone()).collect(),
            query: target,
            sort,
            from: query.offset,
            size,
        })
    }

    /// Run a search and decode the page.
    #[instrument(skip(self, query), fields(entity_types = ?query.entity_types))]
    pub async fn execute(&self, query: &SearchQuery) -> Result<SearchPage> {
        let request = self.build_request(query)?;
        let descriptors = self.descriptors(query)?;
        let start = Instant::now();

        let response = match self.transport.search(&request).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_search("error", start.elapsed(), 0);
                return Err(e.into());
            }
        };

        if let Some(failure) = response.shard_failures.first() {
            metrics::record_search("shard_failure", start.elapsed(), 0);
            metrics::record_shard_failures(response.shard_failures.len());
            warn!(
                index = %request.index,
                failures = response.shard_failures.len(),
                reason = %failure.reason,
                "Search rejected: shard failure"
            );
            return Err(BridgeError::SearchExecution(failure.reason.clone()));
        }

        let mut references = Vec::with_capacity(response.hits.len());
        for hit in &response.hits {
            let entity = hit.doc_type.as_deref().unwrap_or(descriptors[0].entity_type.as_str());
            let reference = match descriptors.iter().find(|d| d.entity_type == entity) {
                Some(descriptor) => EntityReference::from_hit(descriptor, &hit.id),
                None => {
                    // A type stored in the same index but not asked for
                    let descriptor = self.resolver.descriptor(entity)?;
                    EntityReference::from_hit(&descriptor, &hit.id)
                }
            };
            references.push(reference);
        }

        metrics::record_search("success", start.elapsed(), references.len());
        debug!(
            index = %request.index,
            total_hits = response.total_hits,
            returned = references.len(),
            "Search completed"
        );

        Ok(SearchPage {
            total_hits: response.total_hits,
            references,
        })
    }

    fn descriptors(&self, query: &SearchQuery) -> Result<Vec<Arc<IndexDescriptor>>> {
        if query.entity_types.is_empty() {
            return Err(BridgeError::Translation("search targets no entity type".into()));
        }
        query
            .entity_types
            .iter()
            .map(|t| self.resolver.descriptor(t).map_err(BridgeError::from))
            .collect()
    }
}
