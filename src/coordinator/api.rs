//! Write, admin and search operations on an open bridge.
//!
//! - `enqueue()` / `add()` / `delete()` - queue index operations
//! - `flush()` / `flush_and_wait()` - push buffered work to the engine
//! - `create_index()` / `delete_index()` / `recreate_index()` - index admin
//! - `translate()` - inspect the engine query for a query tree
//! - `search()` / `execute()` / `search_and_load()` - run searches

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use super::types::LoadedPage;
use super::SearchBridge;
use crate::batching::BulkFailure;
use crate::error::Result;
use crate::search::{
    EntityLoader, EntityReference, QueryNode, SearchPage, SearchQuery, SortSpec, TargetQuery,
};
use crate::work_item::WorkItem;

impl SearchBridge {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Queue one index operation.
    ///
    /// Fails with `NotOpen` unless the bridge is ready, and with a schema
    /// error for an unregistered entity type. In strict mode a call that
    /// fills the batch waits for it to be written and refreshed.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use search_bridge::{SearchBridge, WorkItem};
    /// # use serde_json::json;
    /// # async fn example(bridge: &SearchBridge) -> search_bridge::Result<()> {
    /// bridge
    ///     .enqueue(WorkItem::add("MockEntity", "42").with_field("name", json!("Ada")))
    ///     .await?;
    /// bridge.enqueue(WorkItem::delete("MockEntity", "17")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn enqueue(&self, item: WorkItem) -> Result<()> {
        self.open_queue()?.enqueue(item).await
    }

    /// Queue several operations in order, stopping at the first error.
    ///
    /// Returns how many were queued.
    pub async fn enqueue_many(&self, items: impl IntoIterator<Item = WorkItem>) -> Result<usize> {
        let queue = self.open_queue()?;
        let mut queued = 0;
        for item in items {
            queue.enqueue(item).await?;
            queued += 1;
        }
        debug!(queued, "Queued work items");
        Ok(queued)
    }

    /// Queue an add (index or replace) of an entity's document.
    pub async fn add(
        &self,
        entity_type: &str,
        entity_id: &str,
        fields: Map<String, Value>,
    ) -> Result<()> {
        self.enqueue(WorkItem::add_with_fields(entity_type, entity_id, fields))
            .await
    }

    /// Queue removal of an entity's document.
    pub async fn delete(&self, entity_type: &str, entity_id: &str) -> Result<()> {
        self.enqueue(WorkItem::delete(entity_type, entity_id)).await
    }

    /// Flush buffered work. Waits for write and refresh only in strict mode.
    pub async fn flush(&self) -> Result<()> {
        self.open_queue()?.flush().await
    }

    /// Flush and wait for every batch cut so far to be written, in either mode.
    pub async fn flush_and_wait(&self) -> Result<()> {
        self.open_queue()?.flush_and_wait().await
    }

    /// Receive batches that could not be written.
    pub fn subscribe_failures(&self) -> Result<broadcast::Receiver<BulkFailure>> {
        Ok(self.open_queue()?.subscribe_failures())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Index administration
    // ═══════════════════════════════════════════════════════════════════════════
    //
    // Available in every state, so a caller can prepare indexes before open.

    /// Create the entity's index unless it exists; waits for yellow health.
    pub async fn create_index(&self, entity_type: &str) -> Result<()> {
        self.indexes.create_index(entity_type).await
    }

    /// Delete the entity's index. Returns `false` when it did not exist.
    pub async fn delete_index(&self, entity_type: &str) -> Result<bool> {
        self.indexes.delete_index(entity_type).await
    }

    pub async fn recreate_index(&self, entity_type: &str) -> Result<()> {
        self.indexes.recreate_index(entity_type).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Search
    // ═══════════════════════════════════════════════════════════════════════════

    /// Engine query for `node` against `entity_type`'s field layout.
    pub fn translate(&self, node: &QueryNode, entity_type: &str) -> Result<TargetQuery> {
        self.translator.translate(node, entity_type)
    }

    /// Search one entity type; references come back in hit order.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use search_bridge::{QueryNode, SearchBridge, SortSpec};
    /// # async fn example(bridge: &SearchBridge) -> search_bridge::Result<()> {
    /// let query = QueryNode::boolean()
    ///     .must(QueryNode::wildcard("name", "ad*"))
    ///     .must_not(QueryNode::wildcard("gender", "F"))
    ///     .build();
    /// let refs = bridge
    ///     .search(&query, "MockEntity", &SortSpec::new().asc("name"), 0, 20)
    ///     .await?;
    /// for r in &refs {
    ///     println!("{} {}={}", r.entity_type(), r.id_field(), r.id());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, node, sort))]
    pub async fn search(
        &self,
        node: &QueryNode,
        entity_type: &str,
        sort: &SortSpec,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EntityReference>> {
        self.ensure_ready()?;
        self.executor.search(node, entity_type, sort, offset, limit).await
    }

    /// Run a (possibly multi-type) search and return the page with its total.
    pub async fn execute(&self, query: &SearchQuery) -> Result<SearchPage> {
        self.ensure_ready()?;
        self.executor.execute(query).await
    }

    /// Run a search and hand the references to `loader`.
    ///
    /// Loader failures are returned unchanged.
    #[instrument(skip(self, query, loader), fields(entity_types = ?query.entity_types()))]
    pub async fn search_and_load<L>(
        &self,
        query: &SearchQuery,
        loader: &L,
    ) -> Result<LoadedPage<L::Entity>>
    where
        L: EntityLoader + ?Sized,
    {
        let page = self.execute(query).await?;
        if page.references.is_empty() {
            return Ok(LoadedPage { total_hits: page.total_hits, entities: Vec::new() });
        }

        let entities = loader.load(&page.references).await?;
        if entities.len() != page.references.len() {
            debug!(
                requested = page.references.len(),
                loaded = entities.len(),
                "Loader returned a different number of entities"
            );
        }
        Ok(LoadedPage { total_hits: page.total_hits, entities })
    }

    /// Maximum hits returned by one search.
    #[must_use]
    pub fn max_page_size(&self) -> usize {
        self.executor.max_page_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::coordinator::tests::test_config;
    use crate::error::BridgeError;
    use crate::search::EntityId;
    use crate::transport::InMemoryTransport;

    struct NameLoader;

    #[async_trait]
    impl EntityLoader for NameLoader {
        type Entity = String;

        async fn load(&self, references: &[EntityReference]) -> Result<Vec<String>> {
            Ok(references.iter().map(|r| format!("{}#{}", r.entity_type(), r.id())).collect())
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl EntityLoader for FailingLoader {
        type Entity = String;

        async fn load(&self, _references: &[EntityReference]) -> Result<Vec<String>> {
            Err(BridgeError::Load("database offline".into()))
        }
    }

    async fn open_strict() -> (Arc<InMemoryTransport>, SearchBridge) {
        let transport = Arc::new(InMemoryTransport::new().with_refresh_visibility());
        let mut config = test_config();
        config.strict_consistency = true;
        let bridge = SearchBridge::with_transport(config, transport.clone()).unwrap();
        bridge.open().await.unwrap();
        (transport, bridge)
    }

    fn fields(name: &str, gender: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("name".into(), json!(name));
        map.insert("gender".into(), json!(gender));
        map
    }

    #[tokio::test]
    async fn test_operations_require_open() {
        let bridge =
            SearchBridge::with_transport(test_config(), Arc::new(InMemoryTransport::new())).unwrap();
        let node = QueryNode::MatchAll;

        assert!(matches!(bridge.flush().await, Err(BridgeError::NotOpen)));
        assert!(matches!(bridge.delete("MockEntity", "1").await, Err(BridgeError::NotOpen)));
        assert!(matches!(
            bridge.search(&node, "MockEntity", &SortSpec::new(), 0, 10).await,
            Err(BridgeError::NotOpen)
        ));
        assert!(bridge.subscribe_failures().is_err());

        // Admin and translation work before open
        assert!(bridge.translate(&node, "MockEntity").unwrap().is_match_all());
        bridge.create_index("MockEntity").await.unwrap();
    }

    #[tokio::test]
    async fn test_strict_write_then_search() {
        let (_transport, bridge) = open_strict().await;

        bridge.add("MockEntity", "1", fields("Ada", "F")).await.unwrap();
        bridge.add("MockEntity", "2", fields("Alan", "M")).await.unwrap();
        bridge.add("MockEntity", "3", fields("Grace", "F")).await.unwrap();
        bridge.flush().await.unwrap();

        let query = QueryNode::boolean()
            .must(QueryNode::wildcard("gender", "F"))
            .build();
        let refs = bridge
            .search(&query, "MockEntity", &SortSpec::new().desc("name"), 0, 10)
            .await
            .unwrap();

        let ids: Vec<_> = refs.iter().map(|r| r.id().clone()).collect();
        assert_eq!(ids, vec![EntityId::Long(3), EntityId::Long(1)]);
        assert!(refs.iter().all(|r| r.id_field() == "id"));

        bridge.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_many_stops_at_unknown_type() {
        let (_transport, bridge) = open_strict().await;
        let items = vec![
            WorkItem::add("MockEntity", "1"),
            WorkItem::add("Ghost", "2"),
            WorkItem::add("MockEntity", "3"),
        ];
        let err = bridge.enqueue_many(items).await.unwrap_err();
        assert!(matches!(err, BridgeError::Schema(_)));
        assert_eq!(bridge.status().pending_items, 1);
        bridge.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_search_and_load() {
        let (_transport, bridge) = open_strict().await;
        bridge.add("MockEntity", "5", fields("Ada", "F")).await.unwrap();
        bridge.add("MockEntity", "6", fields("Alan", "M")).await.unwrap();
        bridge.flush().await.unwrap();

        let query = SearchQuery::new("MockEntity", QueryNode::MatchAll)
            .sort(SortSpec::new().asc("name"))
            .limit(1);
        let page = bridge.search_and_load(&query, &NameLoader).await.unwrap();
        assert_eq!(page.total_hits, 2);
        assert_eq!(page.entities, vec!["MockEntity#5".to_string()]);

        let err = bridge.search_and_load(&query, &FailingLoader).await.unwrap_err();
        assert!(matches!(err, BridgeError::Load(_)));

        bridge.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_page_skips_loader() {
        let (_transport, bridge) = open_strict().await;
        let query = SearchQuery::new("MockEntity", QueryNode::wildcard("gender", "X"));
        let page = bridge.search_and_load(&query, &FailingLoader).await.unwrap();
        assert_eq!(page.total_hits, 0);
        assert!(page.entities.is_empty());
        bridge.close().await.unwrap();
    }
}
