//! End-to-end pipeline tests against the in-memory engine.
//!
//! Every test drives a real [`SearchBridge`] (queue, writer task, index
//! manager, executor) over [`InMemoryTransport`], so no network is needed.
//!
//! Run with: `cargo test --test pipeline`

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use search_bridge::transport::{BulkOperation, RecordedRequest};
use search_bridge::{
    BridgeConfig, BridgeError, BridgeState, EntityId, FailureKind, InMemoryTransport, QueryNode,
    SearchBridge, SearchQuery, SearchTransport, SortSpec, TransportError, WorkItem,
};

// =============================================================================
// Helpers
// =============================================================================

fn config() -> BridgeConfig {
    serde_json::from_value(json!({
        "batch_flush_count": 100,
        "batch_flush_ms": 60_000,
        "bulk_max_retries": 3,
        "bulk_initial_backoff_ms": 1,
        "bulk_max_backoff_ms": 5,
        "health_timeout_ms": 500,
        "schema": {
            "entities": [
                { "name": "MockEntity", "index": "mock", "id_field": "id",
                  "fields": [
                      { "name": "name", "type": "String" },
                      { "name": "gender", "type": "String", "analyzed": false },
                      { "name": "age", "type": "i32" }
                  ] },
                { "name": "Tag", "index": "mock", "id_field": "code", "id_type": "string",
                  "fields": [ { "name": "label", "analyzed": false } ] },
                { "name": "Invoice", "index": "billing", "id_field": "number",
                  "fields": [ { "name": "total", "type": "f64" } ] }
            ]
        }
    }))
    .unwrap()
}

async fn open(config: BridgeConfig) -> (Arc<InMemoryTransport>, SearchBridge) {
    let transport = Arc::new(InMemoryTransport::new().with_refresh_visibility());
    let bridge = SearchBridge::with_transport(config, transport.clone()).unwrap();
    bridge.open().await.unwrap();
    (transport, bridge)
}

fn strict() -> BridgeConfig {
    BridgeConfig { strict_consistency: true, ..config() }
}

fn person(id: u32, name: &str, gender: &str, age: u32) -> WorkItem {
    WorkItem::add("MockEntity", id.to_string())
        .with_field("name", json!(name))
        .with_field("gender", json!(gender))
        .with_field("age", json!(age))
}

async fn seed_people(bridge: &SearchBridge) {
    bridge.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    bridge.enqueue(person(2, "Skyler White", "female", 40)).await.unwrap();
    bridge.enqueue(person(3, "Jesse Pinkman", "male", 25)).await.unwrap();
    bridge.enqueue(person(4, "Wanda Maximoff", "female", 30)).await.unwrap();
    bridge.flush().await.unwrap();
}

fn ids(refs: &[search_bridge::EntityReference]) -> Vec<EntityId> {
    refs.iter().map(|r| r.id().clone()).collect()
}

// =============================================================================
// Batching
// =============================================================================

#[tokio::test]
async fn count_threshold_flushes_without_timer() {
    let (transport, bridge) = open(config()).await;

    for i in 0..100 {
        bridge.enqueue(WorkItem::add("MockEntity", i.to_string())).await.unwrap();
    }
    bridge.flush_and_wait().await.unwrap();

    let bulks = transport.bulk_requests();
    assert_eq!(bulks.len(), 1);
    assert_eq!(bulks[0].len(), 100);

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn time_threshold_flushes_exactly_once() {
    let config = BridgeConfig { batch_flush_ms: 100, ..config() };
    let (transport, bridge) = open(config).await;

    bridge.enqueue(WorkItem::add("MockEntity", "1")).await.unwrap();
    assert_eq!(transport.bulk_count(), 0);

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(transport.bulk_count(), 1);

    bridge.close().await.unwrap();
    assert_eq!(transport.bulk_count(), 1);
}

#[tokio::test]
async fn add_then_delete_keeps_order_in_bulk() {
    let (transport, bridge) = open(config()).await;

    bridge.enqueue(person(9, "Hank Schrader", "male", 45)).await.unwrap();
    bridge.enqueue(WorkItem::add("Tag", "blue")).await.unwrap();
    bridge.enqueue(WorkItem::delete("MockEntity", "9")).await.unwrap();
    bridge.flush_and_wait().await.unwrap();

    let bulks = transport.bulk_requests();
    assert_eq!(bulks.len(), 1);
    let ops = &bulks[0];
    assert!(matches!(&ops[0], BulkOperation::Index { id, .. } if id == "9"));
    assert!(matches!(&ops[1], BulkOperation::Index { id, doc_type, .. } if id == "blue" && doc_type == "Tag"));
    assert!(matches!(&ops[2], BulkOperation::Delete { id, .. } if id == "9"));

    // Last operation wins
    transport.refresh(&["mock".to_string()]).await.unwrap();
    assert!(transport.document("mock", "9").is_none());
    assert!(transport.document("mock", "blue").is_some());

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_producers_lose_nothing() {
    let (transport, bridge) = open(BridgeConfig { batch_flush_count: 7, ..config() }).await;
    let bridge = Arc::new(bridge);

    let mut handles = Vec::new();
    for producer in 0..8 {
        let bridge = bridge.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let id = format!("{}", producer * 1000 + i);
                bridge.enqueue(WorkItem::add("MockEntity", id)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    bridge.flush_and_wait().await.unwrap();

    let written: usize = transport.bulk_requests().iter().map(Vec::len).sum();
    assert_eq!(written, 200);
    assert!(transport.bulk_requests().iter().all(|b| b.len() <= 7));

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn strict_mode_gives_read_after_write() {
    let (transport, bridge) = open(strict()).await;

    bridge.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    bridge.flush().await.unwrap();

    assert_eq!(transport.refreshes(), vec![vec!["mock".to_string()]]);
    let refs = bridge
        .search(&QueryNode::MatchAll, "MockEntity", &SortSpec::new(), 0, 10)
        .await
        .unwrap();
    assert_eq!(ids(&refs), vec![EntityId::Long(1)]);

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn non_strict_mode_does_not_refresh() {
    let (transport, bridge) = open(config()).await;

    bridge.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    bridge.flush_and_wait().await.unwrap();

    assert!(transport.refreshes().is_empty());
    let refs = bridge
        .search(&QueryNode::MatchAll, "MockEntity", &SortSpec::new(), 0, 10)
        .await
        .unwrap();
    assert!(refs.is_empty(), "unrefreshed writes are not searchable yet");

    bridge.close().await.unwrap();
}

// =============================================================================
// Bulk failures
// =============================================================================

#[tokio::test]
async fn exhausted_retries_reach_failure_channel() {
    let (transport, bridge) = open(strict()).await;
    let mut failures = bridge.subscribe_failures().unwrap();
    transport.fail_next_bulks(10, TransportError::Connection("connection refused".into()));

    bridge.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    let err = bridge.flush().await.unwrap_err();
    assert!(matches!(err, BridgeError::BulkSubmission { attempts: 3, .. }));

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.kind, FailureKind::Submission);
    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.items.len(), 1);
    assert_eq!(transport.bulk_count(), 3);

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn transient_bulk_failure_is_retried() {
    let (transport, bridge) = open(strict()).await;
    transport.fail_next_bulks(1, TransportError::Status { status: 503, body: "busy".into() });

    bridge.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    bridge.flush().await.unwrap();

    assert_eq!(transport.bulk_count(), 2);
    assert!(transport.document("mock", "1").is_some());

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn rejected_documents_are_reported_not_retried() {
    let (transport, bridge) = open(strict()).await;
    let mut failures = bridge.subscribe_failures().unwrap();
    transport.reject_document("2");

    bridge.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    bridge.enqueue(person(2, "Skyler White", "female", 40)).await.unwrap();
    assert!(bridge.flush().await.is_err());

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.kind, FailureKind::Rejected);
    assert_eq!(failure.items.len(), 1);
    assert_eq!(failure.items[0].entity_id(), "2");
    assert_eq!(transport.bulk_count(), 1);
    assert!(transport.document("mock", "1").is_some());

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn strict_refresh_failure_reaches_caller_and_failure_channel() {
    let (transport, bridge) = open(strict()).await;
    let mut failures = bridge.subscribe_failures().unwrap();
    transport.fail_next_refreshes(1, TransportError::Status { status: 400, body: "blocked".into() });

    bridge.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    let err = bridge.flush().await.unwrap_err();
    assert!(matches!(err, BridgeError::Refresh { .. }), "got {err:?}");

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.kind, FailureKind::Refresh);
    assert_eq!(failure.items[0].entity_id(), "1");
    assert!(transport.document("mock", "1").is_none(), "write not yet visible");

    // The next strict flush refreshes the index again
    bridge.enqueue(person(2, "Skyler White", "female", 40)).await.unwrap();
    bridge.flush().await.unwrap();
    assert!(transport.document("mock", "1").is_some());

    bridge.close().await.unwrap();
}

// =============================================================================
// Index management
// =============================================================================

#[tokio::test]
async fn open_creates_each_index_once() {
    let (transport, bridge) = open(config()).await;

    // MockEntity and Tag share "mock"; Invoice lives in "billing"
    assert_eq!(transport.create_count(), 2);
    assert_eq!(transport.health_count(), 2);

    bridge.create_index("MockEntity").await.unwrap();
    bridge.create_index("Tag").await.unwrap();
    assert_eq!(transport.create_count(), 2);

    let mapping = transport.mapping_of("mock").unwrap();
    assert_eq!(mapping["properties"]["name"]["type"], "text");
    assert_eq!(mapping["properties"]["name"]["fields"]["name_raw"]["type"], "keyword");
    assert_eq!(mapping["properties"]["gender"]["type"], "keyword");
    assert_eq!(mapping["properties"]["age"]["type"], "integer");
    assert_eq!(mapping["properties"]["age"]["fields"]["age_raw"]["type"], "integer");
    assert_eq!(mapping["properties"]["label"]["type"], "keyword");

    let billing = transport.mapping_of("billing").unwrap();
    assert_eq!(billing["properties"]["total"]["type"], "double");

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn create_index_twice_is_one_create_and_wait() {
    let transport = Arc::new(InMemoryTransport::new());
    let bridge = SearchBridge::with_transport(config(), transport.clone()).unwrap();

    bridge.create_index("Invoice").await.unwrap();
    bridge.create_index("Invoice").await.unwrap();

    let creates = transport
        .requests()
        .into_iter()
        .filter(|r| matches!(r, RecordedRequest::CreateIndex { .. }))
        .count();
    assert_eq!(creates, 1);
    assert_eq!(transport.health_count(), 1);
}

#[tokio::test]
async fn delete_and_recreate_index() {
    let (transport, bridge) = open(strict()).await;
    seed_people(&bridge).await;
    assert_eq!(transport.doc_count("mock"), 4);

    bridge.recreate_index("MockEntity").await.unwrap();
    assert_eq!(transport.doc_count("mock"), 0);

    assert!(bridge.delete_index("Invoice").await.unwrap());
    assert!(!bridge.delete_index("Invoice").await.unwrap());

    bridge.close().await.unwrap();
}

// =============================================================================
// Translation
// =============================================================================

#[tokio::test]
async fn empty_group_and_match_all_translate_to_match_all() {
    let bridge = SearchBridge::with_transport(config(), Arc::new(InMemoryTransport::new())).unwrap();

    for node in [QueryNode::MatchAll, QueryNode::boolean().build()] {
        let query = bridge.translate(&node, "MockEntity").unwrap();
        assert_eq!(query.to_json(), json!({ "match_all": {} }));
    }
}

#[tokio::test]
async fn nested_empty_group_is_skipped() {
    let bridge = SearchBridge::with_transport(config(), Arc::new(InMemoryTransport::new())).unwrap();

    let with_empty = QueryNode::boolean()
        .must(QueryNode::boolean().build())
        .must(QueryNode::wildcard("gender", "wa*"))
        .build();
    let alone = QueryNode::boolean().must(QueryNode::wildcard("gender", "wa*")).build();

    assert_eq!(
        bridge.translate(&with_empty, "MockEntity").unwrap(),
        bridge.translate(&alone, "MockEntity").unwrap()
    );
}

#[tokio::test]
async fn wildcard_depends_on_analysis() {
    let bridge = SearchBridge::with_transport(config(), Arc::new(InMemoryTransport::new())).unwrap();

    let exact = bridge.translate(&QueryNode::wildcard("gender", "wa*"), "MockEntity").unwrap();
    assert_eq!(exact.to_json(), json!({ "wildcard": { "gender": { "value": "wa*" } } }));

    let analyzed = bridge.translate(&QueryNode::wildcard("name", "wa*"), "MockEntity").unwrap();
    assert_eq!(analyzed.to_json(), json!({ "query_string": { "query": "name:wa*" } }));
    assert!(!analyzed.to_json().to_string().contains("wildcard"));
}

#[tokio::test]
async fn unknown_field_is_schema_error() {
    let bridge = SearchBridge::with_transport(config(), Arc::new(InMemoryTransport::new())).unwrap();
    let err = bridge
        .translate(&QueryNode::wildcard("nickname", "h*"), "MockEntity")
        .unwrap_err();
    assert!(matches!(err, BridgeError::Schema(_)));
}

#[tokio::test]
async fn unrecognized_occur_is_translation_error() {
    let bridge = SearchBridge::with_transport(config(), Arc::new(InMemoryTransport::new())).unwrap();
    let node: QueryNode = serde_json::from_value(json!({
        "kind": "boolean",
        "clauses": [
            { "occur": "FILTER", "node": { "kind": "wildcard", "field": "gender", "pattern": "m*" } }
        ]
    }))
    .unwrap();

    let err = bridge.translate(&node, "MockEntity").unwrap_err();
    assert!(matches!(err, BridgeError::Translation(_)));
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn search_filters_sorts_and_pages() {
    let (transport, bridge) = open(strict()).await;
    seed_people(&bridge).await;

    let query = QueryNode::boolean()
        .must(QueryNode::wildcard("gender", "male"))
        .build();
    let refs = bridge
        .search(&query, "MockEntity", &SortSpec::new().asc("age"), 0, 10)
        .await
        .unwrap();
    assert_eq!(ids(&refs), vec![EntityId::Long(3), EntityId::Long(1)]);

    let request = transport.last_search().unwrap();
    let body = request.to_body();
    assert_eq!(body["sort"][0]["age.age_raw"]["order"], "asc");

    let page = bridge
        .execute(
            &SearchQuery::new("MockEntity", QueryNode::MatchAll)
                .sort(SortSpec::new().desc("name"))
                .offset(1)
                .limit(2),
        )
        .await
        .unwrap();
    assert_eq!(page.total_hits, 4);
    assert_eq!(ids(&page.references), vec![EntityId::Long(1), EntityId::Long(2)]);

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn analyzed_wildcard_matches_as_free_text() {
    let (_transport, bridge) = open(strict()).await;
    seed_people(&bridge).await;

    let query = QueryNode::boolean()
        .must(QueryNode::wildcard("name", "whi*"))
        .must_not(QueryNode::wildcard("gender", "female"))
        .build();
    let refs = bridge
        .search(&query, "MockEntity", &SortSpec::new(), 0, 10)
        .await
        .unwrap();
    assert_eq!(ids(&refs), vec![EntityId::Long(1)]);

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn page_size_is_capped() {
    let config = BridgeConfig { max_page_size: 2, ..strict() };
    let (transport, bridge) = open(config).await;
    seed_people(&bridge).await;

    let refs = bridge
        .search(&QueryNode::MatchAll, "MockEntity", &SortSpec::new(), 0, 1000)
        .await
        .unwrap();
    assert_eq!(refs.len(), 2);
    assert_eq!(transport.last_search().unwrap().size, 2);

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn ids_decode_by_declared_type() {
    let (_transport, bridge) = open(strict()).await;

    bridge.enqueue(WorkItem::add("MockEntity", "42")).await.unwrap();
    bridge.enqueue(WorkItem::add("MockEntity", "abc")).await.unwrap();
    bridge.enqueue(WorkItem::add("Tag", "007")).await.unwrap();
    bridge.flush().await.unwrap();

    let mut refs = bridge
        .search(&QueryNode::MatchAll, "MockEntity", &SortSpec::new(), 0, 10)
        .await
        .unwrap();
    refs.sort_by_key(|r| r.id().to_string());
    assert_eq!(ids(&refs), vec![EntityId::Long(42), EntityId::Str("abc".into())]);

    let tags = bridge
        .search(&QueryNode::MatchAll, "Tag", &SortSpec::new(), 0, 10)
        .await
        .unwrap();
    assert_eq!(ids(&tags), vec![EntityId::Str("007".into())]);
    assert_eq!(tags[0].id_field(), "code");

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn multi_type_search_filters_on_every_type() {
    let (transport, bridge) = open(strict()).await;
    bridge.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    bridge.enqueue(WorkItem::add("Tag", "blue").with_field("label", json!("blue"))).await.unwrap();
    bridge.flush().await.unwrap();

    let page = bridge
        .execute(&SearchQuery::new("MockEntity", QueryNode::MatchAll).also("Tag"))
        .await
        .unwrap();
    assert_eq!(page.total_hits, 2);
    let types: Vec<_> = page.references.iter().map(|r| r.entity_type().to_string()).collect();
    assert!(types.contains(&"MockEntity".to_string()));
    assert!(types.contains(&"Tag".to_string()));

    let body = transport.last_search().unwrap().to_body();
    let filtered: Vec<Value> = body["query"]["bool"]["filter"][0]["terms"]["__type"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(filtered, vec![json!("MockEntity"), json!("Tag")]);

    bridge.close().await.unwrap();
}

#[tokio::test]
async fn shard_failure_fails_the_whole_search() {
    let (transport, bridge) = open(strict()).await;
    seed_people(&bridge).await;
    transport.set_shard_failure(Some("shard 1 unavailable"));

    let err = bridge
        .search(&QueryNode::MatchAll, "MockEntity", &SortSpec::new(), 0, 10)
        .await
        .unwrap_err();
    match err {
        BridgeError::SearchExecution(message) => assert_eq!(message, "shard 1 unavailable"),
        other => panic!("unexpected error: {other:?}"),
    }

    bridge.close().await.unwrap();
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn lifecycle_guards_operations() {
    let transport = Arc::new(InMemoryTransport::new());
    let bridge = SearchBridge::with_transport(config(), transport.clone()).unwrap();
    assert!(matches!(
        bridge.enqueue(WorkItem::add("MockEntity", "1")).await,
        Err(BridgeError::NotOpen)
    ));

    bridge.open().await.unwrap();
    assert_eq!(bridge.state(), BridgeState::Ready);
    bridge.enqueue(WorkItem::add("MockEntity", "1")).await.unwrap();

    bridge.close().await.unwrap();
    assert_eq!(bridge.state(), BridgeState::Closed);
    assert_eq!(transport.bulk_count(), 1);
    assert!(matches!(
        bridge
            .search(&QueryNode::MatchAll, "MockEntity", &SortSpec::new(), 0, 10)
            .await,
        Err(BridgeError::NotOpen)
    ));

    // Closing again is harmless
    bridge.close().await.unwrap();
}

#[tokio::test]
async fn independent_bridges_do_not_share_state() {
    let (first_transport, first) = open(strict()).await;
    let (second_transport, second) = open(strict()).await;

    first.enqueue(person(1, "Walter White", "male", 50)).await.unwrap();
    first.flush().await.unwrap();

    assert_eq!(first_transport.doc_count("mock"), 1);
    assert_eq!(second_transport.doc_count("mock"), 0);

    first.close().await.unwrap();
    assert!(second.is_ready());
    second.close().await.unwrap();
}
