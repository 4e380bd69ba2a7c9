// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic search-bridge usage example.
//!
//! Demonstrates:
//! 1. Declaring the schema in config
//! 2. Opening the bridge (index creation)
//! 3. Queueing adds and deletes, flushing in strict mode
//! 4. Translating and running wildcard searches
//! 5. Displaying metrics
//! 6. Clean close
//!
//! Runs against the in-memory engine unless `SEARCH_BRIDGE_URL` points at a
//! real one (e.g. `http://localhost:9200`).
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! SEARCH_BRIDGE_URL=http://localhost:9200 cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Instant;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use search_bridge::{
    BridgeConfig, InMemoryTransport, QueryNode, SearchBridge, SearchQuery, SearchTransport,
    SortSpec, WorkItem,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           search-bridge: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring search-bridge...");
    let mut config: BridgeConfig = serde_json::from_value(json!({
        "strict_consistency": true,
        "batch_flush_count": 50,
        "schema": {
            "entities": [
                { "name": "Person", "index": "people", "id_field": "id",
                  "fields": [
                      { "name": "name", "type": "String" },
                      { "name": "gender", "type": "String", "analyzed": false },
                      { "name": "age", "type": "i32" }
                  ] }
            ]
        }
    }))?;

    let bridge = match std::env::var("SEARCH_BRIDGE_URL") {
        Ok(url) => {
            println!("   Engine: {}", url);
            config.engine_url = url;
            SearchBridge::new(config)?
        }
        Err(_) => {
            println!("   Engine: in-memory");
            let transport: Arc<dyn SearchTransport> =
                Arc::new(InMemoryTransport::new().with_refresh_visibility());
            SearchBridge::with_transport(config, transport)?
        }
    };
    println!("   State: {}", bridge.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Open (creates indexes)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🚀 Opening bridge...");
    bridge.open().await?;
    println!("   ✅ Bridge ready! State: {}", bridge.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Queue writes
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Queueing 5 people and one delete...");
    let people = [
        (1, "Walter White", "male", 50),
        (2, "Skyler White", "female", 40),
        (3, "Jesse Pinkman", "male", 25),
        (4, "Wanda Maximoff", "female", 30),
        (5, "Hank Schrader", "male", 45),
    ];
    for (id, name, gender, age) in people {
        bridge
            .enqueue(
                WorkItem::add("Person", id.to_string())
                    .with_field("name", json!(name))
                    .with_field("gender", json!(gender))
                    .with_field("age", json!(age)),
            )
            .await?;
        println!("   └─ Add Person {} → {}", id, name);
    }
    bridge.enqueue(WorkItem::delete("Person", "5")).await?;
    println!("   └─ Delete Person 5");
    println!("   Status: {:?}", bridge.status());

    let start = Instant::now();
    bridge.flush().await?;
    println!("   ✅ Written and refreshed in {:?}", start.elapsed());

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Search
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Translating queries...");
    let males = QueryNode::boolean()
        .must(QueryNode::wildcard("gender", "ma*"))
        .build();
    let whites = QueryNode::boolean()
        .must(QueryNode::wildcard("name", "whi*"))
        .must_not(QueryNode::wildcard("gender", "female"))
        .build();
    println!("   └─ {} → {}", males, bridge.translate(&males, "Person")?.to_json());
    println!("   └─ {} → {}", whites, bridge.translate(&whites, "Person")?.to_json());

    println!("\n📖 Searching...");
    let refs = bridge
        .search(&males, "Person", &SortSpec::new().asc("age"), 0, 10)
        .await?;
    for r in &refs {
        println!("   └─ males by age: {} {}={}", r.entity_type(), r.id_field(), r.id());
    }

    let page = bridge
        .execute(&SearchQuery::new("Person", whites).sort(SortSpec::new().desc("name")))
        .await?;
    println!("   └─ male Whites: {} total", page.total_hits);
    for r in &page.references {
        println!("      └─ {}={}", r.id_field(), r.id());
    }

    let everyone = bridge
        .execute(&SearchQuery::new("Person", QueryNode::MatchAll).limit(2).offset(1))
        .await?;
    println!(
        "   └─ everyone, page 2 of size 2: {:?} of {}",
        everyone.references.iter().map(|r| r.id().to_string()).collect::<Vec<_>>(),
        everyone.total_hits
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Close
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Closing...");
    bridge.close().await?;
    println!("   ✅ Closed! State: {}", bridge.state());

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_kind, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name, label_str, count, avg));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }

    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }

    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, avg) in &histograms {
            println!("      └─ {}{} count={} avg={:.4}", name, labels, count, avg);
        }
    }

    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
