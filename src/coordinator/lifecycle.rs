//! Opening and closing the bridge.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use super::{BridgeState, SearchBridge};
use crate::batching::IndexingQueue;
use crate::error::Result;

impl SearchBridge {
    /// Ensure every configured index exists, then start the indexing queue.
    ///
    /// With `recreate_indexes_on_open` every index is dropped and recreated
    /// first. Index creation failures are fatal: the bridge returns to
    /// `Created` and may be opened again. Opening a ready bridge is a no-op.
    #[tracing::instrument(skip(self), fields(engine = %self.config.engine_url))]
    pub async fn open(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        if self.is_ready() {
            return Ok(());
        }
        if self.state() == BridgeState::Closed {
            warn!("Reopening a closed bridge");
        }

        let start = Instant::now();
        self.set_state(BridgeState::Opening);

        let indexes = if self.config.recreate_indexes_on_open {
            info!("Recreating all indexes (development mode)");
            self.indexes.recreate_all().await
        } else {
            self.indexes.create_all().await
        };
        if let Err(e) = indexes {
            error!(error = %e, "Index setup failed; bridge not opened");
            self.set_state(BridgeState::Created);
            return Err(e);
        }

        let queue = IndexingQueue::spawn(
            self.config.queue_config(),
            self.transport.clone(),
            self.resolver.clone(),
        );
        *self.queue.write() = Some(Arc::new(queue));

        self.set_state(BridgeState::Ready);
        info!(
            entity_types = self.resolver.entity_types().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            strict = self.config.strict_consistency,
            "Search bridge ready"
        );
        Ok(())
    }

    /// Drain the indexing queue and stop accepting work.
    ///
    /// Buffered items are flushed before this returns; the result of that
    /// final flush is returned. Closing twice is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        if self.state() != BridgeState::Ready {
            self.set_state(BridgeState::Closed);
            return Ok(());
        }

        info!("Closing search bridge...");
        self.set_state(BridgeState::Closing);

        let queue = self.queue.write().take();
        let result = match queue {
            Some(queue) => queue.stop().await,
            None => Ok(()),
        };
        if let Err(ref e) = result {
            error!(error = %e, "Final flush failed during close");
        }

        self.set_state(BridgeState::Closed);
        info!("Search bridge closed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::test_config;
    use crate::error::BridgeError;
    use crate::transport::{HealthStatus, InMemoryTransport};
    use crate::work_item::WorkItem;
    use serde_json::json;

    fn bridge(transport: &Arc<InMemoryTransport>) -> SearchBridge {
        SearchBridge::with_transport(test_config(), transport.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_indexes() {
        let transport = Arc::new(InMemoryTransport::new());
        let bridge = bridge(&transport);

        bridge.open().await.unwrap();
        assert!(bridge.is_ready());
        assert!(transport.has_index("mock"));

        // Second open is a no-op
        bridge.open().await.unwrap();
        assert_eq!(transport.create_count(), 1);

        bridge.close().await.unwrap();
        assert_eq!(bridge.state(), BridgeState::Closed);
    }

    #[tokio::test]
    async fn test_failed_open_returns_to_created() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.set_health(HealthStatus::Red);
        let bridge = bridge(&transport);

        let err = bridge.open().await.unwrap_err();
        assert!(matches!(err, BridgeError::ClusterTimeout { .. }));
        assert_eq!(bridge.state(), BridgeState::Created);
        assert!(bridge.status().queue.is_none());
    }

    #[tokio::test]
    async fn test_close_flushes_buffered_items() {
        let transport = Arc::new(InMemoryTransport::new());
        let bridge = bridge(&transport);
        bridge.open().await.unwrap();

        bridge
            .enqueue(WorkItem::add("MockEntity", "7").with_field("name", json!("Ada")))
            .await
            .unwrap();
        assert_eq!(transport.bulk_count(), 0);

        bridge.close().await.unwrap();
        assert_eq!(transport.bulk_count(), 1);
        assert_eq!(transport.doc_count("mock"), 1);

        let err = bridge.enqueue(WorkItem::delete("MockEntity", "7")).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotOpen));
    }

    #[tokio::test]
    async fn test_recreate_on_open() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut config = test_config();
        config.recreate_indexes_on_open = true;

        let first = SearchBridge::with_transport(config.clone(), transport.clone()).unwrap();
        first.open().await.unwrap();
        first
            .enqueue(WorkItem::add("MockEntity", "1"))
            .await
            .unwrap();
        first.close().await.unwrap();
        assert_eq!(transport.doc_count("mock"), 1);

        let second = SearchBridge::with_transport(config, transport.clone()).unwrap();
        second.open().await.unwrap();
        assert_eq!(transport.doc_count("mock"), 0);
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_receiver_sees_transitions() {
        let transport = Arc::new(InMemoryTransport::new());
        let bridge = bridge(&transport);
        let rx = bridge.state_receiver();

        bridge.open().await.unwrap();
        assert_eq!(*rx.borrow(), BridgeState::Ready);
        bridge.close().await.unwrap();
        assert_eq!(*rx.borrow(), BridgeState::Closed);
    }
}
