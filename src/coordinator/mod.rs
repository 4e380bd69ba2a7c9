// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search bridge context object.
//!
//! The [`SearchBridge`] owns everything one application instance needs to
//! talk to the engine:
//! - the transport (HTTP or in-memory)
//! - the resolved schema
//! - the index manager (idempotent create/delete/recreate)
//! - the indexing queue (batched bulk writes)
//! - the search executor
//!
//! Several bridges can live in one process; nothing is global.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Opening → Ready → Closing → Closed
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use search_bridge::{BridgeConfig, BridgeState, SearchBridge};
//!
//! # #[tokio::main]
//! # async fn main() -> search_bridge::Result<()> {
//! let bridge = SearchBridge::new(BridgeConfig::default())?;
//! assert_eq!(bridge.state(), BridgeState::Created);
//!
//! bridge.open().await?;
//! assert!(bridge.is_ready());
//!
//! bridge.close().await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod lifecycle;
mod types;

pub use types::{BridgeState, BridgeStatus, LoadedPage};

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};

use crate::batching::IndexingQueue;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::schema::{SchemaResolver, StaticSchemaResolver};
use crate::search::{IndexSchemaManager, QueryTranslator, SearchExecutor};
use crate::transport::{HttpTransport, SearchTransport};

/// Explicit, caller-owned handle to the search engine.
pub struct SearchBridge {
    pub(super) config: BridgeConfig,
    pub(super) state: watch::Sender<BridgeState>,
    pub(super) state_rx: watch::Receiver<BridgeState>,
    pub(super) transport: Arc<dyn SearchTransport>,
    pub(super) resolver: Arc<dyn SchemaResolver>,
    pub(super) indexes: IndexSchemaManager,
    pub(super) translator: QueryTranslator,
    pub(super) executor: SearchExecutor,
    /// Present between a successful open and close
    pub(super) queue: RwLock<Option<Arc<IndexingQueue>>>,
    /// Serializes open and close
    pub(super) lifecycle: Mutex<()>,
}

impl SearchBridge {
    /// Bridge over HTTP to `config.engine_url`, with the schema from
    /// `config.schema`.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.engine_url, config.request_timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Bridge over a caller-supplied transport, with the schema from
    /// `config.schema`.
    pub fn with_transport(config: BridgeConfig, transport: Arc<dyn SearchTransport>) -> Result<Self> {
        let resolver = StaticSchemaResolver::from_config(&config.schema, &config.default_index_name)?;
        Ok(Self::with_components(config, transport, Arc::new(resolver)))
    }

    /// Bridge over a caller-supplied transport and schema resolver.
    /// `config.schema` is ignored.
    pub fn with_components(
        config: BridgeConfig,
        transport: Arc<dyn SearchTransport>,
        resolver: Arc<dyn SchemaResolver>,
    ) -> Self {
        let (state, state_rx) = watch::channel(BridgeState::Created);
        let indexes =
            IndexSchemaManager::new(transport.clone(), resolver.clone(), config.health_timeout());
        let translator = QueryTranslator::new(resolver.clone());
        let executor = SearchExecutor::new(transport.clone(), resolver.clone(), config.max_page_size);

        Self {
            config,
            state,
            state_rx,
            transport,
            resolver,
            indexes,
            translator,
            executor,
            queue: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn state(&self) -> BridgeState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<BridgeState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), BridgeState::Ready)
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn SchemaResolver> {
        &self.resolver
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn SearchTransport> {
        &self.transport
    }

    #[must_use]
    pub fn status(&self) -> BridgeStatus {
        let queue = self.queue.read().clone();
        BridgeStatus {
            state: self.state(),
            queue: queue.as_ref().map(|q| q.state()),
            pending_items: queue.as_ref().map_or(0, |q| q.pending_len()),
            strict_consistency: self.config.strict_consistency,
        }
    }

    /// The running queue, or `NotOpen`.
    pub(super) fn open_queue(&self) -> Result<Arc<IndexingQueue>> {
        if !self.is_ready() {
            return Err(BridgeError::NotOpen);
        }
        self.queue.read().clone().ok_or(BridgeError::NotOpen)
    }

    pub(super) fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(BridgeError::NotOpen)
        }
    }

    pub(super) fn set_state(&self, state: BridgeState) {
        let _ = self.state.send(state);
        crate::metrics::set_bridge_state(state.as_str());
    }
}
