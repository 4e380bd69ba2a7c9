//! Index Manager
//!
//! Creates, deletes and recreates engine indices from schema descriptors.
//!
//! # Mapping
//!
//! ```text
//! PUT /mock
//! { "mappings": {
//!     "properties": {
//!       "__type": { "type": "keyword" },
//!       "name":   { "type": "text", "fields": { "name_raw": { "type": "keyword" } } },
//!       "gender": { "type": "keyword" },
//!       "age":    { "type": "integer", "fields": { "age_raw": { "type": "integer" } } } },
//!     "_meta": { "doc_types": ["MockEntity"] } } }
//! ```
//!
//! Entity types sharing an index get one merged mapping. Creation is
//! idempotent per index: the exists check, create and yellow-health wait run
//! at most once, and concurrent callers wait for the first one.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::error::{BridgeError, Result};
use crate::metrics;
use crate::resilience::retry::{retry_when, RetryConfig};
use crate::schema::SchemaResolver;
use crate::transport::{CreateIndexOutcome, HealthStatus, SearchTransport, TransportError};

/// Index lifecycle against the engine.
pub struct IndexSchemaManager {
    transport: Arc<dyn SearchTransport>,
    resolver: Arc<dyn SchemaResolver>,
    health_timeout: Duration,
    admin_retry: RetryConfig,
    /// Per-index creation guard; initialized once the index is known to exist
    ready: DashMap<String, Arc<OnceCell<()>>>,
}

impl IndexSchemaManager {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        resolver: Arc<dyn SchemaResolver>,
        health_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            resolver,
            health_timeout,
            admin_retry: RetryConfig::admin(),
            ready: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_admin_retry(mut self, retry: RetryConfig) -> Self {
        self.admin_retry = retry;
        self
    }

    /// Whether this manager has already ensured the index exists.
    #[must_use]
    pub fn is_known(&self, index: &str) -> bool {
        self.ready
            .get(index)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    /// Create the entity's index unless it already exists, then wait for
    /// at least yellow health.
    #[instrument(skip(self))]
    pub async fn create_index(&self, entity_type: &str) -> Result<()> {
        let index = self.resolver.index_name_of(entity_type)?;
        let cell = self
            .ready
            .entry(index.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| self.create_and_wait(&index))
            .await
            .map(|_| ())
    }

    /// Delete the entity's index. Returns `false` when it did not exist.
    ///
    /// Every entity type stored in the same index loses its documents.
    #[instrument(skip(self))]
    pub async fn delete_index(&self, entity_type: &str) -> Result<bool> {
        let index = self.resolver.index_name_of(entity_type)?;
        self.ready.remove(&index);

        let result = retry_when(
            "delete_index",
            &self.admin_retry,
            || self.transport.delete_index(&index),
            TransportError::is_retryable,
        )
        .await;

        match result {
            Ok(()) => {
                metrics::record_index_operation("delete_index", true);
                info!(index = %index, "Index deleted");
                Ok(true)
            }
            Err(e) if matches!(e.error, TransportError::NotFound(_)) => {
                debug!(index = %index, "Index to delete does not exist");
                Ok(false)
            }
            Err(e) => {
                metrics::record_index_operation("delete_index", false);
                Err(e.error.into())
            }
        }
    }

    /// Delete (tolerating absence) then create.
    pub async fn recreate_index(&self, entity_type: &str) -> Result<()> {
        let _timer = metrics::LatencyTimer::new("recreate_index");
        self.delete_index(entity_type).await?;
        self.create_index(entity_type).await
    }

    /// Ensure the index of every registered entity type exists.
    pub async fn create_all(&self) -> Result<()> {
        for entity in self.resolver.entity_types() {
            self.create_index(&entity).await?;
        }
        Ok(())
    }

    /// Recreate every distinct index once.
    pub async fn recreate_all(&self) -> Result<()> {
        let mut done = Vec::new();
        for entity in self.resolver.entity_types() {
            let index = self.resolver.index_name_of(&entity)?;
            if done.contains(&index) {
                continue;
            }
            self.recreate_index(&entity).await?;
            done.push(index);
        }
        Ok(())
    }

    /// Mapping covering every entity type stored in `index`.
    pub fn merged_mapping(&self, index: &str) -> Result<Value> {
        let mut properties = Map::new();
        let mut doc_types = Vec::new();

        for entity in self.resolver.entity_types() {
            let descriptor = self.resolver.descriptor(&entity)?;
            if descriptor.index_name != index {
                continue;
            }
            let mapping = descriptor.mapping();
            if let Some(Value::Object(props)) = mapping.get("properties") {
                for (name, def) in props {
                    match properties.get(name) {
                        Some(existing) if existing != def => {
                            warn!(index, field = %name, entity = %entity,
                                "Conflicting field mapping in shared index, keeping first");
                        }
                        Some(_) => {}
                        None => {
                            properties.insert(name.clone(), def.clone());
                        }
                    }
                }
            }
            doc_types.push(entity);
        }

        Ok(json!({
            "properties": Value::Object(properties),
            "_meta": { "doc_types": doc_types },
        }))
    }

    async fn create_and_wait(&self, index: &str) -> Result<()> {
        let _timer = metrics::LatencyTimer::new("create_index");
        let exists = retry_when(
            "index_exists",
            &self.admin_retry,
            || self.transport.index_exists(index),
            TransportError::is_retryable,
        )
        .await
        .map_err(|e| e.error)?;

        if exists {
            debug!(index, "Index already exists");
            return Ok(());
        }

        let mapping = self.merged_mapping(index)?;
        let outcome = retry_when(
            "create_index",
            &self.admin_retry,
            || self.transport.create_index(index, &mapping),
            TransportError::is_retryable,
        )
        .await
        .map_err(|e| BridgeError::SchemaCreation {
            index: index.to_string(),
            message: e.error.to_string(),
        });

        match outcome {
            Ok(CreateIndexOutcome::Created { acknowledged: true }) => {
                metrics::record_index_operation("create_index", true);
                info!(index, "Index created");
            }
            Ok(CreateIndexOutcome::Created { acknowledged: false }) => {
                metrics::record_index_operation("create_index", false);
                return Err(BridgeError::SchemaCreation {
                    index: index.to_string(),
                    message: "creation was not acknowledged".to_string(),
                });
            }
            Ok(CreateIndexOutcome::AlreadyExists) => {
                debug!(index, "Index created concurrently elsewhere");
                return Ok(());
            }
            Err(e) => {
                metrics::record_index_operation("create_index", false);
                return Err(e);
            }
        }

        self.wait_for_yellow(index).await
    }

    /// Bounded both by the engine-side wait and a local timeout.
    async fn wait_for_yellow(&self, index: &str) -> Result<()> {
        let timeout_err = || BridgeError::ClusterTimeout {
            index: index.to_string(),
            waited: self.health_timeout,
        };

        let health = tokio::time::timeout(
            self.health_timeout,
            self.transport
                .cluster_health(index, HealthStatus::Yellow, self.health_timeout),
        )
        .await
        .map_err(|_| timeout_err())??;

        if health.timed_out || health.status < HealthStatus::Yellow {
            metrics::record_index_operation("health", false);
            warn!(index, status = health.status.as_str(), "Index did not become usable");
            return Err(timeout_err());
        }
        metrics::record_index_operation("health", true);
        debug!(index, status = health.status.as_str(), "Index is usable");
        Ok(())
    }
}
