// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Indexing queue.
//!
//! Producers append [`WorkItem`]s to a shared [`HybridBatcher`]. A full
//! batch, a manual flush, or the periodic timer swaps the batch out and
//! hands it to a single writer task, which turns it into one bulk request.
//!
//! ```text
//! enqueue ─┐
//! enqueue ─┼─► [lock: batcher + writer channel] ──► writer task ──► _bulk ──► (_refresh)
//! timer ───┘         swap + send, FIFO                 retry w/ backoff
//!                                                      failures ──► broadcast channel
//! ```
//!
//! The swap and the hand-off happen under the same lock, so batches reach
//! the writer in the order they were cut and a later operation on an id
//! always lands after an earlier one.
//!
//! In strict mode every flush waits for the bulk response and a refresh of
//! the touched indices before returning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::hybrid_batcher::{BatchConfig, FlushBatch, FlushReason, HybridBatcher};
use crate::error::{BridgeError, Result};
use crate::metrics;
use crate::resilience::retry::{retry_when, RetryConfig, RetryError};
use crate::schema::{IdType, SchemaResolver};
use crate::transport::{BulkOperation, SearchTransport, TransportError};
use crate::work_item::{WorkItem, WorkKind};

/// Queue settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch: BatchConfig,
    /// Wait for write + refresh on every flush
    pub strict: bool,
    pub bulk_retry: RetryConfig,
    pub failure_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            strict: false,
            bulk_retry: RetryConfig::bulk(),
            failure_capacity: 64,
        }
    }
}

/// Observable queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing buffered, nothing in flight
    Idle,
    /// Items buffered, nothing in flight
    Accumulating,
    /// At least one batch is being written
    Flushing,
    /// No further items are accepted
    Stopped,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Accumulating => write!(f, "Accumulating"),
            Self::Flushing => write!(f, "Flushing"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The bulk request itself could not be delivered
    Submission,
    /// The engine accepted the request but rejected these documents
    Rejected,
    /// Written, but the strict-mode refresh of the touched indices failed
    Refresh,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Submission => "submission",
            FailureKind::Rejected => "rejected",
            FailureKind::Refresh => "refresh",
        }
    }
}

/// Items that could not be written, published on the failure channel.
#[derive(Debug, Clone)]
pub struct BulkFailure {
    pub batch_id: String,
    pub kind: FailureKind,
    pub attempts: usize,
    pub message: String,
    pub items: Arc<Vec<WorkItem>>,
}

impl BulkFailure {
    #[must_use]
    pub fn to_error(&self) -> BridgeError {
        match self.kind {
            FailureKind::Refresh => BridgeError::Refresh {
                batch_id: self.batch_id.clone(),
                attempts: self.attempts,
                message: self.message.clone(),
            },
            FailureKind::Submission | FailureKind::Rejected => BridgeError::BulkSubmission {
                batch_id: self.batch_id.clone(),
                attempts: self.attempts,
                message: self.message.clone(),
            },
        }
    }
}

/// A batch handed to the writer task.
struct WriteJob {
    batch_id: String,
    items: Vec<WorkItem>,
    reason: FlushReason,
    /// Notified once the batch is written (and refreshed in strict mode)
    done: Option<oneshot::Sender<Result<()>>>,
}

struct Inner {
    batcher: HybridBatcher<WorkItem>,
    /// `None` once stopped
    jobs: Option<mpsc::UnboundedSender<WriteJob>>,
}

struct Shared {
    inner: Mutex<Inner>,
    in_flight: Arc<AtomicUsize>,
    strict: bool,
}

impl Shared {
    /// Cut the current batch and hand it to the writer. Must be called with
    /// the lock held so batches stay in cut order.
    ///
    /// With `wait`, a job is sent even for an empty batch; it completes once
    /// every earlier batch has been written.
    fn submit_locked(
        &self,
        inner: &mut Inner,
        reason: FlushReason,
        wait: bool,
    ) -> Result<Option<oneshot::Receiver<Result<()>>>> {
        let batch = inner.batcher.take(reason);
        self.send_locked(inner, batch, reason, wait)
    }

    fn send_locked(
        &self,
        inner: &mut Inner,
        batch: Option<FlushBatch<WorkItem>>,
        reason: FlushReason,
        wait: bool,
    ) -> Result<Option<oneshot::Receiver<Result<()>>>> {
        let Some(jobs) = inner.jobs.as_ref() else {
            return Err(BridgeError::QueueStopped);
        };

        let (items, age) = batch
            .map(|batch| (batch.items, batch.age))
            .unwrap_or_default();
        if items.is_empty() && !wait {
            return Ok(None);
        }

        let (done, rx) = if wait {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let job = WriteJob {
            batch_id: Uuid::new_v4().to_string(),
            items,
            reason,
            done,
        };
        if !job.items.is_empty() {
            metrics::record_flush(reason.as_str(), job.items.len());
            debug!(
                batch_id = %job.batch_id,
                count = job.items.len(),
                reason = reason.as_str(),
                age_ms = age.as_millis() as u64,
                "Batch cut"
            );
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if jobs.send(job).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(BridgeError::QueueStopped);
        }
        metrics::set_pending_items(0);
        Ok(rx)
    }

    fn submit(&self, reason: FlushReason, wait: bool) -> Result<Option<oneshot::Receiver<Result<()>>>> {
        let mut inner = self.inner.lock();
        self.submit_locked(&mut inner, reason, wait)
    }

    /// Timer path: cut the batch only once its oldest item has waited a
    /// full flush interval.
    fn submit_if_due(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(batch) = inner.batcher.take_if_ready() {
            let reason = batch.reason;
            self.send_locked(&mut inner, Some(batch), reason, false)?;
        } else if inner.jobs.is_none() {
            return Err(BridgeError::QueueStopped);
        }
        Ok(())
    }
}

async fn await_done(rx: Option<oneshot::Receiver<Result<()>>>) -> Result<()> {
    match rx {
        Some(rx) => rx.await.unwrap_or(Err(BridgeError::QueueStopped)),
        None => Ok(()),
    }
}

/// Batching write queue in front of the engine's bulk API.
pub struct IndexingQueue {
    shared: Arc<Shared>,
    resolver: Arc<dyn SchemaResolver>,
    failures: broadcast::Sender<BulkFailure>,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl IndexingQueue {
    /// Start the writer and timer tasks. Requires a Tokio runtime.
    pub fn spawn(
        config: QueueConfig,
        transport: Arc<dyn SearchTransport>,
        resolver: Arc<dyn SchemaResolver>,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (failures, _) = broadcast::channel(config.failure_capacity.max(1));
        let interval = config.batch.flush_interval();
        // Poll several times per interval so no item waits much past it.
        let tick = (interval / 4).max(Duration::from_millis(1));

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                batcher: HybridBatcher::new(config.batch),
                jobs: Some(jobs_tx),
            }),
            in_flight: Arc::new(AtomicUsize::new(0)),
            strict: config.strict,
        });

        let writer = BulkWriter {
            transport,
            resolver: resolver.clone(),
            retry: config.bulk_retry,
            refresh_retry: RetryConfig::admin(),
            strict: config.strict,
            failures: failures.clone(),
        };
        let writer_task = tokio::spawn(writer.run(jobs_rx, shared.in_flight.clone()));

        let timer_shared = shared.clone();
        let timer_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if timer_shared.submit_if_due().is_err() {
                    break;
                }
            }
        });

        info!(
            flush_count = shared.inner.lock().batcher.config().flush_count,
            flush_ms = interval.as_millis() as u64,
            strict = config.strict,
            "Indexing queue started"
        );

        Self {
            shared,
            resolver,
            failures,
            tasks: Mutex::new(Some((writer_task, timer_task))),
        }
    }

    /// Append an item. Reaching the count threshold cuts a batch.
    ///
    /// Unknown entity types fail here. In strict mode a threshold flush is
    /// awaited like [`flush`](Self::flush).
    pub async fn enqueue(&self, item: WorkItem) -> Result<()> {
        self.resolver.descriptor(item.entity_type())?;

        let done = {
            let mut inner = self.shared.inner.lock();
            if inner.jobs.is_none() {
                return Err(BridgeError::QueueStopped);
            }
            match inner.batcher.push(item) {
                Some(reason) => self
                    .shared
                    .submit_locked(&mut inner, reason, self.shared.strict)?,
                None => {
                    metrics::set_pending_items(inner.batcher.len());
                    None
                }
            }
        };
        await_done(done).await
    }

    /// Flush the current batch.
    ///
    /// Non-strict: returns once the batch is handed to the writer.
    /// Strict: returns once it is written and the touched indices refreshed.
    pub async fn flush(&self) -> Result<()> {
        let done = self.shared.submit(FlushReason::Manual, self.shared.strict)?;
        await_done(done).await
    }

    /// Flush and wait for every batch cut so far, regardless of mode.
    pub async fn flush_and_wait(&self) -> Result<()> {
        let done = self.shared.submit(FlushReason::Manual, true)?;
        await_done(done).await
    }

    /// Flush what is buffered, wait for in-flight writes, then stop the
    /// timer. Later enqueues fail with [`BridgeError::QueueStopped`].
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let done = {
            let mut inner = self.shared.inner.lock();
            if inner.jobs.is_none() {
                return Ok(());
            }
            let done = self.shared.submit_locked(&mut inner, FlushReason::Shutdown, true);
            inner.jobs = None;
            done?
        };

        let result = await_done(done).await;

        let tasks = self.tasks.lock().take();
        if let Some((writer, timer)) = tasks {
            timer.abort();
            if let Err(e) = writer.await {
                warn!(error = %e, "Writer task ended abnormally");
            }
        }
        info!("Indexing queue stopped");
        result
    }

    /// Receive batches that could not be written.
    #[must_use]
    pub fn subscribe_failures(&self) -> broadcast::Receiver<BulkFailure> {
        self.failures.subscribe()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.inner.lock().batcher.len()
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.shared.strict
    }

    #[must_use]
    pub fn state(&self) -> QueueState {
        let inner = self.shared.inner.lock();
        if inner.jobs.is_none() {
            QueueState::Stopped
        } else if self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            QueueState::Flushing
        } else if !inner.batcher.is_empty() {
            QueueState::Accumulating
        } else {
            QueueState::Idle
        }
    }
}

impl Drop for IndexingQueue {
    fn drop(&mut self) {
        if let Some((_, timer)) = self.tasks.lock().take() {
            timer.abort();
            let pending = self.shared.inner.lock().batcher.len();
            if pending > 0 {
                warn!(pending, "Indexing queue dropped without stop(); buffered items discarded");
            }
        }
    }
}

/// Turns batches into bulk requests. Owned by the writer task.
struct BulkWriter {
    transport: Arc<dyn SearchTransport>,
    resolver: Arc<dyn SchemaResolver>,
    retry: RetryConfig,
    refresh_retry: RetryConfig,
    strict: bool,
    failures: broadcast::Sender<BulkFailure>,
}

impl BulkWriter {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<WriteJob>, in_flight: Arc<AtomicUsize>) {
        while let Some(job) = jobs.recv().await {
            let result = self.write(&job.batch_id, job.items, job.reason).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Some(done) = job.done {
                let _ = done.send(result);
            }
        }
        debug!("Writer task drained");
    }

    async fn write(&self, batch_id: &str, items: Vec<WorkItem>, reason: FlushReason) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let (ops, origins, unresolved) = self.operations(&items);
        if !unresolved.is_empty() {
            self.publish(BulkFailure {
                batch_id: batch_id.to_string(),
                kind: FailureKind::Rejected,
                attempts: 0,
                message: "entity type no longer registered".to_string(),
                items: Arc::new(unresolved),
            });
        }
        if ops.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let response = retry_when(
            "bulk",
            &self.retry,
            || self.transport.bulk(&ops),
            TransportError::is_retryable,
        )
        .await;

        let response = match response {
            Ok(response) => {
                metrics::record_bulk("success", start.elapsed());
                response
            }
            Err(e) => {
                metrics::record_bulk("error", start.elapsed());
                let failure = BulkFailure {
                    batch_id: batch_id.to_string(),
                    kind: FailureKind::Submission,
                    attempts: e.attempts,
                    message: e.error.to_string(),
                    items: Arc::new(items),
                };
                let err = failure.to_error();
                self.publish(failure);
                return Err(err);
            }
        };

        debug!(
            batch_id,
            operations = ops.len(),
            reason = reason.as_str(),
            took_ms = response.took_ms,
            "Bulk write complete"
        );

        let mut result = Ok(());
        if !response.is_success() {
            let rejected: Vec<WorkItem> = response
                .failures
                .iter()
                .filter_map(|f| origins.get(f.position).map(|&i| items[i].clone()))
                .collect();
            let failure = BulkFailure {
                batch_id: batch_id.to_string(),
                kind: FailureKind::Rejected,
                attempts: 1,
                message: format!(
                    "{} document(s) rejected, first: {}",
                    response.failures.len(),
                    response.failures[0].reason
                ),
                items: Arc::new(rejected),
            };
            result = Err(failure.to_error());
            self.publish(failure);
        }

        if self.strict {
            if let Err(e) = self.refresh(&ops).await {
                let failure = BulkFailure {
                    batch_id: batch_id.to_string(),
                    kind: FailureKind::Refresh,
                    attempts: e.attempts,
                    message: e.error.to_string(),
                    items: Arc::new(items),
                };
                let err = failure.to_error();
                self.publish(failure);
                return Err(err);
            }
        }
        result
    }

    /// Bulk operations in item order, the item index of each operation,
    /// and items whose entity type cannot be resolved.
    fn operations(&self, items: &[WorkItem]) -> (Vec<BulkOperation>, Vec<usize>, Vec<WorkItem>) {
        let mut ops = Vec::with_capacity(items.len());
        let mut origins = Vec::with_capacity(items.len());
        let mut unresolved = Vec::new();

        for (i, item) in items.iter().enumerate() {
            let descriptor = match self.resolver.descriptor(item.entity_type()) {
                Ok(d) => d,
                Err(e) => {
                    warn!(entity = item.entity_type(), error = %e, "Dropping item for unknown entity type");
                    unresolved.push(item.clone());
                    continue;
                }
            };
            let op = match item.kind() {
                WorkKind::Add => {
                    let mut source = item.fields().clone();
                    if !source.contains_key(&descriptor.id_field) {
                        let id = match descriptor.id_type {
                            IdType::Numeric => item
                                .entity_id()
                                .parse::<i64>()
                                .map(Value::from)
                                .unwrap_or_else(|_| Value::from(item.entity_id())),
                            IdType::String => Value::from(item.entity_id()),
                        };
                        source.insert(descriptor.id_field.clone(), id);
                    }
                    BulkOperation::Index {
                        index: descriptor.index_name.clone(),
                        doc_type: descriptor.entity_type.clone(),
                        id: item.entity_id().to_string(),
                        source,
                    }
                }
                WorkKind::Delete => BulkOperation::Delete {
                    index: descriptor.index_name.clone(),
                    doc_type: descriptor.entity_type.clone(),
                    id: item.entity_id().to_string(),
                },
            };
            ops.push(op);
            origins.push(i);
        }
        (ops, origins, unresolved)
    }

    async fn refresh(&self, ops: &[BulkOperation]) -> Result<(), RetryError<TransportError>> {
        let mut indices: Vec<String> = Vec::new();
        for op in ops {
            if !indices.iter().any(|i| i == op.index()) {
                indices.push(op.index().to_string());
            }
        }

        let result = retry_when(
            "refresh",
            &self.refresh_retry,
            || self.transport.refresh(&indices),
            TransportError::is_retryable,
        )
        .await;
        metrics::record_refresh(indices.len(), result.is_ok());
        result
    }

    fn publish(&self, failure: BulkFailure) {
        metrics::record_bulk_failure(failure.kind.as_str(), failure.items.len());
        error!(
            batch_id = %failure.batch_id,
            kind = ?failure.kind,
            attempts = failure.attempts,
            items = failure.items.len(),
            message = %failure.message,
            "Batch could not be fully written"
        );
        // No subscribers is not an error; the failure is logged above.
        let _ = self.failures.send(failure);
    }
}
