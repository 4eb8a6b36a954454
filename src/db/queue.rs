//! Batched write queue
//!
//! Decouples producers from per-insert cost. Insert mode accumulates
//! documents in a buffer owned by a single worker task and submits them as
//! one bulk create when the buffer crosses its limit or on explicit flush;
//! update mode forwards each item as an upsert with limited concurrency and
//! no buffer. Flush contents are a point-in-time snapshot: documents pushed
//! while a flush is in flight land in the next batch.
//!
//! Threshold flushes have no caller to report to; their failures are logged
//! and the swept batch is not requeued.

use std::sync::Arc;

use bson::{Bson, Document};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info};

use crate::db::gateway::Gateway;
use crate::types::{GatehouseError, Result};

/// Flush threshold applied when the configured limit is non-positive
pub const DEFAULT_FLUSH_LIMIT: usize = 10_000;

/// Upserts processed concurrently in update mode
const UPDATE_CONCURRENCY: usize = 2;

/// Queued commands before producers are backpressured
const CHANNEL_CAPACITY: usize = 1024;

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Flush threshold; non-positive values fall back to the default
    pub limit: i64,
    /// Forward items as upserts instead of batching inserts
    pub update: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_FLUSH_LIMIT as i64,
            update: false,
        }
    }
}

impl QueueConfig {
    pub fn effective_limit(&self) -> usize {
        if self.limit <= 0 {
            DEFAULT_FLUSH_LIMIT
        } else {
            self.limit as usize
        }
    }
}

/// Result of an explicit flush
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushReport {
    /// Documents submitted by this flush
    pub flushed: usize,
}

enum QueueCommand {
    Push(Vec<Document>),
    Upsert { id: String, patch: Document },
    Flush(oneshot::Sender<Result<FlushReport>>),
}

/// Handle to a per-collection batching worker
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::Sender<QueueCommand>,
}

impl WriteQueue {
    /// Create the queue and start its worker task(s)
    pub fn new(gateway: Gateway, collection: impl Into<String>, config: QueueConfig) -> Self {
        let collection = collection.into();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        if config.update {
            // Update mode: no buffer, bounded concurrency
            let rx = Arc::new(Mutex::new(rx));
            for worker_id in 0..UPDATE_CONCURRENCY {
                let gateway = gateway.clone();
                let collection = collection.clone();
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    update_worker(worker_id, gateway, collection, rx).await;
                });
            }
        } else {
            let limit = config.effective_limit();
            tokio::spawn(async move {
                insert_worker(gateway, collection, limit, rx).await;
            });
        }

        Self { tx }
    }

    /// Queue documents for batched insertion
    pub async fn push(&self, docs: Vec<Document>) -> Result<()> {
        self.tx
            .send(QueueCommand::Push(docs))
            .await
            .map_err(|_| GatehouseError::Internal("write queue closed".into()))
    }

    /// Queue a single document
    pub async fn push_one(&self, doc: Document) -> Result<()> {
        self.push(vec![doc]).await
    }

    /// Queue an upsert work item (update mode)
    pub async fn push_update(&self, id: impl Into<String>, patch: Document) -> Result<()> {
        self.tx
            .send(QueueCommand::Upsert {
                id: id.into(),
                patch,
            })
            .await
            .map_err(|_| GatehouseError::Internal("write queue closed".into()))
    }

    /// Force submission of the current buffer, regardless of threshold.
    ///
    /// Safe to call with an empty buffer (no-op submission).
    pub async fn flush(&self) -> Result<FlushReport> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Flush(ack_tx))
            .await
            .map_err(|_| GatehouseError::Internal("write queue closed".into()))?;

        ack_rx
            .await
            .map_err(|_| GatehouseError::Internal("flush ack dropped".into()))?
    }
}

/// Insert-mode worker: owns the pending buffer; concurrency 1
async fn insert_worker(
    gateway: Gateway,
    collection: String,
    limit: usize,
    mut rx: mpsc::Receiver<QueueCommand>,
) {
    let mut pending: Vec<Document> = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            QueueCommand::Push(docs) => {
                pending.extend(docs);
                if pending.len() > limit {
                    let batch = std::mem::take(&mut pending);
                    debug!(collection = %collection, size = batch.len(), "threshold flush");
                    if let Err(e) = gateway.create_many(&collection, batch).await {
                        error!(collection = %collection, error = %e, "threshold flush failed");
                    }
                }
            }
            QueueCommand::Upsert { id, patch } => {
                // Accepted in insert mode too; forwarded directly
                if let Err(e) = gateway.upsert(&collection, &id, patch).await {
                    error!(collection = %collection, id = %id, error = %e, "queued upsert failed");
                }
            }
            QueueCommand::Flush(ack) => {
                let batch = std::mem::take(&mut pending);
                let flushed = batch.len();
                let result = if flushed == 0 {
                    Ok(FlushReport::default())
                } else {
                    gateway
                        .create_many(&collection, batch)
                        .await
                        .map(|_| FlushReport { flushed })
                };
                let _ = ack.send(result);
            }
        }
    }

    // Producers are gone; drain what is left
    if !pending.is_empty() {
        info!(collection = %collection, size = pending.len(), "draining buffer on shutdown");
        if let Err(e) = gateway.create_many(&collection, pending).await {
            error!(collection = %collection, error = %e, "shutdown drain failed");
        }
    }
}

/// Update-mode worker: forwards upserts; workers share the channel
async fn update_worker(
    worker_id: usize,
    gateway: Gateway,
    collection: String,
    rx: Arc<Mutex<mpsc::Receiver<QueueCommand>>>,
) {
    loop {
        let command = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(command) = command else {
            debug!(worker = worker_id, "update worker shutting down");
            return;
        };

        match command {
            QueueCommand::Upsert { id, patch } => {
                if let Err(e) = gateway.upsert(&collection, &id, patch).await {
                    error!(collection = %collection, id = %id, error = %e, "upsert failed");
                }
            }
            QueueCommand::Push(docs) => {
                // No buffer in update mode; items carry their own ids
                for mut doc in docs {
                    let id = match doc.remove("_id") {
                        Some(Bson::String(id)) => id,
                        Some(other) => other.to_string(),
                        None => {
                            error!(collection = %collection, "pushed document without identifier in update mode");
                            continue;
                        }
                    };
                    if let Err(e) = gateway.upsert(&collection, &id, doc).await {
                        error!(collection = %collection, id = %id, error = %e, "upsert failed");
                    }
                }
            }
            QueueCommand::Flush(ack) => {
                // Nothing is buffered in update mode
                let _ = ack.send(Ok(FlushReport::default()));
            }
        }
    }
}
