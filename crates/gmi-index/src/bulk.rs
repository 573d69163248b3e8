//! Bulk indexer: batches index operations and flushes them to the store.
//!
//! # Architecture
//!
//! ```text
//! stream tasks ──enqueue()──► unbounded channel ──► collector task
//!                                                      │ batch.len() == batch_size
//!                                                      │ or flush_interval since last flush
//!                                                      ▼
//!                                          flush worker (≤ workers in flight)
//!                                                      │ BulkSink::send
//!                                                      ▼
//!                                          on_flush(id, FlushResult)
//! ```
//!
//! `enqueue` never blocks. Failed operations are reported through the flush
//! callback and dropped; nothing is retried.
//!
//! [`BulkIndexer::close`] flushes whatever is batched, waits for in-flight
//! flushes, then releases the sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gmi_core::config::BulkConfig;
use gmi_core::lifecycle::ShutdownCoordinator;
use gmi_core::{FlushResult, IndexOperation, OperationSink};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Destination of flushed batches (the index store, or a fake in tests).
#[async_trait]
pub trait BulkSink: Send + Sync {
    /// Write one batch. An `Err` means the whole request failed.
    async fn send(&self, ops: &[IndexOperation]) -> anyhow::Result<FlushResult>;

    /// Release the underlying connection.
    async fn close(&self) {}
}

/// Invoked after every flush with the flush id and its result.
pub type FlushCallback = Arc<dyn Fn(u64, &FlushResult) + Send + Sync>;

/// Flush policy.
#[derive(Debug, Clone)]
pub struct BulkSettings {
    pub batch_size: usize,
    pub workers: usize,
    pub flush_interval: Duration,
    pub stats_enabled: bool,
}

impl From<&BulkConfig> for BulkSettings {
    fn from(cfg: &BulkConfig) -> Self {
        Self {
            batch_size: cfg.batch_size.max(1),
            workers: cfg.workers.max(1),
            flush_interval: cfg.flush_interval(),
            stats_enabled: cfg.stats_enabled,
        }
    }
}

/// Cumulative counters, kept when `stats_enabled` is set.
#[derive(Debug, Default)]
pub struct BulkStats {
    enqueued: AtomicU64,
    flushes: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`BulkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStatsSnapshot {
    pub enqueued: u64,
    pub flushes: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl BulkStats {
    fn record_flush(&self, result: &FlushResult) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.succeeded.fetch_add(result.succeeded as u64, Ordering::Relaxed);
        self.failed.fetch_add(result.failed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BulkStatsSnapshot {
        BulkStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Default flush callback: log the counts.
pub fn log_flush(id: u64, result: &FlushResult) {
    if result.succeeded > 0 {
        info!("[bulk] flush #{id}: sent {} document(s)", result.succeeded);
    }
    if result.failed > 0 {
        warn!("[bulk] flush #{id}: {} document(s) failed", result.failed);
    }
}

enum Command {
    Op(IndexOperation),
    Close(oneshot::Sender<()>),
}

/// Handle to a running bulk indexer. Cheap to clone; all clones share one batch.
#[derive(Clone)]
pub struct BulkIndexer {
    tx: mpsc::UnboundedSender<Command>,
    stats: Option<Arc<BulkStats>>,
}

impl BulkIndexer {
    /// Spawn the collector task and return a handle to it.
    pub fn start(sink: Arc<dyn BulkSink>, settings: BulkSettings, on_flush: FlushCallback) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = settings.stats_enabled.then(|| Arc::new(BulkStats::default()));

        info!(
            "[bulk] started (batch_size={}, workers={}, flush_interval={:?})",
            settings.batch_size, settings.workers, settings.flush_interval
        );

        let collector = Collector {
            semaphore: Arc::new(Semaphore::new(settings.workers)),
            batch: Vec::with_capacity(settings.batch_size),
            in_flight: JoinSet::new(),
            next_id: 0,
            sink,
            settings,
            on_flush,
            stats: stats.clone(),
        };
        tokio::spawn(collector.run(rx));

        Self { tx, stats }
    }

    /// Queue one operation. Never blocks.
    pub fn enqueue(&self, op: IndexOperation) {
        if self.tx.send(Command::Op(op)).is_err() {
            debug!("[bulk] indexer closed, dropping operation");
            return;
        }
        if let Some(stats) = &self.stats {
            stats.enqueued.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Cumulative counters, or `None` when stats are disabled.
    pub fn stats(&self) -> Option<BulkStatsSnapshot> {
        self.stats.as_ref().map(|s| s.snapshot())
    }

    /// Flush the pending batch, wait for in-flight flushes, release the sink.
    ///
    /// Operations enqueued after `close` are dropped. Calling `close` again is a no-op.
    pub async fn close(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Close(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Register a task with `coordinator` that closes this indexer once the
    /// lifetime token is cancelled.
    pub fn spawn_shutdown_task(&self, coordinator: &ShutdownCoordinator) -> JoinHandle<()> {
        let indexer = self.clone();
        let token = coordinator.token();
        coordinator.spawn("bulk-indexer", async move {
            token.cancelled().await;
            info!("[bulk] shutting down bulk indexer");
            indexer.close().await;
            if let Some(s) = indexer.stats() {
                info!(
                    "[bulk] totals: enqueued={} flushes={} succeeded={} failed={}",
                    s.enqueued, s.flushes, s.succeeded, s.failed
                );
            }
            info!("[bulk] bulk indexer shut down");
        })
    }
}

impl OperationSink for BulkIndexer {
    fn enqueue(&self, op: IndexOperation) {
        BulkIndexer::enqueue(self, op);
    }
}

struct Collector {
    sink: Arc<dyn BulkSink>,
    settings: BulkSettings,
    on_flush: FlushCallback,
    stats: Option<Arc<BulkStats>>,
    semaphore: Arc<Semaphore>,
    batch: Vec<IndexOperation>,
    in_flight: JoinSet<()>,
    next_id: u64,
}

impl Collector {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut deadline = Instant::now() + self.settings.flush_interval;

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Op(op)) => {
                        if self.push(op).await {
                            deadline = Instant::now() + self.settings.flush_interval;
                        }
                    }
                    Some(Command::Close(done)) => {
                        rx.close();
                        let mut waiters = vec![done];
                        // Operations queued behind `Close` were already accepted.
                        while let Ok(cmd) = rx.try_recv() {
                            match cmd {
                                Command::Op(op) => {
                                    self.push(op).await;
                                }
                                Command::Close(done) => waiters.push(done),
                            }
                        }
                        self.drain().await;
                        for done in waiters {
                            let _ = done.send(());
                        }
                        return;
                    }
                    None => {
                        self.drain().await;
                        return;
                    }
                },

                _ = tokio::time::sleep_until(deadline) => {
                    if !self.batch.is_empty() {
                        self.dispatch().await;
                    }
                    deadline = Instant::now() + self.settings.flush_interval;
                }

                Some(res) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = res {
                        error!("[bulk] flush worker failed: {e}");
                    }
                }
            }
        }
    }

    /// Add one operation, flushing when the batch is full. Returns `true` on flush.
    async fn push(&mut self, op: IndexOperation) -> bool {
        self.batch.push(op);
        if self.batch.len() < self.settings.batch_size {
            return false;
        }
        self.dispatch().await;
        true
    }

    /// Hand the current batch to a flush worker, waiting for a free slot.
    async fn dispatch(&mut self) {
        let ops = std::mem::replace(&mut self.batch, Vec::with_capacity(self.settings.batch_size));
        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
            error!("[bulk] worker pool closed, dropping {} operation(s)", ops.len());
            return;
        };

        self.next_id += 1;
        let id = self.next_id;
        let sink = self.sink.clone();
        let on_flush = self.on_flush.clone();
        let stats = self.stats.clone();

        debug!("[bulk] flush #{id}: {} operation(s)", ops.len());
        self.in_flight.spawn(async move {
            let _permit = permit;
            let result = match sink.send(&ops).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("[bulk] flush #{id} failed: {e:#}");
                    FlushResult::all_failed(ops.len())
                }
            };
            if let Some(stats) = &stats {
                stats.record_flush(&result);
            }
            on_flush(id, &result);
        });
    }

    async fn drain(&mut self) {
        if !self.batch.is_empty() {
            self.dispatch().await;
        }
        while let Some(res) = self.in_flight.join_next().await {
            if let Err(e) = res {
                error!("[bulk] flush worker failed: {e}");
            }
        }
        self.sink.close().await;
        info!("[bulk] released index store connection");
    }
}
