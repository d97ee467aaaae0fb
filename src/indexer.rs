//! Asynchronous mutation pipeline.
//!
//! Producers submit [`MutationJob`]s to an unbounded FIFO queue; a single
//! worker thread owns the index writer and applies the jobs in order. When
//! the queue stays empty for the idle timeout the worker flushes, or
//! optimizes once enough jobs have been applied since the last flush. While
//! it optimizes it raises the shared [`OptimizingFlag`] so the snapshot
//! provider holds off refreshing.
//!
//! Failures of single jobs are logged with the document id and the job is
//! dropped; nothing is retried.

pub mod job;
pub mod policy;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::content::{DocumentId, FieldSet};
use crate::error::{Result, SiftError};
use crate::lexical::{InvertedIndexWriterConfig, LexicalIndexWriter};

pub use job::MutationJob;
pub use policy::{IdleAction, idle_action};

/// Configuration of the writer worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// How long the queue must stay empty before housekeeping runs.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// More jobs than this since the last flush trigger an optimize.
    #[serde(default = "default_optimize_threshold")]
    pub optimize_threshold: usize,
    /// How long shutdown keeps applying queued jobs.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default)]
    pub writer: InvertedIndexWriterConfig,
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_optimize_threshold() -> usize {
    400
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            idle_timeout_ms: default_idle_timeout_ms(),
            optimize_threshold: default_optimize_threshold(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            writer: InvertedIndexWriterConfig::default(),
        }
    }
}

impl IndexerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Set while the index is being optimized.
///
/// Shared between the writer worker, which raises it, and the snapshot
/// provider, which skips refreshing while it is set.
#[derive(Debug, Clone, Default)]
pub struct OptimizingFlag(Arc<AtomicBool>);

impl OptimizingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raise the flag until the returned guard is dropped.
    pub fn raise(&self) -> OptimizingGuard<'_> {
        self.0.store(true, Ordering::Release);
        OptimizingGuard { flag: &self.0 }
    }
}

/// Clears the [`OptimizingFlag`] on drop.
#[derive(Debug)]
pub struct OptimizingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for OptimizingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// What the worker is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexerState {
    Idle = 0,
    Applying = 1,
    Flushing = 2,
    Optimizing = 3,
    Stopped = 4,
}

impl IndexerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => IndexerState::Idle,
            1 => IndexerState::Applying,
            2 => IndexerState::Flushing,
            3 => IndexerState::Optimizing,
            _ => IndexerState::Stopped,
        }
    }
}

/// Counters of the worker since it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    /// Jobs applied successfully.
    pub applied: u64,
    /// Jobs that failed and were dropped.
    pub failed: u64,
    pub flushes: u64,
    pub optimizes: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    applied: AtomicU64,
    failed: AtomicU64,
    flushes: AtomicU64,
    optimizes: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: IndexerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Handle to the writer worker.
#[derive(Debug)]
pub struct Indexer {
    jobs: Sender<MutationJob>,
    shutdown: Sender<()>,
    /// Cleared by shutdown. Held for reading while a job is sent, so no
    /// send can land after the worker's final drain.
    accepting: RwLock<bool>,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
    shared: Arc<Shared>,
    optimizing: OptimizingFlag,
}

impl Indexer {
    /// Start the worker thread. The worker owns `writer` from now on.
    pub fn start(
        writer: Box<dyn LexicalIndexWriter>,
        config: IndexerConfig,
        optimizing: OptimizingFlag,
    ) -> Result<Self> {
        let (jobs_tx, jobs_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = unbounded();
        let shared = Arc::new(Shared::default());

        let worker = Worker {
            writer,
            jobs: jobs_rx,
            shutdown: shutdown_rx,
            config,
            optimizing: optimizing.clone(),
            shared: Arc::clone(&shared),
            applied_since_flush: 0,
        };
        let handle = thread::Builder::new()
            .name("sift-indexer".to_string())
            .spawn(move || worker.run())?;
        info!("Indexer started");

        Ok(Indexer {
            jobs: jobs_tx,
            shutdown: shutdown_tx,
            accepting: RwLock::new(true),
            handle: Mutex::new(Some(handle)),
            shared,
            optimizing,
        })
    }

    /// Queue an upsert of `fields` under `id`.
    ///
    /// Fails with a validation error when `fields` belong to another id.
    pub fn submit_upsert<F: FieldSet + 'static>(&self, id: DocumentId, fields: F) -> Result<()> {
        if fields.document_id() != &id {
            return Err(SiftError::validation(format!(
                "field set belongs to {}, not {id}",
                fields.document_id()
            )));
        }
        self.submit(MutationJob::Upsert {
            id,
            fields: Box::new(fields),
        });
        Ok(())
    }

    /// Queue a delete of whatever is indexed under `id`.
    pub fn submit_delete(&self, id: DocumentId) -> Result<()> {
        self.submit(MutationJob::Delete { id });
        Ok(())
    }

    /// Queue a job. Never waits for the worker; jobs submitted after
    /// shutdown are logged and dropped.
    ///
    /// Returns whether the job was queued. A queued job is applied, or
    /// logged as dropped when the shutdown grace period runs out.
    pub fn submit(&self, job: MutationJob) -> bool {
        let accepting = self.accepting.read();
        if !*accepting {
            error!(
                "Indexer is shut down, dropping {} job for document ({})",
                job.kind(),
                job.id()
            );
            return false;
        }
        match self.jobs.send(job) {
            Ok(()) => true,
            Err(e) => {
                let job = e.into_inner();
                error!(
                    "Failed to queue {} job for document ({}): worker has stopped",
                    job.kind(),
                    job.id()
                );
                false
            }
        }
    }

    pub fn state(&self) -> IndexerState {
        IndexerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> IndexerStats {
        IndexerStats {
            applied: self.shared.applied.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            flushes: self.shared.flushes.load(Ordering::Relaxed),
            optimizes: self.shared.optimizes.load(Ordering::Relaxed),
        }
    }

    /// Number of jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.jobs.len()
    }

    pub fn optimizing_flag(&self) -> &OptimizingFlag {
        &self.optimizing
    }

    /// Stop the worker.
    ///
    /// The worker applies jobs still queued for at most the shutdown grace
    /// period, commits and closes the writer. Calling this again is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        *self.accepting.write() = false;
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };
        // The worker may already have exited on its own.
        let _ = self.shutdown.send(());
        let result = handle
            .join()
            .map_err(|_| SiftError::invalid_operation("indexer thread panicked"))?;
        info!("Indexer stopped");
        result
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Indexer shutdown failed: {e}");
        }
    }
}

struct Worker {
    writer: Box<dyn LexicalIndexWriter>,
    jobs: Receiver<MutationJob>,
    shutdown: Receiver<()>,
    config: IndexerConfig,
    optimizing: OptimizingFlag,
    shared: Arc<Shared>,
    applied_since_flush: usize,
}

impl Worker {
    fn run(mut self) -> Result<()> {
        let idle_timeout = self.config.idle_timeout();
        let jobs = self.jobs.clone();
        let shutdown = self.shutdown.clone();
        loop {
            select! {
                recv(jobs) -> job => match job {
                    Ok(job) => self.apply(job),
                    // Every handle is gone.
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
                default(idle_timeout) => self.on_idle(),
            }
        }
        self.stop()
    }

    fn apply(&mut self, job: MutationJob) {
        self.shared.set_state(IndexerState::Applying);
        let id = job.id().clone();
        let kind = job.kind();
        let result = match job {
            MutationJob::Upsert { id, fields } => self.upsert(&id, fields.as_ref()),
            MutationJob::Delete { id } => self.writer.delete_documents(&id.key()).map(|_| ()),
        };

        match result {
            Ok(()) => {
                self.shared.applied.fetch_add(1, Ordering::Relaxed);
                debug!("Applied {kind} for document ({id})");
            }
            Err(e) => {
                self.shared.failed.fetch_add(1, Ordering::Relaxed);
                let e = SiftError::mutation_apply(id.to_string(), e.to_string());
                error!("{kind} failed: {e}");
            }
        }
        // Attempts count, not successes.
        self.applied_since_flush += 1;
        self.shared.set_state(IndexerState::Idle);
    }

    fn upsert(&mut self, id: &DocumentId, fields: &dyn FieldSet) -> Result<()> {
        let doc = fields.to_document()?;
        self.writer.delete_documents(&id.key())?;
        self.writer.add_document(doc)
    }

    fn on_idle(&mut self) {
        match idle_action(self.applied_since_flush, self.config.optimize_threshold) {
            IdleAction::Idle => return,
            IdleAction::Optimize => {
                let _optimizing = self.optimizing.raise();
                self.shared.set_state(IndexerState::Optimizing);
                info!(
                    "Optimizing index after {} changes",
                    self.applied_since_flush
                );
                match self.writer.optimize() {
                    Ok(()) => {
                        self.shared.optimizes.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => error!("Index optimize failed: {e}"),
                }
            }
            IdleAction::Flush => {
                self.shared.set_state(IndexerState::Flushing);
                match self.writer.commit() {
                    Ok(()) => {
                        self.shared.flushes.fetch_add(1, Ordering::Relaxed);
                        debug!("Flushed {} changes", self.applied_since_flush);
                    }
                    Err(e) => error!("Index flush failed: {e}"),
                }
            }
        }
        self.applied_since_flush = 0;
        self.shared.set_state(IndexerState::Idle);
    }

    fn stop(mut self) -> Result<()> {
        info!("Indexer thread shutting down");
        let deadline = Instant::now() + self.config.shutdown_grace();
        while Instant::now() < deadline {
            match self.jobs.try_recv() {
                Ok(job) => self.apply(job),
                Err(_) => break,
            }
        }
        for job in self.jobs.try_iter() {
            warn!(
                "Dropping {} job for document ({}): shutdown grace period elapsed",
                job.kind(),
                job.id()
            );
        }

        self.shared.set_state(IndexerState::Stopped);
        info!("Closing writer");
        let result = self.writer.close();
        if let Err(e) = &result {
            error!("Failed to close the index writer: {e}");
        }
        result
    }
}
