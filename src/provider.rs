//! Snapshot provider.
//!
//! Keeps a recent [`Snapshot`] of the index published for readers. A
//! background thread wakes up every refresh interval and, unless the index
//! is being optimized or the published snapshot is still current, opens a
//! new snapshot and swaps it in. Readers clone the `Arc` under a short lock
//! and run their queries without holding it; a replaced snapshot lives on
//! until its last reader drops it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, select, unbounded};
use log::{debug, error, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};
use crate::indexer::OptimizingFlag;
use crate::lexical::{InvertedIndex, Snapshot};

/// Configuration of the snapshot provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A snapshot of this generation was published.
    Refreshed(u64),
    /// The published snapshot is still current.
    Current,
    /// Skipped because the index is being optimized.
    Deferred,
    /// Opening or checking the snapshot failed; the previous one stays.
    Failed,
}

#[derive(Debug)]
struct Published {
    index: Arc<InvertedIndex>,
    optimizing: OptimizingFlag,
    current: Mutex<Option<Arc<Snapshot>>>,
}

impl Published {
    fn refresh(&self) -> RefreshOutcome {
        if self.optimizing.is_set() {
            info!("Indexer is optimizing, delaying snapshot refresh");
            return RefreshOutcome::Deferred;
        }

        let current = self.current.lock().clone();
        if let Some(snapshot) = current {
            match snapshot.is_current() {
                Ok(true) => return RefreshOutcome::Current,
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to determine index status: {e}");
                    return RefreshOutcome::Failed;
                }
            }
        }

        self.open()
    }

    fn open(&self) -> RefreshOutcome {
        match self.index.open_snapshot() {
            Ok(snapshot) => self.publish(snapshot),
            Err(e) => {
                error!("Failed to open snapshot: {e}");
                RefreshOutcome::Failed
            }
        }
    }

    /// Swap in `snapshot` unless a newer generation is already published.
    fn publish(&self, snapshot: Snapshot) -> RefreshOutcome {
        let generation = snapshot.generation();
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|c| c.generation() > generation) {
            drop(current);
            debug!("Discarding snapshot of generation {generation}, a newer one is published");
            return RefreshOutcome::Current;
        }
        let replaced = current.replace(Arc::new(snapshot));
        drop(current);
        // Released outside the lock.
        drop(replaced);
        debug!("Published snapshot of generation {generation}");
        RefreshOutcome::Refreshed(generation)
    }
}

/// Publishes snapshots of an index and refreshes them in the background.
#[derive(Debug)]
pub struct SnapshotProvider {
    published: Arc<Published>,
    shutdown: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotProvider {
    /// Open the initial snapshot and start the refresh thread.
    ///
    /// A failure to open the initial snapshot is logged; reads fail with
    /// [`SiftError::EngineUnavailable`] until a later cycle succeeds.
    pub fn start(
        index: Arc<InvertedIndex>,
        optimizing: OptimizingFlag,
        config: ProviderConfig,
    ) -> Result<Self> {
        let published = Arc::new(Published {
            index,
            optimizing,
            current: Mutex::new(None),
        });
        info!("Creating initial snapshot");
        published.open();

        let (shutdown_tx, shutdown_rx) = unbounded::<()>();
        let interval = config.refresh_interval();
        let worker = Arc::clone(&published);
        let handle = thread::Builder::new()
            .name("sift-snapshot-provider".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        default(interval) => {
                            worker.refresh();
                        }
                    }
                }
                debug!("Snapshot provider thread exiting");
            })?;

        Ok(SnapshotProvider {
            published,
            shutdown: shutdown_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// The published snapshot.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.published
            .current
            .lock()
            .clone()
            .ok_or_else(|| SiftError::engine_unavailable("no index snapshot is available"))
    }

    /// Run one refresh cycle now.
    pub fn refresh(&self) -> RefreshOutcome {
        self.published.refresh()
    }

    /// Stop the refresh thread. Published snapshots stay readable.
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.shutdown.send(());
        if handle.join().is_err() {
            error!("Snapshot provider thread panicked");
        }
    }
}

impl Drop for SnapshotProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}
