//! Background Sweep-and-Snapshot Task
//!
//! Lazy expiry (checking on access) has a gap: a key that expires and is
//! never touched again would sit in memory forever. The sweeper closes it
//! with a periodic task that scans for expired entries on a fixed cadence.
//!
//! Each tick does two things, in order:
//!
//! 1. sweep the store, deleting every entry whose expiry has passed, and
//! 2. write a snapshot, but only if the dirty flag says anything changed
//!    since the last one.
//!
//! The snapshot gate decouples request latency from disk I/O: mutations just
//! raise the flag, and only the sweeper pays for serialization.
//!
//! Shutdown is signalled through a `watch` channel. On receipt the loop
//! returns immediately without a final sweep or save; a caller that wants a
//! final flush calls [`TypedStore::save_to_file`] itself during shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::storage::TypedStore;

/// Default cadence between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A handle to the running sweeper task.
///
/// The task stops when [`Sweeper::stop`] is called or the handle is dropped.
#[derive(Debug)]
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl Sweeper {
    /// Starts the sweeper as a background task.
    ///
    /// `snapshot_path` is where dirty ticks persist the store; `interval` is
    /// the fixed tick cadence.
    pub fn start(store: Arc<TypedStore>, snapshot_path: PathBuf, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweep_loop(store, snapshot_path, interval, shutdown_rx));
        info!(interval_secs = interval.as_secs(), "sweeper started");

        Self { shutdown_tx }
    }

    /// Signals the sweeper task to stop. Also happens on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("sweeper stopped");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn sweep_loop(
    store: Arc<TypedStore>,
    snapshot_path: PathBuf,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick of a tokio interval fires immediately; skip it so the
    // first sweep happens one full interval after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = store.sweep();
                if removed > 0 {
                    debug!(removed, "sweep tick removed expired keys");
                }
                if store.take_dirty() {
                    if let Err(e) = store.save_to_file(&snapshot_path) {
                        warn!(error = %e, path = %snapshot_path.display(),
                              "periodic snapshot failed");
                        // Leave the flag raised so the next tick retries.
                        store.mark_dirty();
                    }
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("sweeper received shutdown signal");
                    return;
                }
            }
        }
    }
}
