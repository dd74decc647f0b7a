//! Debounced writer for per-track speed and pitch edits
//!
//! A slider drag produces a stream of edits. They are merged per track and
//! written once the stream has been quiet for the configured period, or
//! immediately on [`SettingsWriter::flush`].

use crate::db::{TrackPatch, TrackStore};
use crate::error::Error;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

enum WriterCommand {
    Stage { track_id: i64, patch: TrackPatch },
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct SettingsWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
    writes: Arc<AtomicU64>,
}

impl SettingsWriter {
    /// Start the writer task on the current runtime
    pub fn spawn(store: TrackStore, quiet_period: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writes = Arc::new(AtomicU64::new(0));

        tokio::spawn(run_writer(store, quiet_period, rx, Arc::clone(&writes)));

        Self { tx, writes }
    }

    /// Queue an edit; it replaces earlier pending values field by field
    pub fn stage(&self, track_id: i64, patch: TrackPatch) {
        if self.tx.send(WriterCommand::Stage { track_id, patch }).is_err() {
            warn!("Settings writer stopped; dropping edit for track {}", track_id);
        }
    }

    /// Write everything pending and wait for it
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Number of track writes performed so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

async fn run_writer(
    store: TrackStore,
    quiet_period: Duration,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    writes: Arc<AtomicU64>,
) {
    let mut pending: HashMap<i64, TrackPatch> = HashMap::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = rx.recv() => command,
                _ = tokio::time::sleep_until(at) => {
                    write_pending(&store, &mut pending, &writes).await;
                    deadline = None;
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match command {
            Some(WriterCommand::Stage { track_id, patch }) => {
                pending.entry(track_id).or_default().merge(patch);
                deadline = Some(Instant::now() + quiet_period);
            }
            Some(WriterCommand::Flush(ack)) => {
                write_pending(&store, &mut pending, &writes).await;
                deadline = None;
                let _ = ack.send(());
            }
            None => {
                write_pending(&store, &mut pending, &writes).await;
                debug!("Settings writer stopped");
                break;
            }
        }
    }
}

async fn write_pending(
    store: &TrackStore,
    pending: &mut HashMap<i64, TrackPatch>,
    writes: &AtomicU64,
) {
    for (track_id, patch) in pending.drain() {
        match store.update(track_id, patch).await {
            Ok(_) => {
                writes.fetch_add(1, Ordering::Relaxed);
                debug!("Persisted playback settings for track {}", track_id);
            }
            // Deleted while the edit was pending
            Err(Error::NotFound(_)) => {}
            Err(e) => warn!("Failed to persist settings for track {}: {}", track_id, e),
        }
    }
}
