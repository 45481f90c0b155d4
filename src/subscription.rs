//! Background task that pumps backend snapshots into a store.
//!
//! One task runs per successful [`attach`](crate::BookingStore::attach). It
//! owns the [`SnapshotStream`] and stops when the store signals shutdown,
//! when the store is dropped, or when the stream fails. Every snapshot is
//! applied under the store's session lock together with a generation check,
//! so a superseded task can never write into the view.

use std::sync::Weak;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use crate::error::RemoteError;
use crate::remote::SnapshotStream;
use crate::store::Shared;

/// Owner's side of a running subscription task.
pub(crate) struct SubscriptionHandle {
    /// Sends `true` to stop the task. Dropping it also stops the task.
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Signal the task to stop and hand back its join handle.
    ///
    /// The task exits at its next poll. Pushes it may still receive before
    /// then are rejected by the generation check.
    pub(crate) fn cancel(self) -> JoinHandle<()> {
        // The receiver is gone only if the task already exited.
        let _ = self.shutdown_tx.send(true);
        self.task
    }
}

/// Spawn the pump for `stream` on the current tokio runtime.
pub(crate) fn spawn(
    shared: Weak<Shared>,
    generation: u64,
    stream: SnapshotStream,
) -> SubscriptionHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_subscription(shared, generation, stream, shutdown_rx));
    SubscriptionHandle { shutdown_tx, task }
}

/// How a stream stopped delivering.
enum StreamOutcome {
    /// Cancelled by the store, or the store is gone.
    Cancelled,
    /// The backend failed or closed the channel.
    Failed(RemoteError),
}

async fn run_subscription(
    shared: Weak<Shared>,
    generation: u64,
    mut stream: SnapshotStream,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let outcome = loop {
        tokio::select! {
            biased;
            // Fires on an explicit signal and when the handle is dropped.
            _ = shutdown_rx.changed() => break StreamOutcome::Cancelled,
            item = stream.next() => match item {
                Some(Ok(snapshot)) => {
                    let Some(shared) = shared.upgrade() else {
                        break StreamOutcome::Cancelled;
                    };
                    if !shared.apply_snapshot(generation, snapshot) {
                        break StreamOutcome::Cancelled;
                    }
                }
                Some(Err(e)) => break StreamOutcome::Failed(e),
                None => break StreamOutcome::Failed(RemoteError::Closed),
            },
        }
    };

    match outcome {
        StreamOutcome::Cancelled => {
            tracing::debug!(generation, "subscription task stopped");
        }
        StreamOutcome::Failed(e) => {
            if let Some(shared) = shared.upgrade() {
                shared.fail_subscription(generation, e);
            }
        }
    }
}
