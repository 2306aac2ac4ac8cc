use crate::SyncMetrics;
use ahash::AHashSet as HashSet;
use parking_lot::Mutex;
use semaphore_policy_core::NetworkSetId;
use std::sync::Arc;
use tokio::{
    sync::mpsc::{
        self,
        error::{SendTimeoutError, TrySendError},
    },
    time,
};
use tracing::{debug, warn};

/// Requests that the network set be re-derived from the store and pushed to (or deleted from)
/// the external API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncTask {
    pub id: NetworkSetId,
}

/// Hands sync tasks to the [`Controller`](crate::Controller).
#[derive(Clone, Debug)]
pub struct Queue {
    tasks: mpsc::Sender<SyncTask>,
    full_syncs: mpsc::Sender<()>,

    /// Network sets with a requeue waiting out its backoff.
    backoffs: Arc<Mutex<HashSet<NetworkSetId>>>,

    enqueue_timeout: time::Duration,
    backoff: time::Duration,
    metrics: SyncMetrics,
}

// === impl Queue ===

impl Queue {
    pub(crate) fn new(
        tasks: mpsc::Sender<SyncTask>,
        full_syncs: mpsc::Sender<()>,
        enqueue_timeout: time::Duration,
        backoff: time::Duration,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            tasks,
            full_syncs,
            backoffs: Default::default(),
            enqueue_timeout,
            backoff,
            metrics,
        }
    }

    /// Queues a sync of the network set.
    ///
    /// Waits up to the enqueue timeout for the controller to accept the task. If it does not,
    /// the task is requeued after the backoff.
    pub async fn request_sync(&self, id: NetworkSetId) {
        let task = SyncTask { id };
        match self.tasks.send_timeout(task, self.enqueue_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(SyncTask { id })) => {
                warn!(%id, timeout = ?self.enqueue_timeout, "Timed out queueing sync task; the sync queue is full");
                self.metrics.queue_full(&id);
                self.requeue(id);
            }
            Err(SendTimeoutError::Closed(SyncTask { id })) => {
                debug!(%id, "Sync queue closed; dropping sync task");
            }
        }
    }

    /// Schedules a sync of the network set once the backoff elapses. Never blocks.
    ///
    /// A network set is waiting out at most one backoff at a time: requeueing it again before the
    /// pending requeue fires has no effect.
    pub fn requeue(&self, id: NetworkSetId) {
        if !self.backoffs.lock().insert(id.clone()) {
            debug!(%id, "Sync task already requeued");
            return;
        }
        self.metrics.requeued(&id);
        debug!(%id, backoff = ?self.backoff, "Requeueing sync task");

        let queue = self.clone();
        tokio::spawn(async move {
            time::sleep(queue.backoff).await;
            queue.backoffs.lock().remove(&id);
            queue.request_sync(id).await;
        });
    }

    /// Asks the controller to run a full sync. Has no effect if one is already pending.
    pub fn request_full_sync(&self) {
        match self.full_syncs.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => debug!("Sync queue closed; dropping full sync"),
        }
    }

    /// Asks the controller to run a full sync once the backoff elapses.
    pub(crate) fn requeue_full_sync(&self) {
        debug!(backoff = ?self.backoff, "Requeueing full sync");
        let queue = self.clone();
        tokio::spawn(async move {
            time::sleep(queue.backoff).await;
            queue.request_full_sync();
        });
    }
}
