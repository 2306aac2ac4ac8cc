use crate::{Queue, SyncMetrics, SyncTask};
use anyhow::Result;
use semaphore_policy_core::{
    owner_labels, NetworkSetClient, NetworkSetId, Op, Scope, Selector, SharedStore,
};
use std::future::Future;
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, error, info, instrument};

/// Applies sync tasks to the external API, one at a time.
pub struct Controller<C> {
    client: C,
    store: SharedStore,

    /// Matches the external network sets owned by this controller.
    selector: Selector,

    queue: Queue,
    tasks: mpsc::Receiver<SyncTask>,
    full_syncs: mpsc::Receiver<()>,
    resync_period: time::Duration,

    /// Set once the first full sync has listed the external network sets. Changes made after
    /// that point are not covered by the full sync and must be requested individually.
    initialized: watch::Sender<bool>,
}

#[derive(Copy, Clone, Debug)]
pub struct Params {
    pub queue_size: usize,

    /// How long a sync request may wait for the controller to accept it.
    pub enqueue_timeout: time::Duration,

    /// How long a failed sync waits before it is queued again.
    pub backoff: time::Duration,

    /// The interval between full syncs.
    pub resync_period: time::Duration,
}

// === impl Params ===

impl Default for Params {
    fn default() -> Self {
        Self {
            queue_size: 1,
            enqueue_timeout: time::Duration::from_secs(5),
            backoff: time::Duration::from_secs(5),
            resync_period: time::Duration::from_secs(60 * 60),
        }
    }
}

// === impl Controller ===

impl<C> Controller<C>
where
    C: NetworkSetClient,
{
    pub fn new(
        client: C,
        store: SharedStore,
        scope: &Scope,
        params: Params,
        metrics: SyncMetrics,
    ) -> (Self, Queue) {
        let (tasks_tx, tasks) = mpsc::channel(params.queue_size.max(1));
        let (full_syncs_tx, full_syncs) = mpsc::channel(1);
        let queue = Queue::new(
            tasks_tx,
            full_syncs_tx,
            params.enqueue_timeout,
            params.backoff,
            metrics,
        );
        let (initialized, _) = watch::channel(false);
        let controller = Self {
            client,
            store,
            selector: owner_labels(scope),
            queue: queue.clone(),
            tasks,
            full_syncs,
            resync_period: params.resync_period,
            initialized,
        };
        (controller, queue)
    }

    /// Watches whether sync requests are accepted.
    pub fn initialized(&self) -> watch::Receiver<bool> {
        self.initialized.subscribe()
    }

    /// Processes sync tasks and full syncs until `shutdown` completes.
    ///
    /// Periodic full syncs start once the first requested full sync has listed the external
    /// network sets.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        let mut resync = time::interval(self.resync_period);
        resync.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("Stopping network set sync");
                    return;
                }

                Some(()) = self.full_syncs.recv() => {
                    self.full_sync().await;
                    resync.reset();
                }

                _ = resync.tick(), if *self.initialized.borrow() => {
                    self.full_sync().await;
                    resync.reset();
                }

                Some(SyncTask { id }) = self.tasks.recv() => {
                    self.sync(&id).await;
                }
            }
        }
    }

    /// Syncs a single network set, requeueing it on failure.
    async fn sync(&self, id: &NetworkSetId) {
        if let Err(error) = self.reconcile(id).await {
            error!(%id, %error, "Failed to sync network set");
            self.queue.requeue(id.clone());
        }
    }

    #[instrument(skip_all, fields(%id))]
    async fn reconcile(&self, id: &NetworkSetId) -> Result<()> {
        let op = self.store.read().reconcile(id);
        match op {
            Op::Apply {
                id,
                labels,
                addresses,
            } => {
                info!(?addresses, "Updating network set");
                self.client
                    .create_or_update(&id, &labels, &addresses)
                    .await
            }
            Op::Delete { id } => {
                info!("Network set not in store; deleting");
                self.client.delete(&id).await
            }
        }
    }

    /// Deletes the owned external network sets that are not in the store, then pushes every
    /// network set in the store.
    async fn full_sync(&self) {
        debug!("Starting full sync");
        let remote = match self.client.list(&self.selector).await {
            Ok(remote) => remote,
            Err(error) => {
                error!(%error, "Failed to list network sets; stale network sets may be left behind");
                if !*self.initialized.borrow() {
                    self.queue.requeue_full_sync();
                }
                return;
            }
        };

        // Opened before the store is read; later changes are requested individually.
        if !*self.initialized.borrow() {
            info!("Initial listing complete; accepting sync requests");
            self.initialized.send_replace(true);
        }

        let stale = {
            let store = self.store.read();
            remote
                .into_iter()
                .filter(|set| self.selector.matches(&set.labels))
                .map(|set| set.id)
                .filter(|id| !store.contains(id.as_str()))
                .collect::<Vec<_>>()
        };
        for id in stale.iter() {
            self.sync(id).await;
        }

        let current = self.store.read().ids();
        for id in current.iter() {
            self.sync(id).await;
        }
        debug!(stale = stale.len(), current = current.len(), "Full sync complete");
    }
}
