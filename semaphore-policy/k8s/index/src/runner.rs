use crate::PodIndex;
use semaphore_policy_core::NetworkSetId;
use semaphore_policy_k8s_api::{Event, Pod, Watch};
use semaphore_policy_sync::Queue;
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Feeds pod events into a [`PodIndex`] and queues the resulting syncs.
pub struct Runner {
    index: PodIndex,
    queue: Queue,

    /// Syncs are only queued once the controller's first full sync has listed the external
    /// network sets. Changes made before then are pushed by that full sync.
    initialized: watch::Receiver<bool>,

    /// Set once the first pod listing completes.
    synced: bool,
}

// === impl Runner ===

impl Runner {
    pub fn new(index: PodIndex, queue: Queue, initialized: watch::Receiver<bool>) -> Self {
        Self {
            index,
            queue,
            initialized,
            synced: false,
        }
    }

    pub fn has_synced(&self) -> bool {
        self.synced
    }

    /// Processes pod events until `shutdown` completes or the watch ends.
    pub async fn run(mut self, mut pods: Watch<Pod>, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("Stopping pod index");
                    return;
                }

                ev = pods.recv() => match ev {
                    Some(ev) => self.handle(ev).await,
                    None => {
                        error!("Pod watch terminated");
                        return;
                    }
                },
            }
        }
    }

    pub async fn handle(&mut self, ev: Event<Pod>) {
        let syncs = match ev {
            Event::Init => {
                debug!("Listing pods");
                self.index.reset();
                return;
            }
            Event::InitApply(pod) | Event::Apply(pod) => self.index.apply(pod),
            Event::InitDone => {
                let syncs = self.index.reset_done();
                if !self.synced {
                    info!("Initial pod listing complete");
                    self.synced = true;
                    self.queue.request_full_sync();
                }
                syncs
            }
            Event::Delete(pod) => self.index.delete(pod),
        };
        self.request_syncs(syncs).await;
    }

    async fn request_syncs(&self, syncs: Vec<NetworkSetId>) {
        if syncs.is_empty() {
            return;
        }
        if !*self.initialized.borrow() {
            debug!(?syncs, "Skipping syncs until the initial full sync lists network sets");
            return;
        }
        for id in syncs {
            self.queue.request_sync(id).await;
        }
    }
}
