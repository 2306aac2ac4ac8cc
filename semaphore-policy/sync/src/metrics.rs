use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use semaphore_policy_core::NetworkSetId;

#[derive(Clone, Debug)]
pub struct SyncMetrics {
    queue_full: Family<NetworkSetLabels, Counter>,
    requeues: Family<NetworkSetLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct NetworkSetLabels {
    globalnetworkset: String,
}

impl SyncMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let queue_full = Family::default();
        prom.register(
            "sync_queue_full_failures",
            "Count of sync tasks that could not be queued in time because the sync queue was full",
            queue_full.clone(),
        );

        let requeues = Family::default();
        prom.register(
            "sync_requeue",
            "Count of sync tasks scheduled for a retry",
            requeues.clone(),
        );

        Self {
            queue_full,
            requeues,
        }
    }

    pub(crate) fn queue_full(&self, id: &NetworkSetId) {
        self.queue_full.get_or_create(&id.into()).inc();
    }

    pub(crate) fn requeued(&self, id: &NetworkSetId) {
        self.requeues.get_or_create(&id.into()).inc();
    }

    #[cfg(test)]
    pub(crate) fn queue_full_count(&self, id: &str) -> u64 {
        self.queue_full
            .get_or_create(&NetworkSetId::from(id).into())
            .get()
    }

    #[cfg(test)]
    pub(crate) fn requeue_count(&self, id: &str) -> u64 {
        self.requeues
            .get_or_create(&NetworkSetId::from(id).into())
            .get()
    }
}

impl From<&NetworkSetId> for NetworkSetLabels {
    fn from(id: &NetworkSetId) -> Self {
        Self {
            globalnetworkset: id.to_string(),
        }
    }
}

impl From<NetworkSetId> for NetworkSetLabels {
    fn from(id: NetworkSetId) -> Self {
        Self {
            globalnetworkset: id.to_string(),
        }
    }
}
