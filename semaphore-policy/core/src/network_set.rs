use crate::{labels::Labels, Scope, Selector};
use std::collections::BTreeSet;

pub const LABEL_MANAGED_BY: &str = "managed-by";
pub const LABEL_REMOTE_CLUSTER: &str = "remote-cluster-name";
pub const LABEL_NAME: &str = "name";
pub const LABEL_NAMESPACE: &str = "namespace";

pub const MANAGED_BY: &str = "semaphore-policy";

/// The addresses of all pods that share a grouping key within a namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkSet {
    labels: Labels,

    /// Never empty while the set is held by the store.
    addresses: BTreeSet<String>,
}

/// Returns a selector matching the network sets owned by `scope`.
pub fn owner_labels(scope: &Scope) -> Selector {
    [
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_REMOTE_CLUSTER.to_string(), scope.to_string()),
    ]
    .into_iter()
    .collect()
}

// === impl NetworkSet ===

impl NetworkSet {
    pub(crate) fn new(scope: &Scope, namespace: &str, name: &str, address: String) -> Self {
        let labels = [
            (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
            (LABEL_REMOTE_CLUSTER.to_string(), scope.to_string()),
            (LABEL_NAME.to_string(), name.to_string()),
            (LABEL_NAMESPACE.to_string(), namespace.to_string()),
        ]
        .into_iter()
        .collect();

        Self {
            labels,
            addresses: std::iter::once(address).collect(),
        }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn addresses(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.addresses.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Returns false if the address was already present.
    pub(crate) fn insert(&mut self, address: String) -> bool {
        self.addresses.insert(address)
    }

    /// Returns false if the address was not present.
    pub(crate) fn remove(&mut self, address: &str) -> bool {
        self.addresses.remove(address)
    }
}
