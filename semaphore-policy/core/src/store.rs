use crate::{labels::Labels, NetworkSet, NetworkSetId, Scope};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, sync::Arc};
use tracing::debug;

/// A store shared by the pod event path and the sync engine.
///
/// Both paths must hold the lock for the duration of a single store operation only.
pub type SharedStore = Arc<RwLock<Store>>;

/// Holds the network sets that should exist externally, by id.
#[derive(Debug, Default)]
pub struct Store {
    sets: HashMap<NetworkSetId, NetworkSet>,
}

/// The outcome of removing an address from a network set.
#[derive(Debug, PartialEq, Eq)]
pub enum Removed<'s> {
    /// No network set exists for the id.
    Unknown,

    /// The last address was removed, so the network set no longer exists.
    Deleted,

    /// The network set still holds addresses.
    Remaining(&'s NetworkSet),
}

/// The external operation that makes the external API match the store for one id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    /// Create the network set, or overwrite the labels and addresses of the existing one.
    Apply {
        id: NetworkSetId,
        labels: Labels,
        addresses: Vec<String>,
    },

    /// Delete the network set. Deleting a missing network set succeeds.
    Delete { id: NetworkSetId },
}

// === impl Store ===

impl Store {
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Adds an address to the `name` network set in `namespace`, creating the set if needed.
    pub fn add_address(
        &mut self,
        scope: &Scope,
        namespace: &str,
        name: &str,
        address: impl Into<String>,
    ) -> &NetworkSet {
        let address = address.into();
        let id = NetworkSetId::new(scope, namespace, name);
        match self.sets.entry(id) {
            Entry::Vacant(entry) => {
                debug!(id = %entry.key(), %address, "Creating network set");
                let set = NetworkSet::new(scope, namespace, name, address);
                entry.insert(set)
            }
            Entry::Occupied(entry) => {
                let id = entry.key().clone();
                let set = entry.into_mut();
                if set.insert(address.clone()) {
                    debug!(%id, %address, addresses = set.len(), "Added address to network set");
                }
                set
            }
        }
    }

    /// Removes an address from the `name` network set in `namespace`.
    ///
    /// Once the last address is removed the set is dropped from the store.
    pub fn remove_address(
        &mut self,
        scope: &Scope,
        namespace: &str,
        name: &str,
        address: &str,
    ) -> Removed<'_> {
        let id = NetworkSetId::new(scope, namespace, name);
        let mut entry = match self.sets.entry(id) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(_) => return Removed::Unknown,
        };

        if entry.get_mut().remove(address) {
            debug!(id = %entry.key(), %address, addresses = entry.get().len(), "Removed address from network set");
        }

        if entry.get().is_empty() {
            debug!(id = %entry.key(), "Deleting empty network set");
            entry.remove();
            return Removed::Deleted;
        }

        Removed::Remaining(entry.into_mut())
    }

    /// Returns the operation that brings the external network set `id` in line with the store.
    pub fn reconcile(&self, id: &NetworkSetId) -> Op {
        match self.sets.get(id) {
            Some(set) => Op::Apply {
                id: id.clone(),
                labels: set.labels().clone(),
                addresses: set.addresses().map(str::to_string).collect(),
            },
            None => Op::Delete { id: id.clone() },
        }
    }

    pub fn get(&self, id: &str) -> Option<&NetworkSet> {
        self.sets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sets.contains_key(id)
    }

    /// Returns the ids of all network sets, sorted.
    pub fn ids(&self) -> Vec<NetworkSetId> {
        let mut ids = self.sets.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

