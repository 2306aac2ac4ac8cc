use crate::GroupingKey;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use semaphore_policy_core::{NetworkSetId, Scope, SharedStore, Store};
use semaphore_policy_k8s_api::{Pod, ResourceExt};
use std::net::IpAddr;
use tracing::{debug, warn};

/// Maintains the store from pod events.
///
/// Every mutating call returns the network sets that must be synced as a result, in order.
#[derive(Debug)]
pub struct PodIndex {
    scope: Scope,
    key: GroupingKey,
    store: SharedStore,

    /// The last state applied to the store for each grouped pod.
    pods: HashMap<PodRef, PodState>,

    /// Pods observed since the current listing started.
    listing: Option<HashSet<PodRef>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct PodRef {
    namespace: String,
    name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PodState {
    group: String,
    address: Option<String>,
}

// === impl PodIndex ===

impl PodIndex {
    pub fn new(scope: Scope, key: GroupingKey, store: SharedStore) -> Self {
        Self {
            scope,
            key,
            store,
            pods: HashMap::default(),
            listing: None,
        }
    }

    /// Adds or updates a pod.
    ///
    /// A cached pod that loses the grouping key is withdrawn from the network set it was last
    /// applied to.
    pub fn apply(&mut self, pod: Pod) -> Vec<NetworkSetId> {
        let Some(pod_ref) = PodRef::of(&pod) else {
            warn!(name = %pod.name_any(), "Pod has no namespace");
            return vec![];
        };
        if let Some(listing) = self.listing.as_mut() {
            listing.insert(pod_ref.clone());
        }

        let new = match self.key.group_of(&pod.metadata) {
            Some(group) => Some(PodState {
                group: group.to_string(),
                address: pod_address(&pod),
            }),
            None => {
                warn!(ns = %pod_ref.namespace, name = %pod_ref.name, key = %self.key, "Pod is missing the grouping key");
                None
            }
        };

        let old = self.pods.get(&pod_ref).cloned();
        if old == new {
            return vec![];
        }
        self.update(pod_ref, old, new)
    }

    /// Removes a pod, withdrawing its address from its network set.
    pub fn delete(&mut self, pod: Pod) -> Vec<NetworkSetId> {
        let Some(pod_ref) = PodRef::of(&pod) else {
            return vec![];
        };
        if !self.pods.contains_key(&pod_ref) && self.key.group_of(&pod.metadata).is_none() {
            warn!(ns = %pod_ref.namespace, name = %pod_ref.name, key = %self.key, "Pod is missing the grouping key");
            return vec![];
        }
        self.remove(pod_ref)
    }

    /// Begins a listing of all pods.
    pub fn reset(&mut self) {
        self.listing = Some(HashSet::default());
    }

    /// Completes a listing of all pods. Pods that were known before the listing but absent from
    /// it are deleted.
    pub fn reset_done(&mut self) -> Vec<NetworkSetId> {
        let Some(listed) = self.listing.take() else {
            return vec![];
        };
        let gone = self
            .pods
            .keys()
            .filter(|pod| !listed.contains(*pod))
            .cloned()
            .collect::<Vec<_>>();

        let mut syncs = Vec::new();
        for pod_ref in gone {
            debug!(ns = %pod_ref.namespace, name = %pod_ref.name, "Pod absent from listing; deleting");
            for id in self.remove(pod_ref) {
                if !syncs.contains(&id) {
                    syncs.push(id);
                }
            }
        }
        syncs
    }

    fn remove(&mut self, pod_ref: PodRef) -> Vec<NetworkSetId> {
        match self.pods.remove(&pod_ref) {
            Some(old) => self.update(pod_ref, Some(old), None),
            None => vec![],
        }
    }

    /// Moves the store from the pod's old state to its new state.
    fn update(
        &mut self,
        pod_ref: PodRef,
        old: Option<PodState>,
        new: Option<PodState>,
    ) -> Vec<NetworkSetId> {
        let PodRef { namespace: ns, .. } = &pod_ref;
        let mut syncs = Vec::new();
        {
            let mut store = self.store.write();

            // A pod that left its group (or lost the key) is withdrawn from the old set first.
            let mut prior = old;
            if let Some(old) = prior.as_ref() {
                if new.as_ref().map_or(true, |new| new.group != old.group) {
                    if let Some(address) = old.address.as_deref() {
                        store.remove_address(&self.scope, ns, &old.group, address);
                        syncs.push(NetworkSetId::new(&self.scope, ns, &old.group));
                    }
                    prior = None;
                }
            }

            if let Some(new) = new.as_ref() {
                let old_address = prior.and_then(|p| p.address);
                if apply_address(&mut store, &self.scope, ns, new, old_address) {
                    syncs.push(NetworkSetId::new(&self.scope, ns, &new.group));
                }
            }
        }

        match new {
            Some(new) => {
                self.pods.insert(pod_ref, new);
            }
            None => {
                self.pods.remove(&pod_ref);
            }
        }
        syncs
    }
}

/// Replaces `old` with the pod's new address within its group. Returns true if the store changed.
fn apply_address(
    store: &mut Store,
    scope: &Scope,
    ns: &str,
    new: &PodState,
    old: Option<String>,
) -> bool {
    match (old, new.address.as_ref()) {
        (old, Some(address)) if old.as_ref() != Some(address) => {
            store.add_address(scope, ns, &new.group, address.clone());
            if let Some(old) = old {
                store.remove_address(scope, ns, &new.group, &old);
            }
            true
        }
        (Some(old), None) => {
            store.remove_address(scope, ns, &new.group, &old);
            true
        }
        _ => false,
    }
}

/// Returns the pod's IP as a host network, e.g. `10.2.3.4/32`.
fn pod_address(pod: &Pod) -> Option<String> {
    let ip = pod.status.as_ref()?.pod_ip.as_deref()?;
    if ip.is_empty() {
        return None;
    }
    match ip.parse::<IpAddr>() {
        Ok(ip) => Some(ipnet::IpNet::from(ip).to_string()),
        Err(error) => {
            warn!(name = %pod.name_any(), %ip, %error, "Ignoring invalid pod IP");
            None
        }
    }
}

// === impl PodRef ===

impl PodRef {
    fn of(pod: &Pod) -> Option<Self> {
        Some(Self {
            namespace: pod.namespace()?,
            name: pod.name_any(),
        })
    }
}
