use anyhow::Result;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    Client, CustomResource, ResourceExt,
};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use schemars::JsonSchema;
use semaphore_policy_core::{Labels, NetworkSetClient, NetworkSetId, RemoteNetworkSet, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A cluster-scoped set of networks that network policies may select by label.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "projectcalico.org", version = "v3", kind = "GlobalNetworkSet")]
#[serde(rename_all = "camelCase")]
pub struct GlobalNetworkSetSpec {
    /// CIDRs, e.g. `10.2.3.4/32`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nets: Vec<String>,
}

/// Manages `GlobalNetworkSet` resources through the Kubernetes API.
#[derive(Clone)]
pub struct GlobalNetworkSets {
    api: Api<GlobalNetworkSet>,
    metrics: ClientMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct ClientMetrics {
    requests: Family<RequestLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    op: &'static str,
    status: &'static str,
}

// === impl GlobalNetworkSet ===

impl From<GlobalNetworkSet> for RemoteNetworkSet {
    fn from(set: GlobalNetworkSet) -> Self {
        Self {
            id: set.name_any().into(),
            labels: set.metadata.labels.into(),
            addresses: set.spec.nets,
        }
    }
}

// === impl GlobalNetworkSets ===

impl GlobalNetworkSets {
    pub fn new(client: Client, metrics: ClientMetrics) -> Self {
        Self {
            api: Api::all(client),
            metrics,
        }
    }

    async fn get_opt(&self, id: &NetworkSetId) -> kube::Result<Option<GlobalNetworkSet>> {
        let res = self.api.get_opt(id.as_str()).await;
        self.metrics.record("get", &res);
        res
    }
}

#[async_trait::async_trait]
impl NetworkSetClient for GlobalNetworkSets {
    async fn get(&self, id: &NetworkSetId) -> Result<Option<RemoteNetworkSet>> {
        let set = self.get_opt(id).await?;
        Ok(set.map(Into::into))
    }

    async fn create_or_update(
        &self,
        id: &NetworkSetId,
        labels: &Labels,
        addresses: &[String],
    ) -> Result<()> {
        let params = PostParams::default();
        match self.get_opt(id).await? {
            None => {
                let mut set = GlobalNetworkSet::new(
                    id.as_str(),
                    GlobalNetworkSetSpec {
                        nets: addresses.to_vec(),
                    },
                );
                set.metadata.labels = Some(labels.as_ref().clone());
                debug!(%id, "Creating GlobalNetworkSet");
                let res = self.api.create(&params, &set).await;
                self.metrics.record("create", &res);
                res?;
            }
            Some(mut set) => {
                // Other fields of the existing resource are preserved.
                set.metadata.labels = Some(labels.as_ref().clone());
                set.spec.nets = addresses.to_vec();
                debug!(%id, "Replacing GlobalNetworkSet");
                let res = self.api.replace(id.as_str(), &params, &set).await;
                self.metrics.record("update", &res);
                res?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &NetworkSetId) -> Result<()> {
        let res = self.api.delete(id.as_str(), &DeleteParams::default()).await;
        match res {
            Ok(_) => {
                self.metrics.succeeded("delete");
                Ok(())
            }
            Err(kube::Error::Api(error)) if error.code == 404 => {
                self.metrics.succeeded("delete");
                debug!(%id, "GlobalNetworkSet already deleted");
                Ok(())
            }
            Err(error) => {
                self.metrics.failed("delete");
                Err(error.into())
            }
        }
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<RemoteNetworkSet>> {
        let res = self.api.list(&ListParams::default()).await;
        self.metrics.record("list", &res);
        let sets = res?
            .items
            .into_iter()
            .map(RemoteNetworkSet::from)
            .filter(|set| selector.matches(&set.labels))
            .collect();
        Ok(sets)
    }
}

// === impl ClientMetrics ===

impl ClientMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "requests",
            "Count of requests made to the GlobalNetworkSet API",
            metrics.requests.clone(),
        );
        metrics
    }

    fn record<T, E>(&self, op: &'static str, res: &std::result::Result<T, E>) {
        match res {
            Ok(_) => self.succeeded(op),
            Err(_) => self.failed(op),
        }
    }

    fn succeeded(&self, op: &'static str) {
        self.inc(op, "success");
    }

    fn failed(&self, op: &'static str) {
        self.inc(op, "failure");
    }

    fn inc(&self, op: &'static str, status: &'static str) {
        self.requests
            .get_or_create(&RequestLabels { op, status })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn request_count(&self, op: &'static str, status: &'static str) -> u64 {
        self.requests
            .get_or_create(&RequestLabels { op, status })
            .get()
    }
}
