use crate::{labels::Labels, NetworkSetId, Selector};
use anyhow::Result;

/// A network set as read from the external API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteNetworkSet {
    pub id: NetworkSetId,
    pub labels: Labels,
    pub addresses: Vec<String>,
}

/// Manages network sets in the external policy API.
#[async_trait::async_trait]
pub trait NetworkSetClient {
    async fn get(&self, id: &NetworkSetId) -> Result<Option<RemoteNetworkSet>>;

    /// Creates the network set if it does not exist. Otherwise, replaces its labels and
    /// addresses, leaving all other fields untouched.
    async fn create_or_update(
        &self,
        id: &NetworkSetId,
        labels: &Labels,
        addresses: &[String],
    ) -> Result<()>;

    /// Deletes the network set. Succeeds if it does not exist.
    async fn delete(&self, id: &NetworkSetId) -> Result<()>;

    /// Lists network sets.
    ///
    /// Implementations may not be able to filter by `selector`, so callers must filter the
    /// result themselves.
    async fn list(&self, selector: &Selector) -> Result<Vec<RemoteNetworkSet>>;
}
