#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod network_set;
mod watch;


pub use self::{
    network_set::{ClientMetrics, GlobalNetworkSet, GlobalNetworkSetSpec, GlobalNetworkSets},
    watch::{Event, Watch, WatchHealth, WatchMetrics},
};
pub use k8s_openapi::api::core::v1::{Pod, PodStatus};
pub use kube::{
    api::{Api, ObjectMeta, ResourceExt},
    runtime::watcher,
    Client,
};
