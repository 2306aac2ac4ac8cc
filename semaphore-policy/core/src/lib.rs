//! Semaphore policy core
//!
//! The controller aggregates the addresses of pods that share a grouping key into named network
//! sets and keeps one external `GlobalNetworkSet` per aggregate:
//!
//! ```text
//! [ Pod ] -> [ NetworkSet ] <- [ Store ] -> [ Op ] -> [ NetworkSetClient ]
//! ```
//!
//! The [`Store`] is the single source of truth for what should exist externally. It is shared
//! between the pod event path and the sync engine through a [`SharedStore`] handle; every
//! operation takes the lock for its own duration and never across an await point.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
pub mod id;
pub mod labels;
mod network_set;
mod store;


pub use self::{
    client::{NetworkSetClient, RemoteNetworkSet},
    id::{InvalidScope, NetworkSetId, Scope},
    labels::{Labels, Selector},
    network_set::{
        owner_labels, NetworkSet, LABEL_MANAGED_BY, LABEL_NAME, LABEL_NAMESPACE,
        LABEL_REMOTE_CLUSTER, MANAGED_BY,
    },
    store::{Op, Removed, SharedStore, Store},
};
