//! Network set synchronization
//!
//! Pushes the contents of the [`Store`](semaphore_policy_core::Store) to the external policy API.
//! A [`Queue`] hands sync tasks to a single [`Controller`] that reconciles one network set at a
//! time. Failed syncs, and syncs that could not be queued in time, are requeued after a fixed
//! backoff. The controller also runs full syncs, which delete external network sets that are no
//! longer in the store and push every network set that is.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
mod metrics;
mod queue;


pub use self::{
    controller::{Controller, Params},
    metrics::SyncMetrics,
    queue::{Queue, SyncTask},
};
