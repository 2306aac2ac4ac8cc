#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use semaphore_policy_core as core;
pub use semaphore_policy_k8s_api as k8s;
pub use semaphore_policy_k8s_index as index;
pub use semaphore_policy_sync as sync;

mod args;
mod health;


pub use self::args::Args;
