//! Semaphore policy pod index
//!
//! Translates pod events into store mutations and sync requests. Each pod that carries the
//! grouping key contributes its address to the network set named by the key's value in the pod's
//! namespace:
//!
//! ```text
//! [ Pod ] -> [ PodIndex ] -> [ Store ]
//!                  \
//!                   `-> [ Queue ] -> [ Controller ]
//! ```
//!
//! The index remembers the last state it applied for every grouped pod, so updates are computed
//! against what the store actually holds rather than the previous object version.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod grouping;
mod pod;
mod runner;

#[cfg(test)]
mod tests;

pub use self::{
    grouping::{GroupingKey, InvalidSource, Source},
    pod::PodIndex,
    runner::Runner,
};
