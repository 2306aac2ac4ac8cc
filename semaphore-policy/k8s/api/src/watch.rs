use futures::prelude::*;
pub use kube::runtime::watcher::{Error, Event, Result};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::time;
use tracing::{info, Instrument};

/// Wraps a watcher event stream, recovering from failures and tracking whether the watch is
/// healthy.
pub struct Watch<T> {
    span: tracing::Span,
    rx: Pin<Box<dyn Stream<Item = Result<Event<T>>> + Send + 'static>>,
    health: WatchHealth,
    metrics: WatchMetrics,
}

/// Reports the state of a [`Watch`].
///
/// A watch is healthy when its most recent list and its most recent watch both succeeded. It has
/// synced once it has delivered a complete initial listing.
#[derive(Clone, Debug, Default)]
pub struct WatchHealth(Arc<Health>);

#[derive(Debug, Default)]
struct Health {
    synced: AtomicBool,
    listing: AtomicBool,
    watching: AtomicBool,
}

#[derive(Clone, Debug, Default)]
pub struct WatchMetrics {
    failures: Family<FailureLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FailureLabels {
    op: &'static str,
}

// === impl Watch ===

impl<T> Watch<T> {
    pub fn new<W>(watch: W, metrics: WatchMetrics) -> Self
    where
        W: Stream<Item = Result<Event<T>>> + Send + 'static,
    {
        Self {
            rx: watch.boxed(),
            span: tracing::Span::current(),
            health: WatchHealth::default(),
            metrics,
        }
    }

    pub fn instrument(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn health(&self) -> WatchHealth {
        self.health.clone()
    }

    /// Receive the next event in the stream.
    ///
    /// If the stream fails, log the error and sleep for 1s before polling for a reset event.
    /// The watch is considered healthy again once polling resumes after a watch failure.
    /// Returns `None` only if the underlying stream ends.
    pub async fn recv(&mut self) -> Option<Event<T>> {
        loop {
            let ev = self.rx.next().instrument(self.span.clone()).await?;

            match ev {
                Ok(ev) => {
                    self.health.observe(&ev);
                    return Some(ev);
                }
                Err(error) => {
                    let op = match error {
                        Error::InitialListFailed(_) => {
                            self.health.0.listing.store(false, Ordering::Release);
                            "list"
                        }
                        _ => {
                            self.health.0.watching.store(false, Ordering::Release);
                            "watch"
                        }
                    };
                    self.metrics.failed(op);
                    info!(parent: &self.span, %error, op, "Failed");

                    time::sleep(time::Duration::from_secs(1)).await;
                    info!(parent: &self.span, "Restarting");
                    // A failed list is only recovered by a successful listing; the watch
                    // resumes here even when no events follow.
                    if op == "watch" {
                        self.health.0.watching.store(true, Ordering::Release);
                    }
                }
            }
        }
    }
}

// === impl WatchHealth ===

impl WatchHealth {
    /// Indicates whether an initial listing has completed.
    pub fn has_synced(&self) -> bool {
        self.0.synced.load(Ordering::Acquire)
    }

    pub fn is_healthy(&self) -> bool {
        self.0.listing.load(Ordering::Acquire) && self.0.watching.load(Ordering::Acquire)
    }

    fn observe<T>(&self, ev: &Event<T>) {
        match ev {
            Event::Init => {}
            Event::InitApply(_) => {
                self.0.listing.store(true, Ordering::Release);
            }
            Event::InitDone => {
                self.0.listing.store(true, Ordering::Release);
                self.0.watching.store(true, Ordering::Release);
                self.0.synced.store(true, Ordering::Release);
            }
            Event::Apply(_) | Event::Delete(_) => {
                self.0.watching.store(true, Ordering::Release);
            }
        }
    }
}

// === impl WatchMetrics ===

impl WatchMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "failures",
            "Count of failed list and watch operations",
            metrics.failures.clone(),
        );
        metrics
    }

    fn failed(&self, op: &'static str) {
        self.failures.get_or_create(&FailureLabels { op }).inc();
    }

    #[cfg(test)]
    pub(crate) fn failure_count(&self, op: &'static str) -> u64 {
        self.failures.get_or_create(&FailureLabels { op }).get()
    }
}
