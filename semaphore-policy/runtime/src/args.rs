use crate::{
    core::{Scope, Store},
    health,
    index::{GroupingKey, PodIndex, Runner, Source},
    k8s::{self, watcher, Api, ClientMetrics, GlobalNetworkSets, Pod, Watch, WatchMetrics},
    sync::{Controller, Params, SyncMetrics},
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, path::PathBuf};
use tokio::time::Duration;
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "semaphore-policy",
    about = "Mirrors groups of pod addresses into Calico GlobalNetworkSets"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "semaphore_policy=info,warn",
        env = "SEMAPHORE_POLICY_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    /// Configures the client for the cluster whose pods are watched.
    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The kubeconfig of the cluster that holds the GlobalNetworkSets.
    ///
    /// Defaults to the watched cluster.
    #[clap(long, env = "TARGET_KUBECONFIG")]
    target_kubeconfig: Option<PathBuf>,

    #[clap(long, requires = "target_kubeconfig")]
    target_context: Option<String>,

    /// Selects the pods to watch.
    #[clap(long, env = "LABEL_SELECTOR", default_value = "uw.systems/networksets=true")]
    label_selector: String,

    /// The pod annotation (or label) that names a pod's network set.
    #[clap(long, env = "NS_NAME_KEY", default_value = "uw.systems/networkset-name")]
    networkset_name_key: String,

    #[clap(long, default_value = "annotation")]
    networkset_name_source: Source,

    /// Identifies the network sets owned by this controller. Must be unique among the
    /// controllers writing to the target cluster.
    #[clap(long, env = "SETS_PREFIX")]
    sets_prefix: Scope,

    #[clap(long, default_value = "3600", value_parser = clap::value_parser!(u64).range(1..))]
    full_store_resync_period_secs: u64,

    #[clap(long, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    requeue_backoff_ms: u64,

    #[clap(long, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    enqueue_timeout_ms: u64,

    #[clap(long, default_value = "1")]
    sync_queue_size: usize,

    #[clap(long, default_value = "0.0.0.0:8081")]
    health_addr: SocketAddr,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let params = self.sync_params();
        let Self {
            log_level,
            log_format,
            client,
            admin,
            target_kubeconfig,
            target_context,
            label_selector,
            networkset_name_key,
            networkset_name_source,
            sets_prefix,
            health_addr,
            ..
        } = self;

        let mut prom = Registry::with_prefix("semaphore_policy");
        let client_metrics = ClientMetrics::register(prom.sub_registry_with_prefix("client"));
        let watch_metrics = WatchMetrics::register(prom.sub_registry_with_prefix("pod_watcher"));
        let sync_metrics = SyncMetrics::register(&mut prom);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let target = match target_kubeconfig {
            Some(path) => target_client(path, target_context).await?,
            None => runtime.client(),
        };

        info!(scope = %sets_prefix, %label_selector, key = %networkset_name_key, "Starting");
        let store = Store::shared();
        let (controller, queue) = Controller::new(
            GlobalNetworkSets::new(target, client_metrics),
            store.clone(),
            &sets_prefix,
            params,
            sync_metrics,
        );

        let pods = Watch::new(
            watcher(
                Api::<Pod>::all(runtime.client()),
                watcher::Config::default().labels(&label_selector),
            ),
            watch_metrics,
        )
        .instrument(info_span!("pods"));
        let health = pods.health();

        let index = PodIndex::new(
            sets_prefix,
            GroupingKey::new(networkset_name_key, networkset_name_source),
            store,
        );
        let runner = Runner::new(index, queue, controller.initialized());

        let shutdown = || {
            let drain = runtime.shutdown_handle();
            async move {
                drop(drain.signaled().await);
            }
        };

        tokio::spawn(controller.run(shutdown()).instrument(info_span!("sync")));
        tokio::spawn(runner.run(pods, shutdown()).instrument(info_span!("index")));
        let health_shutdown = shutdown();
        tokio::spawn(async move {
            if let Err(error) = health::serve(health_addr, health, health_shutdown).await {
                error!(%error, "Health server failed");
            }
        });

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    pub(crate) fn sync_params(&self) -> Params {
        Params {
            queue_size: self.sync_queue_size,
            enqueue_timeout: Duration::from_millis(self.enqueue_timeout_ms),
            backoff: Duration::from_millis(self.requeue_backoff_ms),
            resync_period: Duration::from_secs(self.full_store_resync_period_secs),
        }
    }
}

async fn target_client(path: PathBuf, context: Option<String>) -> Result<k8s::Client> {
    let kubeconfig = Kubeconfig::read_from(&path)?;
    let options = KubeConfigOptions {
        context,
        ..Default::default()
    };
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
    Ok(k8s::Client::try_from(config)?)
}

