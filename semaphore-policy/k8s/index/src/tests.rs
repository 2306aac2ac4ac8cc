use crate::{GroupingKey, PodIndex, Runner, Source};
use maplit::btreemap;
use mock::Recorder;
use prometheus_client::registry::Registry;
use semaphore_policy_core::{NetworkSetId, Scope, SharedStore, Store};
use semaphore_policy_k8s_api::{Event, ObjectMeta, Pod, PodStatus};
use semaphore_policy_sync::{Controller, Params, SyncMetrics};
use tokio::time;

const KEY: &str = "uw.systems/networkset-name";

fn scope() -> Scope {
    "test".parse().unwrap()
}

fn id(ns: &str, group: &str) -> NetworkSetId {
    NetworkSetId::new(&scope(), ns, group)
}

fn mk_pod(ns: &str, name: &str, group: Option<&str>, ip: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            annotations: group.map(|group| btreemap! { KEY.to_string() => group.to_string() }),
            ..Default::default()
        },
        status: ip.map(|ip| PodStatus {
            pod_ip: Some(ip.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_index() -> (PodIndex, SharedStore) {
    let store = Store::shared();
    let index = PodIndex::new(
        scope(),
        GroupingKey::new(KEY, Source::Annotation),
        store.clone(),
    );
    (index, store)
}

fn addresses(store: &SharedStore, id: &NetworkSetId) -> Option<Vec<String>> {
    store
        .read()
        .get(id.as_str())
        .map(|set| set.addresses().map(str::to_string).collect())
}

#[test]
fn added_pod_joins_its_group() {
    let (mut index, store) = mk_index();

    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
    assert_eq!(
        addresses(&store, &id("ns-0", "set-0")),
        Some(vec!["10.0.0.1/32".to_string()])
    );

    let syncs = index.apply(mk_pod("ns-0", "pod-1", Some("set-0"), Some("fd00::1")));
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
    assert_eq!(
        addresses(&store, &id("ns-0", "set-0")),
        Some(vec!["10.0.0.1/32".to_string(), "fd00::1/128".to_string()])
    );
}

#[test]
fn groups_are_namespaced() {
    let (mut index, store) = mk_index();

    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    index.apply(mk_pod("ns-1", "pod-0", Some("set-0"), Some("10.0.0.2")));
    assert_eq!(store.read().len(), 2);
    assert_eq!(
        addresses(&store, &id("ns-1", "set-0")),
        Some(vec!["10.0.0.2/32".to_string()])
    );
}

#[test]
fn unchanged_pod_is_not_synced() {
    let (mut index, _store) = mk_index();

    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    assert!(syncs.is_empty());
}

#[test]
fn pod_without_address_is_synced_once_assigned() {
    let (mut index, store) = mk_index();

    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), None));
    assert!(syncs.is_empty());
    assert!(store.read().is_empty());

    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
}

#[test]
fn address_change_replaces_address() {
    let (mut index, store) = mk_index();
    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    index.apply(mk_pod("ns-0", "pod-1", Some("set-0"), Some("10.0.0.2")));

    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.3")));
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
    assert_eq!(
        addresses(&store, &id("ns-0", "set-0")),
        Some(vec!["10.0.0.2/32".to_string(), "10.0.0.3/32".to_string()])
    );
}

#[test]
fn cleared_address_is_removed() {
    let (mut index, store) = mk_index();
    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    index.apply(mk_pod("ns-0", "pod-1", Some("set-0"), Some("10.0.0.2")));

    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), None));
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
    assert_eq!(
        addresses(&store, &id("ns-0", "set-0")),
        Some(vec!["10.0.0.2/32".to_string()])
    );

    let syncs = index.apply(mk_pod("ns-0", "pod-1", Some("set-0"), Some("")));
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
    assert_eq!(addresses(&store, &id("ns-0", "set-0")), None);
}

#[test]
fn invalid_address_is_ignored() {
    let (mut index, store) = mk_index();

    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0")));
    assert!(syncs.is_empty());
    assert!(store.read().is_empty());
}

#[test]
fn group_change_moves_address() {
    let (mut index, store) = mk_index();
    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));

    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-1"), Some("10.0.0.1")));
    assert_eq!(syncs, vec![id("ns-0", "set-0"), id("ns-0", "set-1")]);
    assert_eq!(addresses(&store, &id("ns-0", "set-0")), None);
    assert_eq!(
        addresses(&store, &id("ns-0", "set-1")),
        Some(vec!["10.0.0.1/32".to_string()])
    );
}

#[test]
fn missing_key_is_skipped() {
    let (mut index, store) = mk_index();

    let syncs = index.apply(mk_pod("ns-0", "pod-0", None, Some("10.0.0.1")));
    assert!(syncs.is_empty());
    assert!(store.read().is_empty());

    let syncs = index.delete(mk_pod("ns-0", "pod-0", None, Some("10.0.0.1")));
    assert!(syncs.is_empty());
}

#[test]
fn removed_key_withdraws_address() {
    let (mut index, store) = mk_index();
    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));

    let syncs = index.apply(mk_pod("ns-0", "pod-0", None, Some("10.0.0.1")));
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
    assert!(store.read().is_empty());
}

#[test]
fn label_source() {
    let store = Store::shared();
    let mut index = PodIndex::new(
        scope(),
        GroupingKey::new(KEY, Source::Label),
        store.clone(),
    );

    // Annotated but not labeled.
    let syncs = index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    assert!(syncs.is_empty());

    let mut pod = mk_pod("ns-0", "pod-0", None, Some("10.0.0.1"));
    pod.metadata.labels = Some(btreemap! { KEY.to_string() => "set-0".to_string() });
    let syncs = index.apply(pod);
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
}

#[test]
fn deleted_pod_is_withdrawn() {
    let (mut index, store) = mk_index();
    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));

    let syncs = index.delete(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    assert_eq!(syncs, vec![id("ns-0", "set-0")]);
    assert!(store.read().is_empty());

    let syncs = index.delete(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    assert!(syncs.is_empty());
}

#[test]
fn relist_deletes_absent_pods() {
    let (mut index, store) = mk_index();
    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    index.apply(mk_pod("ns-0", "pod-1", Some("set-0"), Some("10.0.0.2")));
    index.apply(mk_pod("ns-0", "pod-2", Some("set-1"), Some("10.0.0.3")));

    index.reset();
    index.apply(mk_pod("ns-0", "pod-0", Some("set-0"), Some("10.0.0.1")));
    let mut syncs = index.reset_done();
    syncs.sort();
    assert_eq!(syncs, vec![id("ns-0", "set-0"), id("ns-0", "set-1")]);
    assert_eq!(
        addresses(&store, &id("ns-0", "set-0")),
        Some(vec!["10.0.0.1/32".to_string()])
    );
    assert_eq!(addresses(&store, &id("ns-0", "set-1")), None);

    // Without a listing in progress there is nothing to reconcile.
    assert!(index.reset_done().is_empty());
}

#[test]
fn parses_sources() {
    assert_eq!("annotation".parse::<Source>().unwrap(), Source::Annotation);
    assert_eq!("label".parse::<Source>().unwrap(), Source::Label);
    assert!("header".parse::<Source>().is_err());
}

#[tokio::test(start_paused = true)]
async fn runner_waits_for_initial_sync() {
    let _tracing = tracing_subscriber::fmt().with_test_writer().try_init();

    let client = Recorder::default();
    let (index, store) = mk_index();
    let (controller, queue) = Controller::new(
        client.clone(),
        store.clone(),
        &scope(),
        Params::default(),
        SyncMetrics::register(&mut Registry::default()),
    );
    let mut initialized = controller.initialized();
    let mut runner = Runner::new(index, queue, controller.initialized());
    tokio::spawn(controller.run(std::future::pending()));

    runner.handle(Event::Init).await;
    runner
        .handle(Event::InitApply(mk_pod(
            "ns-0",
            "pod-0",
            Some("set-0"),
            Some("10.0.0.1"),
        )))
        .await;
    // The store is updated but nothing is synced before the initial full sync.
    assert_eq!(store.read().len(), 1);
    assert!(client.applied().is_empty());
    assert!(!runner.has_synced());

    runner.handle(Event::InitDone).await;
    assert!(runner.has_synced());
    initialized.wait_for(|i| *i).await.unwrap();
    time::sleep(time::Duration::from_secs(1)).await;
    assert_eq!(client.applied(), vec![id("ns-0", "set-0")]);

    runner
        .handle(Event::Apply(mk_pod(
            "ns-0",
            "pod-1",
            Some("set-0"),
            Some("10.0.0.2"),
        )))
        .await;
    time::sleep(time::Duration::from_secs(1)).await;
    assert_eq!(
        client.applied(),
        vec![id("ns-0", "set-0"), id("ns-0", "set-0")]
    );
}

#[tokio::test(start_paused = true)]
async fn changes_during_initial_sync_are_pushed() {
    let _tracing = tracing_subscriber::fmt().with_test_writer().try_init();

    let (client, release) = Recorder::holding();
    let (index, store) = mk_index();
    let (controller, queue) = Controller::new(
        client.clone(),
        store.clone(),
        &scope(),
        Params::default(),
        SyncMetrics::register(&mut Registry::default()),
    );
    let mut runner = Runner::new(index, queue, controller.initialized());
    tokio::spawn(controller.run(std::future::pending()));

    runner.handle(Event::Init).await;
    runner
        .handle(Event::InitApply(mk_pod(
            "ns-0",
            "pod-0",
            Some("set-0"),
            Some("10.0.0.1"),
        )))
        .await;
    runner.handle(Event::InitDone).await;

    // The initial full sync is stuck pushing set-0 when a new group appears.
    client.held().await;
    runner
        .handle(Event::Apply(mk_pod(
            "ns-0",
            "pod-1",
            Some("set-1"),
            Some("10.0.0.2"),
        )))
        .await;
    assert_eq!(
        addresses(&store, &id("ns-0", "set-1")),
        Some(vec!["10.0.0.2/32".to_string()])
    );
    release.send(()).unwrap();

    time::sleep(time::Duration::from_secs(1)).await;
    assert_eq!(
        client.applied(),
        vec![id("ns-0", "set-0"), id("ns-0", "set-1")]
    );
}

mod mock {
    use anyhow::Result;
    use semaphore_policy_core::{Labels, NetworkSetClient, NetworkSetId, RemoteNetworkSet, Selector};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::{oneshot, Notify};

    /// Records the network sets applied through it.
    #[derive(Clone, Default)]
    pub(super) struct Recorder {
        applied: Arc<Mutex<Vec<NetworkSetId>>>,
        hold: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
        held: Arc<Notify>,
    }

    impl Recorder {
        /// Returns a recorder whose first apply waits until the returned sender fires.
        pub(super) fn holding() -> (Self, oneshot::Sender<()>) {
            let (tx, rx) = oneshot::channel();
            let recorder = Self::default();
            *recorder.hold.lock() = Some(rx);
            (recorder, tx)
        }

        /// Completes once an apply is being held.
        pub(super) async fn held(&self) {
            self.held.notified().await
        }

        pub(super) fn applied(&self) -> Vec<NetworkSetId> {
            self.applied.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl NetworkSetClient for Recorder {
        async fn get(&self, _: &NetworkSetId) -> Result<Option<RemoteNetworkSet>> {
            Ok(None)
        }

        async fn create_or_update(
            &self,
            id: &NetworkSetId,
            _: &Labels,
            _: &[String],
        ) -> Result<()> {
            let hold = self.hold.lock().take();
            if let Some(release) = hold {
                self.held.notify_one();
                let _ = release.await;
            }
            self.applied.lock().push(id.clone());
            Ok(())
        }

        async fn delete(&self, _: &NetworkSetId) -> Result<()> {
            Ok(())
        }

        async fn list(&self, _: &Selector) -> Result<Vec<RemoteNetworkSet>> {
            Ok(vec![])
        }
    }
}
