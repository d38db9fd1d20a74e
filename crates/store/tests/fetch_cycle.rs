#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use hubtopo_core::{CancelReason, Ingress, IngressMeta, ResourceMeta, TopologyBuilder, TopologyError, TrackedKind};
use hubtopo_kubehub::{FakeCluster, SourceShape};
use hubtopo_store::{FailurePolicy, FetchConfig, Fetcher, TopologyStore};
use kube::core::DynamicObject;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn obj(shape: SourceShape, name: &str, ns: Option<&str>, data: serde_json::Value) -> DynamicObject {
    let o = DynamicObject::new(name, &shape.api_resource()).data(data);
    match ns {
        Some(ns) => o.within(ns),
        None => o,
    }
}

/// The same logical Ingress exposed through both networking group/versions.
fn dual_ingress_cluster(version: &str) -> FakeCluster {
    FakeCluster::new(version)
        .with_object(obj(SourceShape::NetworkingV1Beta1Ingress, "myIngress_netv1beta1", Some("myns"), json!({})))
        .with_object(obj(SourceShape::NetworkingV1Ingress, "myIngress_netv1", Some("myns"), json!({})))
}

fn ingress_only() -> FetchConfig {
    FetchConfig { kinds: vec![TrackedKind::Ingress], ..FetchConfig::default() }
}

/// Every kind served at its newest shape, with a few objects.
fn populated_cluster(version: &str) -> FakeCluster {
    let mut api = obj(
        SourceShape::HubV1Alpha1Api,
        "orders",
        Some("shop"),
        json!({ "spec": { "pathPrefix": "/orders", "service": { "name": "orders", "port": { "number": 80 } } } }),
    );
    api.metadata.labels = Some([("team".to_string(), "checkout".to_string())].into());
    FakeCluster::new(version).with_objects([
        obj(SourceShape::CoreV1Namespace, "shop", None, json!({})),
        obj(SourceShape::CoreV1Service, "orders", Some("shop"), json!({ "spec": { "ports": [{ "port": 80 }] } })),
        obj(SourceShape::NetworkingV1Ingress, "shop", Some("shop"), json!({ "spec": { "ingressClassName": "traefik" } })),
        obj(SourceShape::NetworkingV1IngressClass, "traefik", None, json!({ "spec": { "controller": "traefik.io/ingress-controller" } })),
        api,
        obj(
            SourceShape::HubV1Alpha1ApiCollection,
            "checkout",
            None,
            json!({ "spec": { "pathPrefix": "/api", "apiSelector": { "matchLabels": { "team": "checkout" } } } }),
        ),
    ])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejects_unsupported_versions_before_listing() {
    for version in ["", "foobar", "v1.13"] {
        let cluster = Arc::new(FakeCluster::new(version));
        let res = Fetcher::new(cluster.clone(), FetchConfig::default()).await;
        assert!(matches!(res, Err(TopologyError::UnsupportedVersion { .. })), "{version:?}");
        assert!(cluster.calls().is_empty(), "{version:?}: nothing should be listed");
    }

    let res = Fetcher::new(Arc::new(FakeCluster::without_version()), FetchConfig::default()).await;
    assert!(matches!(res, Err(TopologyError::UnsupportedVersion { .. })));

    assert!(Fetcher::new(Arc::new(FakeCluster::new("v1.16")), FetchConfig::default()).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follows_the_version_gated_ingress_path() {
    let cases = [
        ("v1.16", "myIngress_netv1beta1"),
        ("v1.18", "myIngress_netv1beta1"),
        ("v1.18.10", "myIngress_netv1beta1"),
        ("v1.19", "myIngress_netv1"),
        ("v1.22", "myIngress_netv1"),
    ];
    for (version, name) in cases {
        let fetcher = Fetcher::new(Arc::new(dual_ingress_cluster(version)), ingress_only()).await.unwrap();
        let report = fetcher.fetch(&CancellationToken::new()).await.unwrap();
        let topo = &report.snapshot;

        let key = format!("{name}@myns.ingress.networking.k8s.io");
        let want = Ingress {
            meta: ResourceMeta {
                kind: "Ingress".into(),
                group: "networking.k8s.io".into(),
                name: name.into(),
                namespace: "myns".into(),
            },
            ingress: IngressMeta::default(),
        };
        assert_eq!(topo.ingresses.len(), 1, "{version}");
        assert_eq!(topo.ingresses.get(&key), Some(&want), "{version}");
        assert_eq!(topo.server_version, version);
        assert!(report.failures.is_empty());

        let records = fetcher.fetch_kind(TrackedKind::Ingress).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), key);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn builds_every_tracked_kind() {
    let fetcher = Fetcher::new(Arc::new(populated_cluster("v1.20.4")), FetchConfig::default()).await.unwrap();
    let report = fetcher.fetch(&CancellationToken::new()).await.unwrap();
    let topo = &report.snapshot;

    assert_eq!(topo.epoch, 1);
    assert!(!topo.is_partial());
    assert_eq!(topo.keys_of(TrackedKind::Namespace), vec!["shop.namespace"]);
    assert_eq!(topo.keys_of(TrackedKind::Service), vec!["orders@shop.service"]);
    assert_eq!(topo.keys_of(TrackedKind::Ingress), vec!["shop@shop.ingress.networking.k8s.io"]);
    assert_eq!(topo.keys_of(TrackedKind::IngressClass), vec!["traefik.ingressclass.networking.k8s.io"]);
    assert_eq!(topo.keys_of(TrackedKind::Api), vec!["orders@shop.api.hub.traefik.io"]);
    assert_eq!(topo.keys_of(TrackedKind::ApiCollection), vec!["checkout.apicollection.hub.traefik.io"]);

    let again = fetcher.fetch(&CancellationToken::new()).await.unwrap();
    assert_eq!(again.snapshot.epoch, 2);
    assert_eq!(again.snapshot.apis, topo.apis);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_cluster_yields_empty_snapshot() {
    let mut cluster = FakeCluster::new("v1.21");
    for shape in [
        SourceShape::CoreV1Namespace,
        SourceShape::CoreV1Service,
        SourceShape::NetworkingV1Ingress,
        SourceShape::NetworkingV1IngressClass,
        SourceShape::HubV1Alpha1Api,
        SourceShape::HubV1Alpha1ApiCollection,
    ] {
        cluster = cluster.serve(shape.api_resource());
    }
    let fetcher = Fetcher::new(Arc::new(cluster), FetchConfig::default()).await.unwrap();
    let report = fetcher.fetch(&CancellationToken::new()).await.unwrap();
    for kind in TrackedKind::ALL {
        assert_eq!(report.snapshot.len_of(kind), 0, "{kind}");
    }
    assert!(!report.snapshot.is_partial());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingress_class_is_skipped_where_not_served() {
    let cluster = Arc::new(
        FakeCluster::new("v1.17").with_object(obj(SourceShape::NetworkingV1Beta1Ingress, "web", Some("ns"), json!({}))),
    );
    let cfg = FetchConfig { kinds: vec![TrackedKind::Ingress, TrackedKind::IngressClass], ..FetchConfig::default() };
    let fetcher = Fetcher::new(cluster.clone(), cfg).await.unwrap();
    let report = fetcher.fetch(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.snapshot.ingresses.len(), 1);
    assert_eq!(report.snapshot.ingress_classes.len(), 0);
    assert_eq!(cluster.calls(), vec!["networking.k8s.io/v1beta1/ingresses"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn strict_policy_aborts_and_keeps_published_snapshot() {
    let store = TopologyStore::new();
    let good = Fetcher::new(Arc::new(populated_cluster("v1.20")), FetchConfig::default()).await.unwrap();
    good.refresh(&store, &CancellationToken::new()).await.unwrap();
    let published = store.current();
    assert_eq!(published.apis.len(), 1);

    let broken = populated_cluster("v1.20").failing(SourceShape::CoreV1Service.api_resource(), "etcdserver: request timed out");
    let fetcher = Fetcher::new(Arc::new(broken), FetchConfig::default()).await.unwrap();
    let err = fetcher.refresh(&store, &CancellationToken::new()).await.unwrap_err();
    match err {
        TopologyError::FetchFailed { kind, ref api_version, .. } => {
            assert_eq!(kind, TrackedKind::Service);
            assert_eq!(api_version, "v1");
        }
        ref other => panic!("unexpected error {other}"),
    }
    assert!(Arc::ptr_eq(&store.current(), &published));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn best_effort_policy_omits_failed_kinds() {
    let broken = populated_cluster("v1.20").failing(SourceShape::CoreV1Service.api_resource(), "etcdserver: request timed out");
    let cfg = FetchConfig { policy: FailurePolicy::BestEffort, ..FetchConfig::default() };
    let fetcher = Fetcher::new(Arc::new(broken), cfg).await.unwrap();
    let report = fetcher.fetch(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0], TopologyError::FetchFailed { kind: TrackedKind::Service, .. }));
    assert!(report.snapshot.is_partial());
    assert_eq!(report.snapshot.missing_kinds, vec![TrackedKind::Service]);
    assert!(report.snapshot.services.is_empty());
    assert_eq!(report.snapshot.apis.len(), 1);
    assert_eq!(report.snapshot.namespaces.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_stops_in_flight_fetches() {
    let slow = populated_cluster("v1.20").with_latency(Duration::from_secs(5));
    let cfg = FetchConfig { deadline: None, ..FetchConfig::default() };
    let fetcher = Fetcher::new(Arc::new(slow), cfg).await.unwrap();
    let store = TopologyStore::new();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = fetcher.refresh(&store, &cancel).await.unwrap_err();
    assert!(matches!(err, TopologyError::Cancelled(CancelReason::Signal)), "{err}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(store.current().epoch, 0, "nothing published");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_counts_as_cancellation() {
    let slow = populated_cluster("v1.20").with_latency(Duration::from_secs(5));
    let cfg = FetchConfig { deadline: Some(Duration::from_millis(50)), ..FetchConfig::default() };
    let fetcher = Fetcher::new(Arc::new(slow), cfg).await.unwrap();

    let err = fetcher.fetch(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, TopologyError::Cancelled(CancelReason::Deadline)), "{err}");
    assert!(err.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_publishes_new_epochs() {
    let store = TopologyStore::new();
    let handle = store.handle();
    let mut epochs = handle.subscribe_epoch();
    let fetcher = Fetcher::new(Arc::new(populated_cluster("v1.20")), FetchConfig { concurrency: 1, ..FetchConfig::default() })
        .await
        .unwrap();

    fetcher.refresh(&store, &CancellationToken::new()).await.unwrap();
    epochs.changed().await.unwrap();
    assert_eq!(*epochs.borrow(), 1);
    let first = handle.current();

    fetcher.refresh(&store, &CancellationToken::new()).await.unwrap();
    assert_eq!(handle.current().epoch, 2);
    assert_eq!(first.epoch, 1, "published snapshots are never mutated");
    assert_eq!(handle.current().ingresses, first.ingresses);
}

fn single_ingress_cluster(version: &str, name: &str) -> FakeCluster {
    FakeCluster::new(version).with_object(obj(SourceShape::NetworkingV1Ingress, name, Some("ns"), json!({})))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replacement_fetcher_keeps_publishing() {
    let store = TopologyStore::new();
    let cancel = CancellationToken::new();

    let before = Fetcher::new(Arc::new(single_ingress_cluster("v1.21", "old")), ingress_only()).await.unwrap();
    before.refresh(&store, &cancel).await.unwrap();
    before.refresh(&store, &cancel).await.unwrap();
    assert_eq!(store.current().epoch, 2);

    // a cluster upgrade means admitting it again with a fresh fetcher
    let after = Fetcher::new(Arc::new(single_ingress_cluster("v1.22", "new")), ingress_only()).await.unwrap();
    let report = after.refresh(&store, &cancel).await.unwrap();
    assert_eq!(report.snapshot.epoch, 3);

    let current = store.current();
    assert_eq!(current.epoch, 3);
    assert_eq!(current.server_version, "v1.22");
    assert_eq!(current.keys_of(TrackedKind::Ingress), vec!["new@ns.ingress.networking.k8s.io"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overtaken_refresh_is_reported() {
    let store = TopologyStore::new();
    let slow = single_ingress_cluster("v1.21", "slow").with_latency(Duration::from_millis(200));
    let fetcher = Fetcher::new(Arc::new(slow), ingress_only()).await.unwrap();
    let cancel = CancellationToken::new();

    let (res, _) = tokio::join!(fetcher.refresh(&store, &cancel), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.publish(Arc::new(TopologyBuilder::new("v1.21").build(100))));
    });

    let err = res.unwrap_err();
    assert!(matches!(err, TopologyError::Superseded { epoch: 1, current: 100 }), "{err}");
    assert_eq!(store.current().epoch, 100);
    assert!(store.current().ingresses.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrency_limit_bounds_outstanding_lists() {
    for limit in [1, 2, 6] {
        let cluster = Arc::new(populated_cluster("v1.20").with_latency(Duration::from_millis(50)));
        let cfg = FetchConfig { concurrency: limit, ..FetchConfig::default() };
        assert_eq!(cfg.kinds.len(), 6);
        let fetcher = Fetcher::new(cluster.clone(), cfg).await.unwrap();

        let report = fetcher.fetch(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.snapshot.apis.len(), 1);
        assert_eq!(cluster.calls().len(), 6);
        assert_eq!(cluster.peak_in_flight(), limit, "concurrency {limit}");
    }
}
