//! hubtopo store: runs fetch cycles and publishes topology snapshots.
//!
//! A [`Fetcher`] is created once per cluster connection (it admits the server
//! version up front) and then produces a fresh [`Topology`] per cycle. Kinds
//! are fetched concurrently and merged only after every fetch has finished.
//! [`TopologyStore`] holds the last published snapshot for readers.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use futures::{stream, StreamExt, TryStreamExt};
use hubtopo_core::{CancelReason, Record, Topology, TopologyBuilder, TopologyError, TrackedKind};
use hubtopo_kubehub::{fetch_kind, Capabilities, ClusterClient, VersionGate};
use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod config;

pub use config::{parse_kinds, FailurePolicy, FetchConfig};

/// Result of one successful cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub snapshot: Arc<Topology>,
    /// Per-kind failures tolerated under [`FailurePolicy::BestEffort`].
    pub failures: Vec<TopologyError>,
    pub took: Duration,
}

/// Version-aware fetcher bound to one cluster.
pub struct Fetcher {
    client: Arc<dyn ClusterClient>,
    caps: Capabilities,
    server_version: String,
    cfg: FetchConfig,
    cycles: AtomicU64,
}

impl Fetcher {
    /// Ask the cluster for its version and admit it. Nothing is listed when
    /// the version is rejected.
    pub async fn new(client: Arc<dyn ClusterClient>, cfg: FetchConfig) -> Result<Self, TopologyError> {
        let raw = client
            .server_version()
            .await
            .map_err(|e| TopologyError::unsupported("", format!("server version unavailable: {e}")))?;
        let caps = match VersionGate::new(cfg.min_minor).admit(&raw) {
            Ok(caps) => caps,
            Err(e) => {
                warn!(version = %raw, error = %e, "server version rejected");
                return Err(e);
            }
        };
        info!(version = %raw, "server version admitted");
        for kind in &cfg.kinds {
            debug!(kind = %kind, plan = ?caps.plan(*kind), "fetch plan");
        }
        Ok(Self::with_capabilities(client, caps, raw, cfg))
    }

    /// Build from an already admitted version.
    pub fn with_capabilities(
        client: Arc<dyn ClusterClient>,
        caps: Capabilities,
        server_version: impl Into<String>,
        cfg: FetchConfig,
    ) -> Self {
        Self { client, caps, server_version: server_version.into(), cfg, cycles: AtomicU64::new(0) }
    }

    pub fn capabilities(&self) -> &Capabilities { &self.caps }
    pub fn config(&self) -> &FetchConfig { &self.cfg }
    pub fn server_version(&self) -> &str { &self.server_version }

    /// Fetch and normalize a single kind.
    pub async fn fetch_kind(&self, kind: TrackedKind) -> Result<Vec<Record>, TopologyError> {
        fetch_kind(self.client.as_ref(), kind, self.caps.plan(kind)).await
    }

    /// Run one cycle. Firing `cancel` or passing the configured deadline
    /// drops every in-flight request and yields `Cancelled`.
    ///
    /// Epochs count this fetcher's own cycles; [`Fetcher::refresh`] takes
    /// them from the store instead.
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<CycleReport, TopologyError> {
        let epoch = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        self.cycle(epoch, cancel).await
    }

    async fn cycle(&self, epoch: u64, cancel: &CancellationToken) -> Result<CycleReport, TopologyError> {
        let started = Instant::now();
        let cycle = bounded(self.cfg.deadline, self.run_cycle(epoch, started));
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TopologyError::Cancelled(CancelReason::Signal)),
            res = cycle => res,
        };
        histogram!("topology_cycle_ms", started.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(report) => {
                let outcome = if report.snapshot.is_partial() { "partial" } else { "ok" };
                counter!("topology_cycles_total", 1u64, "outcome" => outcome);
                info!(
                    epoch,
                    outcome,
                    namespaces = report.snapshot.namespaces.len(),
                    services = report.snapshot.services.len(),
                    ingresses = report.snapshot.ingresses.len(),
                    apis = report.snapshot.apis.len(),
                    collections = report.snapshot.collections.len(),
                    took_ms = %report.took.as_millis(),
                    "fetch cycle done"
                );
            }
            Err(e) if e.is_cancelled() => {
                counter!("topology_cycles_total", 1u64, "outcome" => e.outcome());
                info!(epoch, reason = %e, "fetch cycle cancelled");
            }
            Err(e) => {
                counter!("topology_cycles_total", 1u64, "outcome" => e.outcome());
                warn!(epoch, error = %e, "fetch cycle failed");
            }
        }
        res
    }

    /// Run a cycle and publish its snapshot under the next epoch of `store`.
    /// A failed cycle leaves the published snapshot as it was; so does one
    /// overtaken by a newer publish, which yields `Superseded`.
    pub async fn refresh(&self, store: &TopologyStore, cancel: &CancellationToken) -> Result<CycleReport, TopologyError> {
        let report = self.cycle(store.next_epoch(), cancel).await?;
        if !store.publish(Arc::clone(&report.snapshot)) {
            let err = TopologyError::Superseded { epoch: report.snapshot.epoch, current: store.current().epoch };
            warn!(error = %err, "snapshot not published");
            return Err(err);
        }
        Ok(report)
    }

    async fn run_cycle(&self, epoch: u64, started: Instant) -> Result<CycleReport, TopologyError> {
        let fetches = stream::iter(self.cfg.kinds.iter().copied())
            .map(|kind| async move { (kind, self.fetch_kind(kind).await) })
            .buffer_unordered(self.cfg.concurrency.max(1));

        let mut builder = TopologyBuilder::new(self.server_version.clone());
        let mut failures = Vec::new();
        match self.cfg.policy {
            FailurePolicy::Strict => {
                // The first error drops the stream and with it every request still in flight.
                let fetched: Vec<Vec<Record>> = fetches.map(|(_, res)| res).try_collect().await?;
                for records in fetched {
                    builder.extend(records);
                }
            }
            FailurePolicy::BestEffort => {
                let fetched: Vec<(TrackedKind, Result<Vec<Record>, TopologyError>)> = fetches.collect().await;
                for (kind, res) in fetched {
                    match res {
                        Ok(records) => {
                            builder.extend(records);
                        }
                        Err(err) => {
                            warn!(kind = %kind, error = %err, "kind omitted from snapshot");
                            builder.mark_missing(kind);
                            failures.push(err);
                        }
                    }
                }
            }
        }
        Ok(CycleReport { snapshot: Arc::new(builder.build(epoch)), failures, took: started.elapsed() })
    }
}

async fn bounded<F>(deadline: Option<Duration>, cycle: F) -> Result<CycleReport, TopologyError>
where
    F: Future<Output = Result<CycleReport, TopologyError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, cycle)
            .await
            .unwrap_or_else(|_| Err(TopologyError::Cancelled(CancelReason::Deadline))),
        None => cycle.await,
    }
}

/// Holds the last published snapshot. Snapshots are swapped whole; readers
/// keep whatever `Arc` they loaded.
pub struct TopologyStore {
    snap: Arc<ArcSwap<Topology>>,
    epoch_tx: watch::Sender<u64>,
    publish_lock: Mutex<()>,
    issued: AtomicU64,
}

impl Default for TopologyStore {
    fn default() -> Self { Self::new() }
}

impl TopologyStore {
    pub fn new() -> Self {
        let (epoch_tx, _) = watch::channel(0u64);
        Self {
            snap: Arc::new(ArcSwap::from_pointee(Topology::default())),
            epoch_tx,
            publish_lock: Mutex::new(()),
            issued: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Arc<Topology> { self.snap.load_full() }

    /// Reserve an epoch above every epoch issued or published so far, so
    /// cycles from any number of fetchers publish in start order.
    pub fn next_epoch(&self) -> u64 {
        self.issued.fetch_max(self.snap.load().epoch, Ordering::SeqCst);
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn handle(&self) -> TopologyHandle {
        TopologyHandle { snap: Arc::clone(&self.snap), epoch_rx: self.epoch_tx.subscribe() }
    }

    /// Swap in `next` unless a newer cycle was already published.
    pub fn publish(&self, next: Arc<Topology>) -> bool {
        let _guard = self.publish_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.snap.load();
        if next.epoch <= current.epoch {
            debug!(current = current.epoch, stale = next.epoch, "dropping stale snapshot");
            return false;
        }
        let epoch = next.epoch;
        self.snap.store(next);
        self.epoch_tx.send_replace(epoch);
        true
    }
}

/// Read side of a [`TopologyStore`].
#[derive(Clone)]
pub struct TopologyHandle {
    snap: Arc<ArcSwap<Topology>>,
    epoch_rx: watch::Receiver<u64>,
}

impl TopologyHandle {
    pub fn current(&self) -> Arc<Topology> { self.snap.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
}
