//! In-memory cluster for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use kube::core::{ApiResource, DynamicObject};

use crate::{ClusterClient, ListError};

type GvkKey = (String, String);

/// Serves a fixed set of group/versions and objects.
///
/// Group/versions that were never registered answer like a cluster where the
/// API is not installed ([`ListError::NotFound`]).
#[derive(Default)]
pub struct FakeCluster {
    server_version: Option<String>,
    served: HashMap<GvkKey, Vec<DynamicObject>>,
    failures: HashMap<GvkKey, String>,
    latency: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts one list call as in flight until dropped, including when the
/// caller abandons the request.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); }
}

fn gvk_key(resource: &ApiResource) -> GvkKey { (resource.api_version.clone(), resource.kind.clone()) }

impl FakeCluster {
    pub fn new(server_version: &str) -> Self {
        Self { server_version: Some(server_version.to_string()), ..Default::default() }
    }

    /// A cluster whose discovery endpoint does not answer.
    pub fn without_version() -> Self { Self::default() }

    /// Mark a group/version/kind as installed, with no objects yet.
    pub fn serve(mut self, resource: ApiResource) -> Self {
        self.served.entry(gvk_key(&resource)).or_default();
        self
    }

    /// Add an object; its `apiVersion`/`kind` select where it is served.
    pub fn with_object(mut self, obj: DynamicObject) -> Self {
        let key = obj
            .types
            .as_ref()
            .map(|t| (t.api_version.clone(), t.kind.clone()))
            .unwrap_or_default();
        self.served.entry(key).or_default().push(obj);
        self
    }

    pub fn with_objects(self, objs: impl IntoIterator<Item = DynamicObject>) -> Self {
        objs.into_iter().fold(self, FakeCluster::with_object)
    }

    /// Make every list of `resource` fail with a transport error.
    pub fn failing(mut self, resource: ApiResource, message: &str) -> Self {
        self.failures.insert(gvk_key(&resource), message.to_string());
        self
    }

    /// Delay every list call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// `apiVersion/plural` of every list call so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of list calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize { self.peak_in_flight.load(Ordering::SeqCst) }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn server_version(&self) -> Result<String, ListError> {
        self.server_version.clone().ok_or_else(|| ListError::Transport("discovery unavailable".into()))
    }

    async fn list(&self, resource: &ApiResource) -> Result<Vec<DynamicObject>, ListError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{}/{}", resource.api_version, resource.plural));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let key = gvk_key(resource);
        if let Some(message) = self.failures.get(&key) {
            return Err(ListError::Transport(message.clone().into()));
        }
        self.served.get(&key).cloned().ok_or_else(|| ListError::not_found(resource))
    }
}
