//! hubtopo kubehub: version-aware access to the cluster.
//!
//! The version gate decides which group/versions serve each tracked kind,
//! source shapes convert whatever was served into canonical records, and the
//! [`ClusterClient`] seam keeps the transport swappable (kube client in
//! production, [`FakeCluster`] in tests).

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use hubtopo_core::BoxError;
use kube::{
    api::{Api, ListParams},
    core::{ApiResource, DynamicObject},
    Client,
};
use tracing::debug;

mod fake;
mod normalize;
pub mod shapes;
pub mod version;

pub use fake::FakeCluster;
pub use normalize::fetch_kind;
pub use shapes::SourceShape;
pub use version::{Capabilities, KindRule, ServerVersion, ShapeWindow, VersionGate, DEFAULT_MIN_MINOR, KIND_TABLE};

/// Errors from a single list call.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    /// The group/version (or the resource within it) is not installed.
    #[error("{api_version}/{plural} is not served by the cluster")]
    NotFound { api_version: String, plural: String },
    #[error("request failed: {0}")]
    Transport(#[source] BoxError),
}

impl ListError {
    pub fn not_found(resource: &ApiResource) -> Self {
        ListError::NotFound { api_version: resource.api_version.clone(), plural: resource.plural.clone() }
    }

    fn from_kube(err: kube::Error, resource: &ApiResource) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => ListError::not_found(resource),
            _ => ListError::Transport(Box::new(err)),
        }
    }
}

/// What the core needs from a cluster: its version and list access to any
/// group/version/kind.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Git version reported by discovery, e.g. `v1.19.4`.
    async fn server_version(&self) -> Result<String, ListError>;

    /// List every object of `resource` across all namespaces.
    async fn list(&self, resource: &ApiResource) -> Result<Vec<DynamicObject>, ListError>;
}

const DEFAULT_PAGE_SIZE: u32 = 500;

/// [`ClusterClient`] over a kube client.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    page_size: u32,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self { Self { client, page_size: DEFAULT_PAGE_SIZE } }

    /// Client for the current kubeconfig context or in-cluster config.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context("building kube client")?;
        Ok(Self::new(client))
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn server_version(&self) -> Result<String, ListError> {
        let info = self.client.apiserver_version().await.map_err(|e| ListError::Transport(Box::new(e)))?;
        Ok(info.git_version)
    }

    async fn list(&self, resource: &ApiResource) -> Result<Vec<DynamicObject>, ListError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), resource);
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;
        loop {
            let mut lp = ListParams::default().limit(self.page_size);
            if let Some(token) = continue_token.take() {
                lp = lp.continue_token(&token);
            }
            let page = api.list(&lp).await.map_err(|e| ListError::from_kube(e, resource))?;
            items.extend(page.items);
            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => {
                    debug!(api_version = %resource.api_version, plural = %resource.plural, fetched = items.len(), "list: next page");
                    continue_token = Some(token);
                }
                _ => break,
            }
        }
        Ok(items)
    }
}
