//! hubtopo collect: resolves API collections against a topology snapshot.
//!
//! A collection selects `API` resources by label. Matching yields the sorted
//! set of canonical keys plus a content hash; a collection whose stored hash
//! differs from the freshly computed one needs to be synced again.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use hubtopo_core::{Api, ApiCollection, ApiCollectionStatus, ApiService, Topology, TopologyError};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

mod selector;

pub use selector::{Expression, Selector, SelectorError};

/// Outcome of matching one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMatch {
    pub name: String,
    /// Canonical keys of the selected APIs, sorted.
    pub apis: Vec<String>,
    pub hash: String,
}

impl CollectionMatch {
    pub fn status(&self, version: impl Into<String>, synced_at: DateTime<Utc>) -> ApiCollectionStatus {
        ApiCollectionStatus { version: version.into(), synced_at: Some(synced_at), hash: self.hash.clone() }
    }

    /// True when the stored status no longer reflects the matched content.
    pub fn needs_sync(&self, collection: &ApiCollection) -> bool { collection.status.hash != self.hash }
}

/// APIs of every namespace selected by `selector`, sorted by canonical key.
pub fn match_apis<'a>(topo: &'a Topology, selector: &Selector) -> Vec<(&'a str, &'a Api)> {
    let mut out: Vec<(&str, &Api)> = topo
        .apis
        .iter()
        .filter(|(_, api)| selector.matches(&api.labels))
        .map(|(key, api)| (key.as_str(), api))
        .collect();
    out.sort_unstable_by(|a, b| a.0.cmp(b.0));
    out
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedApi<'a> {
    key: &'a str,
    path_prefix: &'a str,
    service: &'a ApiService,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedCollection<'a> {
    path_prefix: &'a str,
    selector: String,
    apis: Vec<HashedApi<'a>>,
}

/// BLAKE3 over the canonical JSON form of a match, hex encoded. `apis`
/// must be sorted by key, as returned by [`match_apis`].
///
/// `path_prefix` is part of the content: the result only equals a
/// collection's hash when given that collection's `spec.pathPrefix` and
/// compiled selector.
pub fn content_hash(path_prefix: &str, selector: &Selector, apis: &[(&str, &Api)]) -> Result<String, serde_json::Error> {
    let doc = HashedCollection {
        path_prefix,
        selector: selector.to_string(),
        apis: apis
            .iter()
            .map(|(key, api)| HashedApi { key, path_prefix: &api.path_prefix, service: &api.service })
            .collect(),
    };
    let bytes = serde_json::to_vec(&doc)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

pub fn match_collection(topo: &Topology, collection: &ApiCollection) -> Result<CollectionMatch, TopologyError> {
    let name = &collection.meta.name;
    let failed = |reason: String| TopologyError::MatchFailed { collection: name.clone(), reason };

    let res = Selector::compile(&collection.spec.api_selector)
        .map_err(|e| failed(e.to_string()))
        .and_then(|selector| {
            let apis = match_apis(topo, &selector);
            let hash = content_hash(&collection.spec.path_prefix, &selector, &apis).map_err(|e| failed(e.to_string()))?;
            Ok(CollectionMatch {
                name: name.clone(),
                apis: apis.iter().map(|(key, _)| key.to_string()).collect(),
                hash,
            })
        });

    match &res {
        Ok(m) => {
            counter!("collection_match_total", 1u64, "outcome" => "ok");
            debug!(collection = %name, apis = m.apis.len(), hash = %m.hash, "collection matched");
        }
        Err(e) => {
            counter!("collection_match_total", 1u64, "outcome" => e.outcome());
            warn!(collection = %name, error = %e, "collection match failed");
        }
    }
    res
}

/// Match every collection in the snapshot, ordered by collection name. A
/// failure only affects its own entry.
pub fn match_all(topo: &Topology) -> Vec<Result<CollectionMatch, TopologyError>> {
    let mut collections: Vec<&ApiCollection> = topo.collections.values().collect();
    collections.sort_unstable_by(|a, b| a.meta.name.cmp(&b.meta.name));
    collections.into_iter().map(|c| match_collection(topo, c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubtopo_core::{ResourceMeta, TrackedKind};

    fn api(name: &str, prefix: &str) -> Api {
        Api {
            meta: ResourceMeta::new(TrackedKind::Api, name, "shop"),
            path_prefix: prefix.into(),
            service: ApiService { name: name.into(), ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn hash_covers_content_not_labels() {
        let sel: Selector = "team=checkout".parse().unwrap();
        let a = api("orders", "/orders");
        let base = content_hash("/api", &sel, &[("orders@shop.api.hub.traefik.io", &a)]).unwrap();
        assert_eq!(base.len(), 64);

        let mut relabeled = a.clone();
        relabeled.labels.insert("owner".into(), "someone".into());
        assert_eq!(content_hash("/api", &sel, &[("orders@shop.api.hub.traefik.io", &relabeled)]).unwrap(), base);

        let mut moved = a.clone();
        moved.path_prefix = "/v2/orders".into();
        assert_ne!(content_hash("/api", &sel, &[("orders@shop.api.hub.traefik.io", &moved)]).unwrap(), base);
        assert_ne!(content_hash("/other", &sel, &[("orders@shop.api.hub.traefik.io", &a)]).unwrap(), base);
        assert_ne!(content_hash("/api", &Selector::default(), &[("orders@shop.api.hub.traefik.io", &a)]).unwrap(), base);
    }

    #[test]
    fn status_carries_hash_and_sync_time() {
        let m = CollectionMatch { name: "checkout".into(), apis: vec![], hash: "abc".into() };
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let status = m.status("42", at);
        assert_eq!(status, ApiCollectionStatus { version: "42".into(), synced_at: Some(at), hash: "abc".into() });

        let mut stored = ApiCollection::default();
        assert!(m.needs_sync(&stored));
        stored.status = status;
        assert!(!m.needs_sync(&stored));
    }
}
