//! Topology snapshot: one map per tracked kind, keyed by canonical key.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::records::{Api, ApiCollection, Ingress, IngressClass, Namespace, Record, Service};
use crate::TrackedKind;

/// One consistent view of every tracked resource at a point in time.
///
/// Built once by [`TopologyBuilder`] and never mutated afterwards; a new
/// fetch cycle produces a new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub epoch: u64,
    pub server_version: String,
    pub namespaces: FxHashMap<String, Namespace>,
    pub services: FxHashMap<String, Service>,
    pub ingresses: FxHashMap<String, Ingress>,
    pub ingress_classes: FxHashMap<String, IngressClass>,
    pub apis: FxHashMap<String, Api>,
    pub collections: FxHashMap<String, ApiCollection>,
    /// Kinds whose fetch failed under the best-effort policy.
    pub missing_kinds: Vec<TrackedKind>,
}

impl Topology {
    pub fn is_partial(&self) -> bool { !self.missing_kinds.is_empty() }

    pub fn len_of(&self, kind: TrackedKind) -> usize {
        match kind {
            TrackedKind::Namespace => self.namespaces.len(),
            TrackedKind::Service => self.services.len(),
            TrackedKind::Ingress => self.ingresses.len(),
            TrackedKind::IngressClass => self.ingress_classes.len(),
            TrackedKind::Api => self.apis.len(),
            TrackedKind::ApiCollection => self.collections.len(),
        }
    }

    /// Canonical keys of one kind, sorted.
    pub fn keys_of(&self, kind: TrackedKind) -> Vec<&str> {
        let mut keys: Vec<&str> = match kind {
            TrackedKind::Namespace => self.namespaces.keys().map(String::as_str).collect(),
            TrackedKind::Service => self.services.keys().map(String::as_str).collect(),
            TrackedKind::Ingress => self.ingresses.keys().map(String::as_str).collect(),
            TrackedKind::IngressClass => self.ingress_classes.keys().map(String::as_str).collect(),
            TrackedKind::Api => self.apis.keys().map(String::as_str).collect(),
            TrackedKind::ApiCollection => self.collections.keys().map(String::as_str).collect(),
        };
        keys.sort_unstable();
        keys
    }
}

/// Accumulates normalized records for one cycle, then freezes them.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    topo: Topology,
}

impl TopologyBuilder {
    pub fn new(server_version: impl Into<String>) -> Self {
        Self { topo: Topology { server_version: server_version.into(), ..Default::default() } }
    }

    /// Insert a record under its canonical key. Returns `true` when the key
    /// was already present, in which case the later record wins.
    pub fn insert(&mut self, record: Record) -> bool {
        let key = record.key();
        match record {
            Record::Namespace(r) => self.topo.namespaces.insert(key, r).is_some(),
            Record::Service(r) => self.topo.services.insert(key, r).is_some(),
            Record::Ingress(r) => self.topo.ingresses.insert(key, r).is_some(),
            Record::IngressClass(r) => self.topo.ingress_classes.insert(key, r).is_some(),
            Record::Api(r) => self.topo.apis.insert(key, r).is_some(),
            Record::ApiCollection(r) => self.topo.collections.insert(key, r).is_some(),
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) -> usize {
        let mut dupes = 0;
        for record in records {
            if self.insert(record) {
                dupes += 1;
            }
        }
        dupes
    }

    pub fn mark_missing(&mut self, kind: TrackedKind) {
        if !self.topo.missing_kinds.contains(&kind) {
            self.topo.missing_kinds.push(kind);
        }
    }

    pub fn build(mut self, epoch: u64) -> Topology {
        self.topo.epoch = epoch;
        self.topo.missing_kinds.sort_unstable();
        self.topo
    }
}
