//! hubtopo core types: version-independent resource identity, canonical
//! records per tracked kind and the topology snapshot they are assembled into.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod error;
mod key;
mod records;
mod topology;

pub use error::{BoxError, CancelReason, TopologyError};
pub use key::canonical_key;
pub use records::{
    Api, ApiCollection, ApiCollectionSpec, ApiCollectionStatus, ApiService, Ingress, IngressBackend,
    IngressClass, IngressClassMeta, IngressMeta, IngressPath, IngressRule, IngressTls, Namespace,
    OpenApiSpec, Record, Service, ServiceMeta, ServicePort, ServicePortSpec,
};
pub use topology::{Topology, TopologyBuilder};

pub mod prelude {
    pub use super::{
        canonical_key, Record, ResourceMeta, Topology, TopologyBuilder, TopologyError, TrackedKind,
    };
}

/// Logical resource types tracked in a topology, independent of the API
/// group/version that served them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackedKind {
    Namespace,
    Service,
    Ingress,
    IngressClass,
    Api,
    ApiCollection,
}

impl TrackedKind {
    pub const ALL: [TrackedKind; 6] = [
        TrackedKind::Namespace,
        TrackedKind::Service,
        TrackedKind::Ingress,
        TrackedKind::IngressClass,
        TrackedKind::Api,
        TrackedKind::ApiCollection,
    ];

    /// Kubernetes `kind` as written in manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackedKind::Namespace => "Namespace",
            TrackedKind::Service => "Service",
            TrackedKind::Ingress => "Ingress",
            TrackedKind::IngressClass => "IngressClass",
            TrackedKind::Api => "API",
            TrackedKind::ApiCollection => "APICollection",
        }
    }

    /// Canonical API group. Stays the same whichever group/version served the object.
    pub fn group(&self) -> &'static str {
        match self {
            TrackedKind::Namespace | TrackedKind::Service => "",
            TrackedKind::Ingress | TrackedKind::IngressClass => "networking.k8s.io",
            TrackedKind::Api | TrackedKind::ApiCollection => "hub.traefik.io",
        }
    }

    pub fn namespaced(&self) -> bool {
        matches!(self, TrackedKind::Service | TrackedKind::Ingress | TrackedKind::Api)
    }
}

impl fmt::Display for TrackedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for TrackedKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TrackedKind::ALL
            .into_iter()
            .find(|k| k.kind().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownKind(wanted.to_string()))
    }
}

/// Version-independent identity of a cluster object.
///
/// `namespace` is empty for cluster-scoped kinds and `group` is empty for the
/// core API group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub kind: String,
    pub group: String,
    pub name: String,
    pub namespace: String,
}

impl ResourceMeta {
    /// Identity for an object of a tracked kind. The namespace is dropped for
    /// cluster-scoped kinds.
    pub fn new(kind: TrackedKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let namespace = if kind.namespaced() { namespace.into() } else { String::new() };
        Self { kind: kind.kind().to_string(), group: kind.group().to_string(), name: name.into(), namespace }
    }

    pub fn is_namespaced(&self) -> bool { !self.namespace.is_empty() }

    /// Canonical key, see [`canonical_key`].
    pub fn key(&self) -> String { canonical_key(self) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("ingress".parse::<TrackedKind>(), Ok(TrackedKind::Ingress));
        assert_eq!("APICollection".parse::<TrackedKind>(), Ok(TrackedKind::ApiCollection));
        assert_eq!(" api ".parse::<TrackedKind>(), Ok(TrackedKind::Api));
        assert!("Pod".parse::<TrackedKind>().is_err());
    }

    #[test]
    fn cluster_scoped_meta_drops_namespace() {
        let meta = ResourceMeta::new(TrackedKind::Namespace, "myns", "ignored");
        assert_eq!(meta.namespace, "");
        assert!(!meta.is_namespaced());

        let meta = ResourceMeta::new(TrackedKind::Ingress, "web", "myns");
        assert_eq!(meta.kind, "Ingress");
        assert_eq!(meta.group, "networking.k8s.io");
        assert_eq!(meta.namespace, "myns");
    }
}
