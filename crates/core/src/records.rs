//! Canonical, version-independent records for each tracked kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

use crate::{ResourceMeta, TrackedKind};

/// Port reference as found in backends: either a number or a named port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServicePort {
    Number(i32),
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortSpec {
    pub name: Option<String>,
    pub port: i32,
    pub protocol: Option<String>,
    pub target_port: Option<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMeta {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePortSpec>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub service: ServiceMeta,
}

/// Where an Ingress path (or the default backend) sends traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IngressBackend {
    Service { name: String, port: Option<ServicePort> },
    Resource { api_group: Option<String>, kind: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressPath {
    pub path: Option<String>,
    pub path_type: Option<String>,
    pub backend: Option<IngressBackend>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    pub host: Option<String>,
    pub paths: Vec<IngressPath>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressTls {
    pub hosts: Vec<String>,
    pub secret_name: Option<String>,
}

/// Routing-relevant Ingress fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressMeta {
    pub class_name: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub default_backend: Option<IngressBackend>,
    pub rules: Vec<IngressRule>,
    pub tls: Vec<IngressTls>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingress {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub ingress: IngressMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressClassMeta {
    pub controller: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressClass {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub class: IngressClassMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiSpec {
    pub url: Option<String>,
    pub path: Option<String>,
    pub port: Option<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiService {
    pub name: String,
    pub port: Option<ServicePort>,
    pub open_api_spec: Option<OpenApiSpec>,
}

/// An API exposed through the hub. Collections select these by label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Api {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    pub labels: BTreeMap<String, String>,
    pub resource_version: Option<String>,
    pub path_prefix: String,
    pub service: ApiService,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCollectionSpec {
    pub path_prefix: String,
    /// Follows label selector semantics; an empty selector matches every API.
    pub api_selector: LabelSelector,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCollectionStatus {
    pub version: String,
    pub synced_at: Option<DateTime<Utc>>,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCollection {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    pub resource_version: Option<String>,
    pub spec: ApiCollectionSpec,
    pub status: ApiCollectionStatus,
}

/// A normalized object of any tracked kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record")]
pub enum Record {
    Namespace(Namespace),
    Service(Service),
    Ingress(Ingress),
    IngressClass(IngressClass),
    Api(Api),
    ApiCollection(ApiCollection),
}

impl Record {
    pub fn meta(&self) -> &ResourceMeta {
        match self {
            Record::Namespace(r) => &r.meta,
            Record::Service(r) => &r.meta,
            Record::Ingress(r) => &r.meta,
            Record::IngressClass(r) => &r.meta,
            Record::Api(r) => &r.meta,
            Record::ApiCollection(r) => &r.meta,
        }
    }

    pub fn kind(&self) -> TrackedKind {
        match self {
            Record::Namespace(_) => TrackedKind::Namespace,
            Record::Service(_) => TrackedKind::Service,
            Record::Ingress(_) => TrackedKind::Ingress,
            Record::IngressClass(_) => TrackedKind::IngressClass,
            Record::Api(_) => TrackedKind::Api,
            Record::ApiCollection(_) => TrackedKind::ApiCollection,
        }
    }

    pub fn key(&self) -> String { self.meta().key() }
}
