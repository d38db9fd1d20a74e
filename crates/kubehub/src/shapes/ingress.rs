//! Ingress and IngressClass across `extensions/v1beta1`,
//! `networking.k8s.io/v1beta1` and `networking.k8s.io/v1`.

use std::collections::BTreeMap;

use hubtopo_core::{
    Ingress, IngressBackend, IngressClass, IngressClassMeta, IngressMeta, IngressPath, IngressRule, IngressTls,
    TrackedKind,
};
use k8s_openapi::api::core::v1::TypedLocalObjectReference;
use k8s_openapi::api::networking::v1 as netv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;

use super::{int_or_string, numbered_or_named, resource_meta};

const CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
const DEFAULT_CLASS_ANNOTATION: &str = "ingressclass.kubernetes.io/is-default-class";

// The two v1beta1 groups share one layout.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IngressV1Beta1 {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: Option<IngressSpecV1Beta1>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IngressSpecV1Beta1 {
    pub backend: Option<BackendV1Beta1>,
    pub ingress_class_name: Option<String>,
    pub rules: Option<Vec<RuleV1Beta1>>,
    pub tls: Option<Vec<TlsV1Beta1>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BackendV1Beta1 {
    pub service_name: Option<String>,
    pub service_port: Option<IntOrString>,
    pub resource: Option<TypedLocalObjectReference>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RuleV1Beta1 {
    pub host: Option<String>,
    pub http: Option<HttpRuleV1Beta1>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HttpRuleV1Beta1 {
    #[serde(default)]
    pub paths: Vec<PathV1Beta1>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PathV1Beta1 {
    pub path: Option<String>,
    pub path_type: Option<String>,
    #[serde(default)]
    pub backend: BackendV1Beta1,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TlsV1Beta1 {
    pub hosts: Option<Vec<String>>,
    pub secret_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct IngressClassV1Beta1 {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: Option<IngressClassSpecV1Beta1>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct IngressClassSpecV1Beta1 {
    pub controller: Option<String>,
}

fn resource_backend(r: TypedLocalObjectReference) -> IngressBackend {
    IngressBackend::Resource { api_group: r.api_group, kind: r.kind, name: r.name }
}

fn backend_v1beta1(b: BackendV1Beta1) -> Option<IngressBackend> {
    if let Some(r) = b.resource {
        return Some(resource_backend(r));
    }
    let name = b.service_name.filter(|n| !n.is_empty())?;
    Some(IngressBackend::Service { name, port: b.service_port.map(int_or_string) })
}

fn backend_v1(b: netv1::IngressBackend) -> Option<IngressBackend> {
    if let Some(r) = b.resource {
        return Some(resource_backend(r));
    }
    let svc = b.service?;
    let port = svc.port.and_then(|p| numbered_or_named(p.number, p.name));
    Some(IngressBackend::Service { name: svc.name, port })
}

fn ingress_meta(
    metadata: &ObjectMeta,
    class_name: Option<String>,
    default_backend: Option<IngressBackend>,
    rules: Vec<IngressRule>,
    tls: Vec<IngressTls>,
) -> IngressMeta {
    let annotations: BTreeMap<String, String> = metadata.annotations.clone().unwrap_or_default();
    let class_name = class_name
        .filter(|c| !c.is_empty())
        .or_else(|| annotations.get(CLASS_ANNOTATION).filter(|c| !c.is_empty()).cloned());
    IngressMeta { class_name, annotations, default_backend, rules, tls }
}

pub(crate) fn from_v1beta1(obj: IngressV1Beta1) -> Ingress {
    let spec = obj.spec.unwrap_or_default();
    let rules = spec
        .rules
        .unwrap_or_default()
        .into_iter()
        .map(|r| IngressRule {
            host: r.host,
            paths: r
                .http
                .map(|h| h.paths)
                .unwrap_or_default()
                .into_iter()
                .map(|p| IngressPath { path: p.path, path_type: p.path_type, backend: backend_v1beta1(p.backend) })
                .collect(),
        })
        .collect();
    let tls = spec
        .tls
        .unwrap_or_default()
        .into_iter()
        .map(|t| IngressTls { hosts: t.hosts.unwrap_or_default(), secret_name: t.secret_name })
        .collect();
    let default_backend = spec.backend.and_then(backend_v1beta1);
    Ingress {
        meta: resource_meta(TrackedKind::Ingress, &obj.metadata),
        ingress: ingress_meta(&obj.metadata, spec.ingress_class_name, default_backend, rules, tls),
    }
}

pub(crate) fn from_v1(obj: netv1::Ingress) -> Ingress {
    let spec = obj.spec.unwrap_or_default();
    let rules = spec
        .rules
        .unwrap_or_default()
        .into_iter()
        .map(|r| IngressRule {
            host: r.host,
            paths: r
                .http
                .map(|h| h.paths)
                .unwrap_or_default()
                .into_iter()
                .map(|p| IngressPath {
                    path: p.path,
                    path_type: Some(p.path_type).filter(|t| !t.is_empty()),
                    backend: backend_v1(p.backend),
                })
                .collect(),
        })
        .collect();
    let tls = spec
        .tls
        .unwrap_or_default()
        .into_iter()
        .map(|t| IngressTls { hosts: t.hosts.unwrap_or_default(), secret_name: t.secret_name })
        .collect();
    let default_backend = spec.default_backend.and_then(backend_v1);
    Ingress {
        meta: resource_meta(TrackedKind::Ingress, &obj.metadata),
        ingress: ingress_meta(&obj.metadata, spec.ingress_class_name, default_backend, rules, tls),
    }
}

fn is_default_class(metadata: &ObjectMeta) -> bool {
    metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(DEFAULT_CLASS_ANNOTATION))
        .map_or(false, |v| v == "true")
}

pub(crate) fn class_from_v1beta1(obj: IngressClassV1Beta1) -> IngressClass {
    IngressClass {
        meta: resource_meta(TrackedKind::IngressClass, &obj.metadata),
        class: IngressClassMeta {
            controller: obj.spec.and_then(|s| s.controller).unwrap_or_default(),
            is_default: is_default_class(&obj.metadata),
        },
    }
}

pub(crate) fn class_from_v1(obj: netv1::IngressClass) -> IngressClass {
    IngressClass {
        meta: resource_meta(TrackedKind::IngressClass, &obj.metadata),
        class: IngressClassMeta {
            controller: obj.spec.and_then(|s| s.controller).unwrap_or_default(),
            is_default: is_default_class(&obj.metadata),
        },
    }
}
