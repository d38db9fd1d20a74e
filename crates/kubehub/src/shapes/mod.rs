//! Source shapes: every group/version a tracked kind can be served under,
//! each with an explicit conversion into the kind's canonical record.
//!
//! This is the only place where version-specific field layouts are known.

use hubtopo_core::{Record, ResourceMeta, ServicePort, TrackedKind};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use serde::de::DeserializeOwned;
use serde::Serialize;

mod builtin;
mod hub;
mod ingress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceShape {
    CoreV1Namespace,
    CoreV1Service,
    ExtensionsV1Beta1Ingress,
    NetworkingV1Beta1Ingress,
    NetworkingV1Ingress,
    NetworkingV1Beta1IngressClass,
    NetworkingV1IngressClass,
    HubV1Alpha1Api,
    HubV1Alpha1ApiCollection,
}

impl SourceShape {
    pub fn kind(self) -> TrackedKind {
        match self {
            SourceShape::CoreV1Namespace => TrackedKind::Namespace,
            SourceShape::CoreV1Service => TrackedKind::Service,
            SourceShape::ExtensionsV1Beta1Ingress
            | SourceShape::NetworkingV1Beta1Ingress
            | SourceShape::NetworkingV1Ingress => TrackedKind::Ingress,
            SourceShape::NetworkingV1Beta1IngressClass | SourceShape::NetworkingV1IngressClass => {
                TrackedKind::IngressClass
            }
            SourceShape::HubV1Alpha1Api => TrackedKind::Api,
            SourceShape::HubV1Alpha1ApiCollection => TrackedKind::ApiCollection,
        }
    }

    /// API group this shape is served under. Not necessarily the kind's
    /// canonical group.
    pub fn group(self) -> &'static str {
        match self {
            SourceShape::CoreV1Namespace | SourceShape::CoreV1Service => "",
            SourceShape::ExtensionsV1Beta1Ingress => "extensions",
            SourceShape::NetworkingV1Beta1Ingress
            | SourceShape::NetworkingV1Ingress
            | SourceShape::NetworkingV1Beta1IngressClass
            | SourceShape::NetworkingV1IngressClass => "networking.k8s.io",
            SourceShape::HubV1Alpha1Api | SourceShape::HubV1Alpha1ApiCollection => "hub.traefik.io",
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            SourceShape::CoreV1Namespace
            | SourceShape::CoreV1Service
            | SourceShape::NetworkingV1Ingress
            | SourceShape::NetworkingV1IngressClass => "v1",
            SourceShape::ExtensionsV1Beta1Ingress
            | SourceShape::NetworkingV1Beta1Ingress
            | SourceShape::NetworkingV1Beta1IngressClass => "v1beta1",
            SourceShape::HubV1Alpha1Api | SourceShape::HubV1Alpha1ApiCollection => "v1alpha1",
        }
    }

    pub fn plural(self) -> &'static str {
        match self.kind() {
            TrackedKind::Namespace => "namespaces",
            TrackedKind::Service => "services",
            TrackedKind::Ingress => "ingresses",
            TrackedKind::IngressClass => "ingressclasses",
            TrackedKind::Api => "apis",
            TrackedKind::ApiCollection => "apicollections",
        }
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(self) -> String {
        if self.group().is_empty() {
            self.version().to_string()
        } else {
            format!("{}/{}", self.group(), self.version())
        }
    }

    pub fn api_resource(self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group(), self.version(), self.kind().kind());
        ApiResource::from_gvk_with_plural(&gvk, self.plural())
    }

    /// Convert an object listed through this shape into its canonical record.
    pub fn convert(self, obj: DynamicObject) -> Result<Record, serde_json::Error> {
        Ok(match self {
            SourceShape::CoreV1Namespace => Record::Namespace(builtin::namespace(decode(obj)?)),
            SourceShape::CoreV1Service => Record::Service(builtin::service(decode(obj)?)),
            SourceShape::ExtensionsV1Beta1Ingress | SourceShape::NetworkingV1Beta1Ingress => {
                Record::Ingress(ingress::from_v1beta1(decode(obj)?))
            }
            SourceShape::NetworkingV1Ingress => Record::Ingress(ingress::from_v1(decode(obj)?)),
            SourceShape::NetworkingV1Beta1IngressClass => Record::IngressClass(ingress::class_from_v1beta1(decode(obj)?)),
            SourceShape::NetworkingV1IngressClass => Record::IngressClass(ingress::class_from_v1(decode(obj)?)),
            SourceShape::HubV1Alpha1Api => Record::Api(hub::api(decode(obj)?)),
            SourceShape::HubV1Alpha1ApiCollection => Record::ApiCollection(hub::collection(decode(obj)?)),
        })
    }
}

/// Rebuild a typed object from a dynamic one. Type fields are dropped so
/// typed deserializers never see a mismatched `apiVersion`.
fn decode<T: DeserializeOwned>(obj: DynamicObject) -> Result<T, serde_json::Error> {
    let mut fields = match obj.data {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    fields.remove("apiVersion");
    fields.remove("kind");
    fields.insert("metadata".to_string(), serde_json::to_value(&obj.metadata)?);
    serde_json::from_value(serde_json::Value::Object(fields))
}

fn resource_meta(kind: TrackedKind, meta: &ObjectMeta) -> ResourceMeta {
    ResourceMeta::new(kind, meta.name.clone().unwrap_or_default(), meta.namespace.clone().unwrap_or_default())
}

fn int_or_string(v: IntOrString) -> ServicePort {
    match v {
        IntOrString::Int(n) => ServicePort::Number(n),
        IntOrString::String(s) => ServicePort::Name(s),
    }
}

/// `{ number, name }` port objects; a zero number counts as unset.
fn numbered_or_named(number: Option<i32>, name: Option<String>) -> Option<ServicePort> {
    match (number, name) {
        (Some(n), _) if n != 0 => Some(ServicePort::Number(n)),
        (_, Some(name)) if !name.is_empty() => Some(ServicePort::Name(name)),
        _ => None,
    }
}
