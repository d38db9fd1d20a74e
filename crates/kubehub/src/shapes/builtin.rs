//! Core-group kinds (`v1`): Namespace and Service.

use hubtopo_core::{Namespace, Service, ServiceMeta, ServicePortSpec, TrackedKind};
use k8s_openapi::api::core::v1 as corev1;

use super::{int_or_string, resource_meta};

pub(crate) fn namespace(obj: corev1::Namespace) -> Namespace {
    Namespace { meta: resource_meta(TrackedKind::Namespace, &obj.metadata) }
}

pub(crate) fn service(obj: corev1::Service) -> Service {
    let spec = obj.spec.unwrap_or_default();
    let ports = spec
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| ServicePortSpec {
            name: p.name,
            port: p.port,
            protocol: p.protocol,
            target_port: p.target_port.map(int_or_string),
        })
        .collect();
    Service {
        meta: resource_meta(TrackedKind::Service, &obj.metadata),
        service: ServiceMeta {
            type_: spec.type_,
            selector: spec.selector.unwrap_or_default(),
            ports,
            annotations: obj.metadata.annotations.unwrap_or_default(),
        },
    }
}
