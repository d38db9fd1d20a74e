//! Hub custom resources (`hub.traefik.io/v1alpha1`): API and APICollection.

use chrono::{DateTime, Utc};
use hubtopo_core::{Api, ApiCollection, ApiCollectionSpec, ApiCollectionStatus, ApiService, OpenApiSpec, TrackedKind};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::Deserialize;

use super::{numbered_or_named, resource_meta};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiV1Alpha1 {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApiSpecV1Alpha1,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiSpecV1Alpha1 {
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub service: ApiServiceV1Alpha1,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiServiceV1Alpha1 {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port: PortV1Alpha1,
    pub open_api_spec: Option<OpenApiSpecV1Alpha1>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PortV1Alpha1 {
    pub number: Option<i32>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenApiSpecV1Alpha1 {
    pub url: Option<String>,
    pub path: Option<String>,
    pub port: Option<PortV1Alpha1>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiCollectionV1Alpha1 {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApiCollectionSpecV1Alpha1,
    #[serde(default)]
    pub status: ApiCollectionStatusV1Alpha1,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiCollectionSpecV1Alpha1 {
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub api_selector: LabelSelector,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiCollectionStatusV1Alpha1 {
    #[serde(default)]
    pub version: String,
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash: String,
}

pub(crate) fn api(obj: ApiV1Alpha1) -> Api {
    let svc = obj.spec.service;
    Api {
        meta: resource_meta(TrackedKind::Api, &obj.metadata),
        labels: obj.metadata.labels.clone().unwrap_or_default(),
        resource_version: obj.metadata.resource_version.clone(),
        path_prefix: obj.spec.path_prefix,
        service: ApiService {
            name: svc.name,
            port: numbered_or_named(svc.port.number, svc.port.name),
            open_api_spec: svc.open_api_spec.map(|o| OpenApiSpec {
                url: o.url,
                path: o.path,
                port: o.port.and_then(|p| numbered_or_named(p.number, p.name)),
            }),
        },
    }
}

pub(crate) fn collection(obj: ApiCollectionV1Alpha1) -> ApiCollection {
    ApiCollection {
        meta: resource_meta(TrackedKind::ApiCollection, &obj.metadata),
        resource_version: obj.metadata.resource_version.clone(),
        spec: ApiCollectionSpec { path_prefix: obj.spec.path_prefix, api_selector: obj.spec.api_selector },
        status: ApiCollectionStatus {
            version: obj.status.version,
            synced_at: obj.status.synced_at,
            hash: obj.status.hash,
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::shapes::SourceShape;
    use hubtopo_core::{Record, ServicePort};
    use kube::core::DynamicObject;
    use serde_json::json;

    #[test]
    fn api_record() {
        let mut obj = DynamicObject::new("orders", &SourceShape::HubV1Alpha1Api.api_resource()).within("shop").data(json!({
            "spec": {
                "pathPrefix": "/orders",
                "service": {
                    "name": "orders-svc",
                    "port": { "number": 8080 },
                    "openApiSpec": { "path": "/openapi.json", "port": { "name": "http" } }
                }
            }
        }));
        obj.metadata.labels = Some([("team".to_string(), "checkout".to_string())].into());
        obj.metadata.resource_version = Some("42".into());

        let Record::Api(api) = SourceShape::HubV1Alpha1Api.convert(obj).unwrap() else {
            panic!("expected an api record");
        };
        assert_eq!(api.meta.key(), "orders@shop.api.hub.traefik.io");
        assert_eq!(api.labels.get("team").map(String::as_str), Some("checkout"));
        assert_eq!(api.resource_version.as_deref(), Some("42"));
        assert_eq!(api.path_prefix, "/orders");
        assert_eq!(api.service.port, Some(ServicePort::Number(8080)));
        let spec = api.service.open_api_spec.unwrap();
        assert_eq!(spec.path.as_deref(), Some("/openapi.json"));
        assert_eq!(spec.port, Some(ServicePort::Name("http".into())));
    }

    #[test]
    fn collection_record() {
        let obj = DynamicObject::new("checkout", &SourceShape::HubV1Alpha1ApiCollection.api_resource()).data(json!({
            "spec": {
                "pathPrefix": "/api",
                "apiSelector": {
                    "matchLabels": { "team": "checkout" },
                    "matchExpressions": [{ "key": "tier", "operator": "In", "values": ["gold"] }]
                }
            },
            "status": { "version": "7", "syncedAt": "2023-03-01T10:00:00Z", "hash": "abc" }
        }));
        let Record::ApiCollection(col) = SourceShape::HubV1Alpha1ApiCollection.convert(obj).unwrap() else {
            panic!("expected a collection record");
        };
        assert_eq!(col.meta.key(), "checkout.apicollection.hub.traefik.io");
        assert_eq!(col.spec.path_prefix, "/api");
        assert_eq!(col.spec.api_selector.match_expressions.as_ref().map(Vec::len), Some(1));
        assert_eq!(col.status.hash, "abc");
        assert!(col.status.synced_at.is_some());
    }
}
