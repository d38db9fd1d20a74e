//! Resource normalization: list one kind through its planned shapes and
//! convert the result into canonical records.

use std::time::Instant;

use hubtopo_core::{Record, TopologyError, TrackedKind};
use kube::core::DynamicObject;
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::{ClusterClient, ListError, SourceShape};

/// Fetch every object of `kind` using `plan` (preferred shape first).
///
/// A shape reported as not served moves on to the next one; any other list
/// error, or running out of shapes, is `FetchFailed`. An empty plan means the
/// kind is not served at this version and yields no records.
pub async fn fetch_kind(
    client: &dyn ClusterClient,
    kind: TrackedKind,
    plan: &[SourceShape],
) -> Result<Vec<Record>, TopologyError> {
    if plan.is_empty() {
        debug!(kind = %kind, "kind not served at this server version");
        return Ok(Vec::new());
    }
    let started = Instant::now();
    let mut last_missing: Option<(SourceShape, ListError)> = None;
    for &shape in plan {
        let resource = shape.api_resource();
        match client.list(&resource).await {
            Ok(objects) => {
                let listed = objects.len();
                let records = convert_all(shape, objects);
                histogram!("topology_kind_fetch_ms", started.elapsed().as_secs_f64() * 1000.0);
                counter!("topology_objects_total", records.len() as u64, "kind" => kind.kind());
                debug!(
                    kind = %kind,
                    api_version = %shape.api_version(),
                    listed,
                    count = records.len(),
                    took_ms = %started.elapsed().as_millis(),
                    "kind fetched"
                );
                return Ok(records);
            }
            Err(err @ ListError::NotFound { .. }) => {
                debug!(kind = %kind, api_version = %shape.api_version(), "not served; trying next shape");
                last_missing = Some((shape, err));
            }
            Err(err) => {
                return Err(TopologyError::FetchFailed { kind, api_version: shape.api_version(), source: Box::new(err) });
            }
        }
    }
    let (shape, err) = match last_missing {
        Some(last) => last,
        None => return Ok(Vec::new()),
    };
    Err(TopologyError::FetchFailed { kind, api_version: shape.api_version(), source: Box::new(err) })
}

/// Objects that do not decode into their shape are skipped.
fn convert_all(shape: SourceShape, objects: Vec<DynamicObject>) -> Vec<Record> {
    let mut records = Vec::with_capacity(objects.len());
    for obj in objects {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let namespace = obj.metadata.namespace.clone().unwrap_or_default();
        match shape.convert(obj) {
            Ok(record) => records.push(record),
            Err(error) => {
                counter!("topology_decode_skipped_total", 1u64, "kind" => shape.kind().kind());
                warn!(api_version = %shape.api_version(), name = %name, namespace = %namespace, error = %error, "skipping undecodable object");
            }
        }
    }
    records
}
