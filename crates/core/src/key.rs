//! Canonical keys: `<name>@<namespace>.<kind>.<group>`.

use crate::ResourceMeta;

/// Derive the canonical key of a resource.
///
/// The namespace segment (and its `@`) is omitted for cluster-scoped objects,
/// the group segment (and its `.`) for the core API group. The kind is always
/// lowercased. Object names and namespaces never contain `@`, and namespaces
/// never contain `.`, so keys of one kind cannot collide.
pub fn canonical_key(meta: &ResourceMeta) -> String {
    let kind = meta.kind.to_ascii_lowercase();
    let mut key = String::with_capacity(meta.name.len() + meta.namespace.len() + kind.len() + meta.group.len() + 3);
    key.push_str(&meta.name);
    if !meta.namespace.is_empty() {
        key.push('@');
        key.push_str(&meta.namespace);
    }
    key.push('.');
    key.push_str(&kind);
    if !meta.group.is_empty() {
        key.push('.');
        key.push_str(&meta.group);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackedKind;
    use std::collections::HashSet;

    fn meta(kind: &str, group: &str, name: &str, ns: &str) -> ResourceMeta {
        ResourceMeta { kind: kind.into(), group: group.into(), name: name.into(), namespace: ns.into() }
    }

    #[test]
    fn formats() {
        assert_eq!(
            canonical_key(&meta("Ingress", "networking.k8s.io", "myIngress_netv1beta1", "myns")),
            "myIngress_netv1beta1@myns.ingress.networking.k8s.io"
        );
        assert_eq!(canonical_key(&meta("Service", "", "whoami", "default")), "whoami@default.service");
        assert_eq!(canonical_key(&meta("Namespace", "", "myns", "")), "myns.namespace");
        assert_eq!(
            canonical_key(&meta("APICollection", "hub.traefik.io", "payments", "")),
            "payments.apicollection.hub.traefik.io"
        );
    }

    #[test]
    fn deterministic() {
        let m = ResourceMeta::new(TrackedKind::Api, "orders", "shop");
        assert_eq!(canonical_key(&m), canonical_key(&m.clone()));
        assert_eq!(m.key(), "orders@shop.api.hub.traefik.io");
    }

    #[test]
    fn distinct_metas_yield_distinct_keys() {
        let metas = vec![
            meta("Service", "", "a", "x"),
            meta("Service", "", "a", "y"),
            meta("Service", "", "b", "x"),
            meta("Ingress", "networking.k8s.io", "a", "x"),
            meta("Ingress", "extensions", "a", "x"),
            meta("Namespace", "", "x", ""),
            meta("Namespace", "", "a.b", ""),
            meta("Service", "", "a.b", "c"),
            meta("Service", "", "a", "b.c"),
        ];
        let keys: HashSet<String> = metas.iter().map(canonical_key).collect();
        assert_eq!(keys.len(), metas.len());
    }
}
