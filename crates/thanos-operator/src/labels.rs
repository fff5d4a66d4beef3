//! Label keys and values forming the operator's label contract.
//!
//! Generated objects carry the standard `app.kubernetes.io/*` labels. Services
//! that expose a Thanos Store API are discovered through [`STORE_API_LABEL`],
//! and ingester Services carry [`OWNER_LABEL`] so that the EndpointSlices the
//! platform mirrors from them can be traced back to their `ThanosReceive`.

use std::collections::BTreeMap;

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
pub const PART_OF_VALUE: &str = "thanos";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "thanos-operator";

/// Marks a Service as exposing the Thanos Store API.
pub const STORE_API_LABEL: &str = "operator.thanos.io/store-api";
pub const STORE_API_VALUE: &str = "true";

/// Name of the custom resource that owns an ingester Service.
pub const OWNER_LABEL: &str = "operator.thanos.io/owner";

/// Set by the platform on every EndpointSlice to the name of its Service.
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Merge `overrides` on top of `base`, with `overrides` winning on conflicts.
pub fn merge_labels(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Render equality requirements as a label selector string (`k1=v1,k2=v2`).
pub fn selector_string(match_labels: &BTreeMap<String, String>) -> String {
    match_labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `labels` satisfies every equality requirement in `match_labels`.
///
/// An empty selector matches everything.
pub fn matches(match_labels: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    match_labels
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_merge_labels_override_wins() {
        let base = labels(&[("a", "1"), ("b", "2")]);
        let merged = merge_labels(&base, &labels(&[("b", "3"), ("c", "4")]));
        assert_eq!(merged, labels(&[("a", "1"), ("b", "3"), ("c", "4")]));
    }

    #[test]
    fn test_selector_string() {
        let selector = labels(&[(STORE_API_LABEL, STORE_API_VALUE), (PART_OF_LABEL, "thanos")]);
        assert_eq!(
            selector_string(&selector),
            "app.kubernetes.io/part-of=thanos,operator.thanos.io/store-api=true"
        );
        assert_eq!(selector_string(&BTreeMap::new()), "");
    }

    #[test]
    fn test_matches() {
        let svc = labels(&[(STORE_API_LABEL, "true"), ("app", "receive")]);
        assert!(matches(&labels(&[(STORE_API_LABEL, "true")]), &svc));
        assert!(!matches(&labels(&[(STORE_API_LABEL, "false")]), &svc));
        assert!(!matches(&labels(&[("missing", "x")]), &svc));
        assert!(matches(&BTreeMap::new(), &svc));
    }
}
