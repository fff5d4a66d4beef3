//! ThanosQuery CRD
//!
//! Declares a Thanos Query deployment that federates every Store API Service
//! matched by its label selector.

use super::common::CommonFields;
use crate::labels::{STORE_API_LABEL, STORE_API_VALUE};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "monitoring.thanos.io",
    version = "v1alpha1",
    kind = "ThanosQuery",
    plural = "thanosqueries",
    namespaced,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ThanosQuerySpec {
    #[serde(flatten)]
    pub common: CommonFields,

    /// Number of querier replicas.
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Labels treated as replica labels for deduplication.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub querier_replica_labels: Vec<String>,

    /// Selects the Services in the same namespace to federate.
    #[serde(default)]
    pub store_label_selector: StoreLabelSelector,

    /// Labels added to every generated object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_replicas() -> i32 {
    1
}

/// Equality-based label selector for Store API Services.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreLabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl Default for StoreLabelSelector {
    fn default() -> Self {
        Self {
            match_labels: BTreeMap::from([(
                STORE_API_LABEL.to_string(),
                STORE_API_VALUE.to_string(),
            )]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::LogFormat;

    #[test]
    fn test_query_spec_defaults() {
        let spec: ThanosQuerySpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.replicas, 1);
        assert_eq!(
            spec.store_label_selector.match_labels.get(STORE_API_LABEL),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn test_query_spec_flattened_common_fields() {
        let json = r#"{
            "image": "quay.io/thanos/thanos:v0.36.1",
            "logFormat": "json",
            "replicas": 3,
            "querierReplicaLabels": ["replica"],
            "storeLabelSelector": { "matchLabels": { "team": "obs" } }
        }"#;
        let spec: ThanosQuerySpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.common.image.as_deref(), Some("quay.io/thanos/thanos:v0.36.1"));
        assert_eq!(spec.common.log_format, LogFormat::Json);
        assert_eq!(spec.replicas, 3);
        assert_eq!(spec.querier_replica_labels, vec!["replica"]);
        assert_eq!(spec.store_label_selector.match_labels.len(), 1);
    }
}
