//! ThanosReceive CRD
//!
//! Declares the write path: a set of ingester hashrings, each backed by its
//! own StatefulSet, and a router that fans remote-write traffic out across
//! them according to the synthesized hashring configuration.

use super::common::{CommonFields, ObjectStorageConfig};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "monitoring.thanos.io",
    version = "v1alpha1",
    kind = "ThanosReceive",
    namespaced,
    printcolumn = r#"{"name":"Replication Factor", "type":"integer", "jsonPath":".spec.router.replicationFactor"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ThanosReceiveSpec {
    #[serde(flatten)]
    pub common: CommonFields,

    /// Labels added to every generated object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    pub router: RouterSpec,

    pub ingester: IngesterSpec,
}

/// Router configuration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouterSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default = "default_one")]
    pub replicas: i32,

    /// Number of ingesters each write is replicated to. Must not exceed the
    /// replica count of any hashring.
    #[serde(default = "default_one")]
    pub replication_factor: i32,
}

/// Ingester configuration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngesterSpec {
    /// Object storage used by hashrings that do not declare their own.
    pub default_object_storage_config: ObjectStorageConfig,

    /// Hashrings in priority order; earlier entries win tenant conflicts.
    #[serde(default)]
    pub hashrings: Vec<HashringSpec>,
}

/// A single ingester hashring.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HashringSpec {
    /// Unique name of the hashring within the resource.
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// External labels attached to every series ingested by this hashring.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_labels: BTreeMap<String, String>,

    /// Tenants routed to this hashring. Empty matches every tenant.
    #[serde(default)]
    pub tenants: Vec<String>,

    #[serde(default)]
    pub tenant_matcher_type: TenantMatcher,

    #[serde(default = "default_one")]
    pub replicas: i32,

    /// Local TSDB retention, e.g. `2h`.
    #[serde(default = "default_retention")]
    pub retention: String,

    /// Size of each ingester's persistent volume, e.g. `10Gi`.
    pub storage_size: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_storage_config: Option<ObjectStorageConfig>,
}

/// How the router compares tenant names against a hashring's tenant list.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TenantMatcher {
    #[default]
    Exact,
    Glob,
}

fn default_one() -> i32 {
    1
}

fn default_retention() -> String {
    "2h".to_string()
}

impl ThanosReceiveSpec {
    /// Object storage for `hashring`, falling back to the ingester default.
    pub fn object_storage_for<'a>(&'a self, hashring: &'a HashringSpec) -> &'a ObjectStorageConfig {
        hashring
            .object_storage_config
            .as_ref()
            .unwrap_or(&self.ingester.default_object_storage_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"{
        "router": { "replicationFactor": 3 },
        "ingester": {
            "defaultObjectStorageConfig": { "name": "test-secret", "key": "test-key" },
            "hashrings": [
                {
                    "name": "test-hashring",
                    "storageSize": "100Mi",
                    "tenants": ["test-tenant"],
                    "replicas": 3
                },
                {
                    "name": "dedicated",
                    "storageSize": "1Gi",
                    "tenantMatcherType": "glob",
                    "objectStorageConfig": { "name": "other", "key": "bucket.yaml" }
                }
            ]
        }
    }"#;

    #[test]
    fn test_receive_spec_defaults() {
        let spec: ThanosReceiveSpec = serde_json::from_str(SPEC).unwrap();
        assert_eq!(spec.router.replication_factor, 3);
        assert_eq!(spec.router.replicas, 1);

        let first = &spec.ingester.hashrings[0];
        assert_eq!(first.retention, "2h");
        assert_eq!(first.tenant_matcher_type, TenantMatcher::Exact);

        let second = &spec.ingester.hashrings[1];
        assert_eq!(second.replicas, 1);
        assert_eq!(second.tenant_matcher_type, TenantMatcher::Glob);
        assert!(second.tenants.is_empty());
    }

    #[test]
    fn test_object_storage_fallback() {
        let spec: ThanosReceiveSpec = serde_json::from_str(SPEC).unwrap();
        let hashrings = &spec.ingester.hashrings;
        assert_eq!(spec.object_storage_for(&hashrings[0]).name, "test-secret");
        assert_eq!(spec.object_storage_for(&hashrings[1]).name, "other");
    }
}
