//! Managed objects
//!
//! The closed set of object kinds the operator generates, together with the
//! per-kind merge applied when an object already exists in the cluster.
//! Merging copies the fields the operator owns from the desired object onto
//! the live one and leaves everything the platform assigns (uid,
//! resourceVersion, status, cluster IPs, immutable selectors) untouched.
//!
//! The API server defaults many fields the operator never sets, so a live
//! object never equals its desired form. Before applying, every object is
//! stamped with a hash of its desired content; a live object carrying the
//! same hash is up to date.

use crate::error::Result;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::{ConfigMap, Service, ServiceAccount},
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use strum::Display;

/// Hash of the desired content the object was last applied from.
pub const DESIRED_HASH_ANNOTATION: &str = "operator.thanos.io/desired-hash";

/// Comma separated label keys set by the operator on the last apply.
pub const MANAGED_LABELS_ANNOTATION: &str = "operator.thanos.io/managed-labels";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum ObjectKind {
    ServiceAccount,
    Service,
    Deployment,
    StatefulSet,
    ConfigMap,
}

/// A generated object ready to be applied.
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedObject {
    ServiceAccount(ServiceAccount),
    Service(Service),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    ConfigMap(ConfigMap),
}

/// Objects computed for a single reconcile pass.
pub type DesiredObjectSet = Vec<ManagedObject>;

impl ManagedObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ManagedObject::ServiceAccount(_) => ObjectKind::ServiceAccount,
            ManagedObject::Service(_) => ObjectKind::Service,
            ManagedObject::Deployment(_) => ObjectKind::Deployment,
            ManagedObject::StatefulSet(_) => ObjectKind::StatefulSet,
            ManagedObject::ConfigMap(_) => ObjectKind::ConfigMap,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ManagedObject::ServiceAccount(o) => &o.metadata,
            ManagedObject::Service(o) => &o.metadata,
            ManagedObject::Deployment(o) => &o.metadata,
            ManagedObject::StatefulSet(o) => &o.metadata,
            ManagedObject::ConfigMap(o) => &o.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ManagedObject::ServiceAccount(o) => &mut o.metadata,
            ManagedObject::Service(o) => &mut o.metadata,
            ManagedObject::Deployment(o) => &mut o.metadata,
            ManagedObject::StatefulSet(o) => &mut o.metadata,
            ManagedObject::ConfigMap(o) => &mut o.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    /// Record the managed label keys and the hash of the desired content.
    /// Must run after namespace and owner references are set.
    pub fn stamp(&mut self) -> Result<()> {
        let managed = self
            .meta()
            .labels
            .as_ref()
            .map(|labels| labels.keys().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default();

        let annotations = self.meta_mut().annotations.get_or_insert_with(BTreeMap::new);
        annotations.insert(MANAGED_LABELS_ANNOTATION.to_string(), managed);
        annotations.remove(DESIRED_HASH_ANNOTATION);

        let hash = blake3::hash(&self.to_json()?).to_hex().to_string();
        self.meta_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(DESIRED_HASH_ANNOTATION.to_string(), hash);
        Ok(())
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            ManagedObject::ServiceAccount(o) => serde_json::to_vec(o)?,
            ManagedObject::Service(o) => serde_json::to_vec(o)?,
            ManagedObject::Deployment(o) => serde_json::to_vec(o)?,
            ManagedObject::StatefulSet(o) => serde_json::to_vec(o)?,
            ManagedObject::ConfigMap(o) => serde_json::to_vec(o)?,
        };
        Ok(bytes)
    }

    /// Whether the live object was last applied from identical desired
    /// content.
    pub fn is_applied_from(&self, desired: &ManagedObject) -> bool {
        desired
            .annotation(DESIRED_HASH_ANNOTATION)
            .is_some_and(|hash| self.annotation(DESIRED_HASH_ANNOTATION) == Some(hash))
    }

    /// Whether the object lives in a namespace and can therefore be owned by
    /// a namespaced custom resource.
    pub fn is_namespaced(&self) -> bool {
        match self.kind() {
            ObjectKind::ServiceAccount
            | ObjectKind::Service
            | ObjectKind::Deployment
            | ObjectKind::StatefulSet
            | ObjectKind::ConfigMap => true,
        }
    }

    /// Merge this desired object onto `existing`, returning the object that
    /// should be stored. Kinds always match when called by the applier; on a
    /// mismatch the desired object is returned as is.
    pub fn merge_onto(self, existing: &ManagedObject) -> ManagedObject {
        match (self, existing) {
            (ManagedObject::ServiceAccount(desired), ManagedObject::ServiceAccount(existing)) => {
                let mut merged = existing.clone();
                merge_meta(&mut merged.metadata, &desired.metadata);
                ManagedObject::ServiceAccount(merged)
            }
            (ManagedObject::Service(desired), ManagedObject::Service(existing)) => {
                ManagedObject::Service(merge_service(existing, desired))
            }
            (ManagedObject::Deployment(desired), ManagedObject::Deployment(existing)) => {
                ManagedObject::Deployment(merge_deployment(existing, desired))
            }
            (ManagedObject::StatefulSet(desired), ManagedObject::StatefulSet(existing)) => {
                ManagedObject::StatefulSet(merge_stateful_set(existing, desired))
            }
            (ManagedObject::ConfigMap(desired), ManagedObject::ConfigMap(existing)) => {
                let mut merged = existing.clone();
                merge_meta(&mut merged.metadata, &desired.metadata);
                merged.data = desired.data;
                merged.binary_data = desired.binary_data;
                ManagedObject::ConfigMap(merged)
            }
            (desired, _) => desired,
        }
    }
}

fn merge_meta(existing: &mut ObjectMeta, desired: &ObjectMeta) {
    drop_stale_labels(existing, desired);
    merge_map(&mut existing.labels, &desired.labels);
    merge_map(&mut existing.annotations, &desired.annotations);
    if desired.owner_references.is_some() {
        existing.owner_references = desired.owner_references.clone();
    }
}

/// Remove labels the operator set previously but no longer wants. Labels
/// added by anyone else are left alone.
fn drop_stale_labels(existing: &mut ObjectMeta, desired: &ObjectMeta) {
    let Some(previous) = existing
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(MANAGED_LABELS_ANNOTATION))
        .cloned()
    else {
        return;
    };
    let Some(labels) = existing.labels.as_mut() else {
        return;
    };

    for key in previous.split(',').filter(|key| !key.is_empty()) {
        let still_wanted = desired
            .labels
            .as_ref()
            .is_some_and(|wanted| wanted.contains_key(key));
        if !still_wanted {
            labels.remove(key);
        }
    }
}

fn merge_map(
    existing: &mut Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) {
    let Some(desired) = desired else {
        return;
    };
    let target = existing.get_or_insert_with(BTreeMap::new);
    target.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
}

fn merge_service(existing: &Service, desired: Service) -> Service {
    let mut merged = existing.clone();
    merge_meta(&mut merged.metadata, &desired.metadata);

    match (merged.spec.as_mut(), desired.spec) {
        (Some(spec), Some(desired)) => {
            // clusterIP and clusterIPs are assigned by the platform
            spec.ports = desired.ports;
            spec.selector = desired.selector;
            if desired.type_.is_some() {
                spec.type_ = desired.type_;
            }
        }
        (None, desired) => merged.spec = desired,
        (Some(_), None) => {}
    }
    merged
}

fn merge_deployment(existing: &Deployment, desired: Deployment) -> Deployment {
    let mut merged = existing.clone();
    merge_meta(&mut merged.metadata, &desired.metadata);

    match (merged.spec.as_mut(), desired.spec) {
        (Some(spec), Some(desired)) => {
            // selector is immutable once created
            spec.replicas = desired.replicas;
            spec.template = desired.template;
            if desired.strategy.is_some() {
                spec.strategy = desired.strategy;
            }
        }
        (None, desired) => merged.spec = desired,
        (Some(_), None) => {}
    }
    merged
}

fn merge_stateful_set(existing: &StatefulSet, desired: StatefulSet) -> StatefulSet {
    let mut merged = existing.clone();
    merge_meta(&mut merged.metadata, &desired.metadata);

    match (merged.spec.as_mut(), desired.spec) {
        (Some(spec), Some(desired)) => {
            // selector, serviceName and volumeClaimTemplates are immutable
            spec.replicas = desired.replicas;
            spec.template = desired.template;
        }
        (None, desired) => merged.spec = desired,
        (Some(_), None) => {}
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::ServiceSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn meta(name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ns".to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_service_merge_preserves_cluster_ip() {
        let mut live = Service {
            metadata: meta("svc", &[("a", "1")]),
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.0.0.12".to_string()),
                selector: Some(BTreeMap::from([("app".to_string(), "old".to_string())])),
                ..Default::default()
            }),
            ..Default::default()
        };
        live.metadata.uid = Some("uid-1".to_string());

        let desired = Service {
            metadata: meta("svc", &[("b", "2")]),
            spec: Some(ServiceSpec {
                selector: Some(BTreeMap::from([("app".to_string(), "new".to_string())])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = ManagedObject::Service(desired).merge_onto(&ManagedObject::Service(live));
        let ManagedObject::Service(merged) = merged else {
            panic!("expected a service");
        };
        let spec = merged.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.12"));
        assert_eq!(spec.selector.unwrap()["app"], "new");
        assert_eq!(merged.metadata.uid.as_deref(), Some("uid-1"));
        let labels = merged.metadata.labels.unwrap();
        assert_eq!(labels["a"], "1");
        assert_eq!(labels["b"], "2");
    }

    #[test]
    fn test_deployment_merge_keeps_selector() {
        let selector = |v: &str| LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), v.to_string())])),
            ..Default::default()
        };
        let live = Deployment {
            metadata: meta("query", &[]),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: selector("original"),
                ..Default::default()
            }),
            ..Default::default()
        };
        let desired = Deployment {
            metadata: meta("query", &[]),
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                selector: selector("changed"),
                ..Default::default()
            }),
            ..Default::default()
        };

        let ManagedObject::Deployment(merged) =
            ManagedObject::Deployment(desired).merge_onto(&ManagedObject::Deployment(live))
        else {
            panic!("expected a deployment");
        };
        let spec = merged.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.selector, selector("original"));
    }

    #[test]
    fn test_stamp_hash_tracks_desired_content() {
        let config_map = |value: &str| {
            let mut object = ManagedObject::ConfigMap(ConfigMap {
                metadata: meta("cfg", &[("a", "1")]),
                data: Some(BTreeMap::from([("k".to_string(), value.to_string())])),
                ..Default::default()
            });
            object.stamp().unwrap();
            object
        };

        let first = config_map("v");
        let mut restamped = first.clone();
        restamped.stamp().unwrap();
        assert_eq!(
            first.annotation(DESIRED_HASH_ANNOTATION),
            restamped.annotation(DESIRED_HASH_ANNOTATION)
        );
        assert_eq!(first.annotation(MANAGED_LABELS_ANNOTATION), Some("a"));
        assert!(first.is_applied_from(&config_map("v")));
        assert!(!first.is_applied_from(&config_map("changed")));
    }

    #[test]
    fn test_merge_drops_labels_no_longer_managed() {
        let mut live = ServiceAccount {
            metadata: meta("sa", &[("team", "a"), ("keep", "1"), ("foreign", "x")]),
            ..Default::default()
        };
        live.metadata.annotations = Some(BTreeMap::from([(
            MANAGED_LABELS_ANNOTATION.to_string(),
            "keep,team".to_string(),
        )]));

        let mut desired = ManagedObject::ServiceAccount(ServiceAccount {
            metadata: meta("sa", &[("keep", "2")]),
            ..Default::default()
        });
        desired.stamp().unwrap();

        let merged = desired.merge_onto(&ManagedObject::ServiceAccount(live));
        let labels = merged.meta().labels.clone().unwrap();
        assert_eq!(
            labels,
            BTreeMap::from([
                ("foreign".to_string(), "x".to_string()),
                ("keep".to_string(), "2".to_string()),
            ])
        );
        assert_eq!(merged.annotation(MANAGED_LABELS_ANNOTATION), Some("keep"));
    }

    #[test]
    fn test_merge_identical_is_noop() {
        let cm = ConfigMap {
            metadata: meta("cfg", &[("a", "1")]),
            data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
            ..Default::default()
        };
        let existing = ManagedObject::ConfigMap(cm.clone());
        let merged = ManagedObject::ConfigMap(cm).merge_onto(&existing);
        assert_eq!(merged, existing);
    }
}
