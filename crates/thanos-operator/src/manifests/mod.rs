//! Manifest builders
//!
//! Render the Kubernetes objects for each Thanos component. Builders are pure:
//! they take fully resolved options and return a [`DesiredObjectSet`]
//! without namespaces or owner references, which the applier fills in.
//!
//! [`DesiredObjectSet`]: crate::objects::DesiredObjectSet

pub mod query;
pub mod receive;

use crate::crds::{CommonFields, LogFormat, LogLevel};
use crate::labels::{
    merge_labels, COMPONENT_LABEL, INSTANCE_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE, NAME_LABEL,
    PART_OF_LABEL, PART_OF_VALUE,
};
use k8s_openapi::api::core::v1::{
    ContainerPort, EnvVar, EnvVarSource, ObjectFieldSelector, ServiceAccount, ServicePort,
};
use k8s_openapi::apimachinery::pkg::{
    apis::meta::v1::LabelSelector, util::intstr::IntOrString,
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub const DEFAULT_IMAGE: &str = "quay.io/thanos/thanos:v0.36.1";

/// Value of `app.kubernetes.io/name` on everything the operator generates.
pub const NAME_VALUE: &str = "thanos";

pub const GRPC_PORT: i32 = 10901;
pub const HTTP_PORT: i32 = 10902;

pub const GRPC_PORT_NAME: &str = "grpc";
pub const HTTP_PORT_NAME: &str = "http";

/// Options shared by every component builder.
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub labels: BTreeMap<String, String>,
    pub image: String,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl Options {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, common: &CommonFields) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            replicas: 1,
            labels: BTreeMap::new(),
            image: common
                .image
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            log_level: common.log_level,
            log_format: common.log_format,
        }
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Labels identifying the pods of this component; stable for the
    /// lifetime of the workload since they back immutable selectors.
    pub fn selector_labels(&self, component: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (NAME_LABEL.to_string(), NAME_VALUE.to_string()),
            (COMPONENT_LABEL.to_string(), component.to_string()),
            (INSTANCE_LABEL.to_string(), self.name.clone()),
            (PART_OF_LABEL.to_string(), PART_OF_VALUE.to_string()),
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        ])
    }

    /// User labels with the selector labels layered on top.
    pub fn object_labels(&self, component: &str) -> BTreeMap<String, String> {
        merge_labels(&self.labels, &self.selector_labels(component))
    }

    pub fn object_meta(&self, component: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            labels: Some(self.object_labels(component)),
            ..Default::default()
        }
    }

    pub fn label_selector(&self, component: &str) -> LabelSelector {
        LabelSelector {
            match_labels: Some(self.selector_labels(component)),
            ..Default::default()
        }
    }

    pub fn service_account(&self, component: &str) -> ServiceAccount {
        ServiceAccount {
            metadata: self.object_meta(component),
            ..Default::default()
        }
    }

    pub fn log_args(&self) -> Vec<String> {
        vec![
            format!("--log.level={}", self.log_level),
            format!("--log.format={}", self.log_format),
        ]
    }
}

pub(crate) fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub(crate) fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// `POD_NAME` resolved through the downward API.
pub(crate) fn pod_name_env() -> EnvVar {
    EnvVar {
        name: "POD_NAME".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "metadata.name".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
