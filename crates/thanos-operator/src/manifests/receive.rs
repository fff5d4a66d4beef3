//! Thanos Receive manifests
//!
//! Ingesters run as one StatefulSet per hashring behind a headless Service
//! named like the StatefulSet, so every pod gets a stable DNS name the
//! hashring configuration can point at. The router is a stateless Deployment
//! that reads the hashring configuration from a ConfigMap.

use super::query::http_probe;
use super::{
    container_port, pod_name_env, service_port, Options, GRPC_PORT, GRPC_PORT_NAME, HTTP_PORT,
    HTTP_PORT_NAME,
};
use crate::hashring::HASHRING_CONFIG_KEY;
use crate::labels::{OWNER_LABEL, STORE_API_LABEL, STORE_API_VALUE};
use crate::objects::{DesiredObjectSet, ManagedObject};
use crate::observer::REMOTE_WRITE_PORT;
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec},
    core::v1::{
        ConfigMap, ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, PersistentVolumeClaim,
        PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, SecretKeySelector, Service,
        ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
    },
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub const INGEST_COMPONENT: &str = "thanos-receive-ingester";
pub const ROUTER_COMPONENT: &str = "thanos-receive-router";

pub const REMOTE_WRITE_PORT_NAME: &str = "remote-write";

const DATA_VOLUME: &str = "data";
const DATA_PATH: &str = "/var/thanos/receive";
const HASHRING_VOLUME: &str = "hashring-config";
const HASHRING_PATH: &str = "/var/lib/thanos-receive";
const OBJSTORE_ENV: &str = "OBJSTORE_CONFIG";

/// Name of the StatefulSet and Service backing `hashring`.
pub fn ingester_name(parent: &str, hashring: &str) -> String {
    format!("{parent}-{hashring}")
}

pub fn router_name(parent: &str) -> String {
    format!("{parent}-router")
}

#[derive(Clone, Debug, PartialEq)]
pub struct IngesterOptions {
    pub options: Options,
    /// Name of the owning ThanosReceive.
    pub owner: String,
    pub retention: String,
    pub storage_size: String,
    pub objstore_secret: SecretKeySelector,
    pub external_labels: BTreeMap<String, String>,
}

impl IngesterOptions {
    fn service_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.options.object_labels(INGEST_COMPONENT);
        labels.insert(STORE_API_LABEL.to_string(), STORE_API_VALUE.to_string());
        labels.insert(OWNER_LABEL.to_string(), self.owner.clone());
        labels
    }

    fn args(&self) -> Vec<String> {
        let options = &self.options;
        let mut args = vec![
            "receive".to_string(),
            format!("--grpc-address=0.0.0.0:{GRPC_PORT}"),
            format!("--http-address=0.0.0.0:{HTTP_PORT}"),
            format!("--remote-write.address=0.0.0.0:{REMOTE_WRITE_PORT}"),
            format!("--tsdb.path={DATA_PATH}"),
            format!("--tsdb.retention={}", self.retention),
            format!("--objstore.config=$({OBJSTORE_ENV})"),
            format!(
                "--receive.local-endpoint=$(POD_NAME).{}.{}.svc.cluster.local:{GRPC_PORT}",
                options.name, options.namespace
            ),
            r#"--label=replica="$(POD_NAME)""#.to_string(),
        ];
        args.extend(options.log_args());
        args.extend(
            self.external_labels
                .iter()
                .map(|(k, v)| format!(r#"--label={k}="{v}""#)),
        );
        args
    }
}

/// ServiceAccount, headless Service and StatefulSet for every hashring.
pub fn build_ingesters(opts: &[IngesterOptions]) -> DesiredObjectSet {
    opts.iter()
        .flat_map(|opt| {
            [
                ManagedObject::ServiceAccount(opt.options.service_account(INGEST_COMPONENT)),
                ManagedObject::Service(ingester_service(opt)),
                ManagedObject::StatefulSet(ingester_stateful_set(opt)),
            ]
        })
        .collect()
}

fn ingester_service(opt: &IngesterOptions) -> Service {
    let options = &opt.options;
    Service {
        metadata: ObjectMeta {
            name: Some(options.name.clone()),
            labels: Some(opt.service_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(options.selector_labels(INGEST_COMPONENT)),
            ports: Some(vec![
                service_port(GRPC_PORT_NAME, GRPC_PORT),
                service_port(HTTP_PORT_NAME, HTTP_PORT),
                service_port(REMOTE_WRITE_PORT_NAME, REMOTE_WRITE_PORT),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ingester_stateful_set(opt: &IngesterOptions) -> StatefulSet {
    let options = &opt.options;
    let container = Container {
        name: "thanos".to_string(),
        image: Some(options.image.clone()),
        args: Some(opt.args()),
        env: Some(vec![
            pod_name_env(),
            EnvVar {
                name: OBJSTORE_ENV.to_string(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(opt.objstore_secret.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]),
        ports: Some(vec![
            container_port(GRPC_PORT_NAME, GRPC_PORT),
            container_port(HTTP_PORT_NAME, HTTP_PORT),
            container_port(REMOTE_WRITE_PORT_NAME, REMOTE_WRITE_PORT),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_PATH.to_string(),
            ..Default::default()
        }]),
        readiness_probe: Some(http_probe("/-/ready")),
        liveness_probe: Some(http_probe("/-/healthy")),
        ..Default::default()
    };

    let claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(opt.storage_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    StatefulSet {
        metadata: options.object_meta(INGEST_COMPONENT),
        spec: Some(StatefulSetSpec {
            replicas: Some(options.replicas),
            service_name: options.name.clone(),
            selector: options.label_selector(INGEST_COMPONENT),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(options.object_labels(INGEST_COMPONENT)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(options.name.clone()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![claim]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouterOptions {
    pub options: Options,
    pub replication_factor: i32,
    /// ConfigMap holding the hashring configuration.
    pub hashring_config: String,
}

impl RouterOptions {
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "receive".to_string(),
            format!("--grpc-address=0.0.0.0:{GRPC_PORT}"),
            format!("--http-address=0.0.0.0:{HTTP_PORT}"),
            format!("--remote-write.address=0.0.0.0:{REMOTE_WRITE_PORT}"),
            format!("--receive.hashrings-file={HASHRING_PATH}/{HASHRING_CONFIG_KEY}"),
            format!("--receive.replication-factor={}", self.replication_factor),
            r#"--label=replica="$(POD_NAME)""#.to_string(),
        ];
        args.extend(self.options.log_args());
        args
    }
}

/// ServiceAccount, Service and Deployment for the router.
pub fn build_router(opts: &RouterOptions) -> DesiredObjectSet {
    let options = &opts.options;
    let container = Container {
        name: "thanos".to_string(),
        image: Some(options.image.clone()),
        args: Some(opts.args()),
        env: Some(vec![pod_name_env()]),
        ports: Some(vec![
            container_port(GRPC_PORT_NAME, GRPC_PORT),
            container_port(HTTP_PORT_NAME, HTTP_PORT),
            container_port(REMOTE_WRITE_PORT_NAME, REMOTE_WRITE_PORT),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: HASHRING_VOLUME.to_string(),
            mount_path: HASHRING_PATH.to_string(),
            ..Default::default()
        }]),
        readiness_probe: Some(http_probe("/-/ready")),
        liveness_probe: Some(http_probe("/-/healthy")),
        ..Default::default()
    };

    let service = Service {
        metadata: options.object_meta(ROUTER_COMPONENT),
        spec: Some(ServiceSpec {
            selector: Some(options.selector_labels(ROUTER_COMPONENT)),
            ports: Some(vec![
                service_port(GRPC_PORT_NAME, GRPC_PORT),
                service_port(HTTP_PORT_NAME, HTTP_PORT),
                service_port(REMOTE_WRITE_PORT_NAME, REMOTE_WRITE_PORT),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let deployment = Deployment {
        metadata: options.object_meta(ROUTER_COMPONENT),
        spec: Some(DeploymentSpec {
            replicas: Some(options.replicas),
            selector: options.label_selector(ROUTER_COMPONENT),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(options.object_labels(ROUTER_COMPONENT)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(options.name.clone()),
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: HASHRING_VOLUME.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: opts.hashring_config.clone(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    vec![
        ManagedObject::ServiceAccount(options.service_account(ROUTER_COMPONENT)),
        ManagedObject::Service(service),
        ManagedObject::Deployment(deployment),
    ]
}

/// ConfigMap publishing the rendered hashring configuration.
pub fn build_hashring_config_map(options: &Options, rendered: String) -> ManagedObject {
    ManagedObject::ConfigMap(ConfigMap {
        metadata: options.object_meta(ROUTER_COMPONENT),
        data: Some(BTreeMap::from([(HASHRING_CONFIG_KEY.to_string(), rendered)])),
        ..Default::default()
    })
}
