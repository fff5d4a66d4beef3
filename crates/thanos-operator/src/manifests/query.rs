//! Thanos Query manifests

use super::{container_port, service_port, Options, GRPC_PORT, GRPC_PORT_NAME, HTTP_PORT, HTTP_PORT_NAME};
use crate::federation::endpoint_args;
use crate::objects::{DesiredObjectSet, ManagedObject};
use crate::observer::ClassifiedEndpoint;
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec},
    core::v1::{
        Container, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, Service, ServiceSpec,
    },
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

pub const QUERY_COMPONENT: &str = "thanos-query";

#[derive(Clone, Debug, PartialEq)]
pub struct QuerierOptions {
    pub options: Options,
    pub replica_labels: Vec<String>,
    pub timeout: String,
    pub lookback_delta: String,
    pub max_concurrent: i32,
    pub endpoints: Vec<ClassifiedEndpoint>,
}

impl QuerierOptions {
    pub fn new(options: Options, endpoints: Vec<ClassifiedEndpoint>) -> Self {
        Self {
            options,
            replica_labels: Vec::new(),
            timeout: "15m".to_string(),
            lookback_delta: "5m".to_string(),
            max_concurrent: 20,
            endpoints,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "query".to_string(),
            format!("--grpc-address=0.0.0.0:{GRPC_PORT}"),
            format!("--http-address=0.0.0.0:{HTTP_PORT}"),
        ];
        args.extend(self.options.log_args());
        args.push(format!("--query.timeout={}", self.timeout));
        args.push(format!("--query.lookback-delta={}", self.lookback_delta));
        args.push(format!("--query.max-concurrent={}", self.max_concurrent));
        args.push("--query.auto-downsampling".to_string());
        args.extend(
            self.replica_labels
                .iter()
                .map(|label| format!("--query.replica-label={label}")),
        );
        args.extend(endpoint_args(&self.endpoints));
        args
    }
}

/// ServiceAccount, Service and Deployment for a querier.
pub fn build_querier(opts: &QuerierOptions) -> DesiredObjectSet {
    vec![
        ManagedObject::ServiceAccount(opts.options.service_account(QUERY_COMPONENT)),
        ManagedObject::Service(querier_service(&opts.options)),
        ManagedObject::Deployment(querier_deployment(opts)),
    ]
}

fn querier_service(opts: &Options) -> Service {
    Service {
        metadata: opts.object_meta(QUERY_COMPONENT),
        spec: Some(ServiceSpec {
            selector: Some(opts.selector_labels(QUERY_COMPONENT)),
            ports: Some(vec![
                service_port(GRPC_PORT_NAME, GRPC_PORT),
                service_port(HTTP_PORT_NAME, HTTP_PORT),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn querier_deployment(opts: &QuerierOptions) -> Deployment {
    let options = &opts.options;
    let container = Container {
        name: "thanos".to_string(),
        image: Some(options.image.clone()),
        args: Some(opts.args()),
        ports: Some(vec![
            container_port(GRPC_PORT_NAME, GRPC_PORT),
            container_port(HTTP_PORT_NAME, HTTP_PORT),
        ]),
        readiness_probe: Some(http_probe("/-/ready")),
        liveness_probe: Some(http_probe("/-/healthy")),
        ..Default::default()
    };

    Deployment {
        metadata: options.object_meta(QUERY_COMPONENT),
        spec: Some(DeploymentSpec {
            replicas: Some(options.replicas),
            selector: options.label_selector(QUERY_COMPONENT),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(options.object_labels(QUERY_COMPONENT)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(options.name.clone()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String(HTTP_PORT_NAME.to_string()),
            ..Default::default()
        }),
        period_seconds: Some(5),
        failure_threshold: Some(8),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::CommonFields;
    use crate::objects::ObjectKind;
    use crate::observer::EndpointType;

    fn querier_args(objects: &DesiredObjectSet) -> Vec<String> {
        objects
            .iter()
            .find_map(|o| match o {
                ManagedObject::Deployment(d) => d.spec.as_ref(),
                _ => None,
            })
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|pod| pod.containers[0].args.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_build_querier_objects() {
        let options = Options::new("thanos-query", "ns", &CommonFields::default()).with_replicas(2);
        let objects = build_querier(&QuerierOptions::new(options, Vec::new()));

        let kinds: Vec<_> = objects.iter().map(ManagedObject::kind).collect();
        assert_eq!(
            kinds,
            vec![ObjectKind::ServiceAccount, ObjectKind::Service, ObjectKind::Deployment]
        );
        assert!(objects.iter().all(|o| o.name() == "thanos-query"));

        let ManagedObject::Deployment(deployment) = &objects[2] else {
            panic!("expected a deployment");
        };
        assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(2));
    }

    #[test]
    fn test_querier_args_include_endpoints_and_replica_labels() {
        let options = Options::new("q", "ns", &CommonFields::default());
        let mut opts = QuerierOptions::new(
            options,
            vec![ClassifiedEndpoint {
                service_name: "my-store".to_string(),
                namespace: "ns".to_string(),
                port: 10901,
                endpoint_type: EndpointType::Strict,
            }],
        );
        opts.replica_labels = vec!["replica".to_string()];

        let args = querier_args(&build_querier(&opts));
        assert_eq!(args[0], "query");
        assert!(args.contains(&"--query.replica-label=replica".to_string()));
        assert!(args.contains(&"--query.timeout=15m".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("--endpoint-strict=dnssrv+_grpc._tcp.my-store.ns.svc.cluster.local")
        );
    }
}
