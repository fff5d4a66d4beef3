//! Endpoint observation
//!
//! Reads live Store API Services and ingester EndpointSlices. Nothing here is
//! cached: every reconcile pass observes the cluster afresh.

use crate::client::ClusterClient;
use k8s_openapi::api::{core::v1::Service, discovery::v1::EndpointSlice};
use kube::ResourceExt;
use metrics::Counter;
use std::collections::{BTreeMap, BTreeSet};
use strum::Display;
use tracing::{debug, warn};

/// Name of the Service port carrying the Store API.
pub const GRPC_PORT_NAME: &str = "grpc";

/// Port ingesters accept remote-write requests on.
pub const REMOTE_WRITE_PORT: i32 = 19291;

/// How the querier treats a discovered Store API endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum EndpointType {
    Regular,
    Strict,
    Group,
    GroupStrict,
}

impl EndpointType {
    /// Label keys checked in precedence order. `Regular` is the fallback and
    /// never needs its label to be present.
    const PRECEDENCE: [EndpointType; 3] = [
        EndpointType::Strict,
        EndpointType::GroupStrict,
        EndpointType::Group,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EndpointType::Regular => "operator.thanos.io/endpoint",
            EndpointType::Strict => "operator.thanos.io/endpoint-strict",
            EndpointType::Group => "operator.thanos.io/endpoint-group",
            EndpointType::GroupStrict => "operator.thanos.io/endpoint-group-strict",
        }
    }

    /// Classify a Service by the presence of a strictness label.
    pub fn classify(labels: &BTreeMap<String, String>) -> Self {
        Self::PRECEDENCE
            .into_iter()
            .find(|t| labels.contains_key(t.label()))
            .unwrap_or(EndpointType::Regular)
    }
}

/// A Store API Service tagged with its strictness class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedEndpoint {
    pub service_name: String,
    pub namespace: String,
    /// Port named `grpc`, 0 when the Service does not declare one.
    pub port: i32,
    pub endpoint_type: EndpointType,
}

impl ClassifiedEndpoint {
    pub fn from_service(service: &Service) -> Self {
        let port = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| {
                ports
                    .iter()
                    .find(|p| p.name.as_deref() == Some(GRPC_PORT_NAME))
            })
            .map(|p| p.port)
            .unwrap_or_default();

        Self {
            service_name: service.name_any(),
            namespace: service.namespace().unwrap_or_default(),
            port,
            endpoint_type: EndpointType::classify(service.labels()),
        }
    }
}

/// List and classify the Store API Services matching `match_labels`.
///
/// Listing failures are logged, counted on `client_errors` and reported as an
/// empty set: having no endpoints is a valid state for a querier.
pub async fn observe_store_endpoints(
    client: &dyn ClusterClient,
    namespace: &str,
    match_labels: &BTreeMap<String, String>,
    client_errors: &Counter,
) -> Vec<ClassifiedEndpoint> {
    let services = match client.list_services(namespace, match_labels).await {
        Ok(services) => services,
        Err(e) => {
            client_errors.increment(1);
            warn!(error = %e, namespace = %namespace, "failed to list store API services");
            return Vec::new();
        }
    };

    let endpoints: Vec<_> = services.iter().map(ClassifiedEndpoint::from_service).collect();
    debug!(namespace = %namespace, count = endpoints.len(), "observed store API endpoints");
    endpoints
}

/// Resolve the remote-write addresses of ready ingesters behind
/// `service_name`.
///
/// Endpoints count only when ready and serving and not terminating; unset
/// conditions are treated as false. Endpoints without a hostname are skipped
/// since no stable DNS name can be formed for them. The result is sorted and
/// free of duplicates.
pub fn ready_addresses(
    slices: &[EndpointSlice],
    service_name: &str,
    namespace: &str,
) -> BTreeSet<String> {
    slices
        .iter()
        .flat_map(|slice| slice.endpoints.iter())
        .filter(|ep| !ep.addresses.is_empty())
        .filter(|ep| {
            ep.conditions.as_ref().is_some_and(|c| {
                c.ready.unwrap_or(false)
                    && c.serving.unwrap_or(false)
                    && !c.terminating.unwrap_or(false)
            })
        })
        .filter_map(|ep| ep.hostname.as_deref())
        .map(|hostname| {
            format!("{hostname}.{service_name}.{namespace}.svc.cluster.local:{REMOTE_WRITE_PORT}")
        })
        .collect()
}
