//! Query federation topology
//!
//! Turns classified Store API endpoints into the `--endpoint*` flags a
//! querier uses for DNS SRV discovery.

use crate::observer::{ClassifiedEndpoint, EndpointType};

impl EndpointType {
    /// Querier flag selecting this strictness class.
    pub fn flag(self) -> &'static str {
        match self {
            EndpointType::Regular => "--endpoint",
            EndpointType::Strict => "--endpoint-strict",
            EndpointType::Group => "--endpoint-group",
            EndpointType::GroupStrict => "--endpoint-group-strict",
        }
    }
}

/// DNS SRV address resolving the `grpc` port of a Service.
pub fn dnssrv_address(service_name: &str, namespace: &str) -> String {
    format!("dnssrv+_grpc._tcp.{service_name}.{namespace}.svc.cluster.local")
}

/// One discovery argument per endpoint, in observation order.
pub fn endpoint_args(endpoints: &[ClassifiedEndpoint]) -> Vec<String> {
    endpoints
        .iter()
        .map(|ep| {
            format!(
                "{}={}",
                ep.endpoint_type.flag(),
                dnssrv_address(&ep.service_name, &ep.namespace)
            )
        })
        .collect()
}
