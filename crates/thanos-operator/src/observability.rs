//! Prometheus Metrics
//!
//! Counter handles are registered once at start-up and carried in the
//! controller context, so every reconcile pass records them into the recorder
//! that was active when [`Metrics::new`] ran. The per-resource hashring gauge
//! is labelled by resource and namespace and therefore resolved at record
//! time against the recorder installed on the calling thread.
//!
//! Metrics tracked, per tier (`query`, `receive`):
//! - `thanos_operator_<tier>_reconciliations_total`
//! - `thanos_operator_<tier>_reconciliations_failed_total`
//! - `thanos_operator_<tier>_client_errors_total`
//!
//! Receive only:
//! - `thanos_operator_receive_hashrings_configured` - gauge by resource and namespace
//! - `thanos_operator_receive_endpoint_event_reconciliations_total`

use metrics::{counter, describe_counter, describe_gauge, gauge, Counter};

pub const HASHRINGS_CONFIGURED: &str = "thanos_operator_receive_hashrings_configured";
pub const ENDPOINT_EVENT_RECONCILIATIONS: &str =
    "thanos_operator_receive_endpoint_event_reconciliations_total";

/// Counters shared by both reconcile flows.
#[derive(Clone)]
pub struct TierMetrics {
    pub reconciliations: Counter,
    pub reconciliations_failed: Counter,
    pub client_errors: Counter,
}

impl TierMetrics {
    fn register(tier: &str, kind: &str) -> Self {
        let name = |suffix: &str| format!("thanos_operator_{tier}_{suffix}");

        describe_counter!(
            name("reconciliations_total"),
            format!("Total number of reconciliations for {kind} resources")
        );
        describe_counter!(
            name("reconciliations_failed_total"),
            format!("Total number of failed reconciliations for {kind} resources")
        );
        describe_counter!(
            name("client_errors_total"),
            format!("Total number of errors encountered during kube client calls of {kind} resources")
        );

        Self {
            reconciliations: counter!(name("reconciliations_total")),
            reconciliations_failed: counter!(name("reconciliations_failed_total")),
            client_errors: counter!(name("client_errors_total")),
        }
    }
}

#[derive(Clone)]
pub struct ReceiveMetrics {
    pub tier: TierMetrics,
    pub endpoint_event_reconciliations: Counter,
}

impl ReceiveMetrics {
    /// Record the number of hashrings declared on a ThanosReceive. Resolved
    /// against the current recorder on every call.
    pub fn set_hashrings_configured(&self, resource: &str, namespace: &str, count: usize) {
        gauge!(
            HASHRINGS_CONFIGURED,
            "resource" => resource.to_string(),
            "namespace" => namespace.to_string()
        )
        .set(count as f64);
    }
}

/// Observability context injected into every controller.
#[derive(Clone)]
pub struct Metrics {
    pub query: TierMetrics,
    pub receive: ReceiveMetrics,
}

impl Metrics {
    pub fn new() -> Self {
        describe_gauge!(
            HASHRINGS_CONFIGURED,
            "Total number of configured hashrings for ThanosReceive resources"
        );
        describe_counter!(
            ENDPOINT_EVENT_RECONCILIATIONS,
            "Total number of reconciliations for ThanosReceive resources due to EndpointSlice events"
        );

        Self {
            query: TierMetrics::register("query", "ThanosQuery"),
            receive: ReceiveMetrics {
                tier: TierMetrics::register("receive", "ThanosReceive"),
                endpoint_event_reconciliations: counter!(ENDPOINT_EVENT_RECONCILIATIONS),
            },
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
