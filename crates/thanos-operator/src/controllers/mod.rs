//! Kubernetes controllers
//!
//! One reconcile flow per tier. Each pass fetches the subject afresh,
//! observes the cluster, builds the desired objects and applies them.

mod context;
mod query;
mod receive;
mod triggers;

pub use context::Context;
pub use query::{reconcile_query, QueryController};
pub use receive::{reconcile_receive, ReceiveController};
pub use triggers::{endpoint_slice_to_receive, service_to_queries};

use crate::apply::ApplyReport;
use crate::error::{Error, Result};
use crate::observability::TierMetrics;
use kube::runtime::events::{Event, EventType};
use kube::{Resource, ResourceExt};
use std::fmt;
use tracing::{info, warn};

/// Identity of a resource queued for reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of a successful reconcile pass.
#[derive(Debug)]
pub enum Outcome {
    /// The subject no longer exists.
    NotFound,
    /// The subject is being deleted; owned objects go with it.
    Deleting,
    Applied(ApplyReport),
}

/// Emit the deletion event for a subject carrying `finalizer`.
///
/// The finalizer is only a marker: it is never added nor removed here, so
/// deletion proceeds and garbage collection removes the owned objects.
async fn announce_deletion<K>(
    ctx: &Context,
    resource: &K,
    finalizer: &str,
    metrics: &TierMetrics,
) where
    K: Resource<DynamicType = ()>,
{
    if !resource.finalizers().iter().any(|f| f == finalizer) {
        return;
    }

    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    info!(name = %name, namespace = %namespace, "performing finalizer operations before delete");

    let event = Event {
        type_: EventType::Warning,
        reason: "Deleting".to_string(),
        note: Some(format!(
            "Custom Resource {name} is being deleted from the namespace {namespace}"
        )),
        action: "Deleting".to_string(),
        secondary: None,
    };
    if let Err(e) = ctx.client.publish_event(&resource.object_ref(&()), event).await {
        metrics.client_errors.increment(1);
        warn!(error = %e, name = %name, "failed to publish deletion event");
    }
}

/// Turn an apply report into the pass result, counting failed objects as
/// client errors.
fn settle(report: ApplyReport, metrics: &TierMetrics, component: &'static str) -> Result<Outcome> {
    if report.is_success() {
        return Ok(Outcome::Applied(report));
    }

    let failed = report.failed.len();
    metrics.client_errors.increment(failed as u64);
    Err(Error::PartialApply { failed, component })
}
