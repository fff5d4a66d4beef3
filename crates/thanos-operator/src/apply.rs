//! Object applier
//!
//! Idempotent create-or-merge of a [`DesiredObjectSet`]. Every object is
//! attempted; failures are collected in the report instead of aborting. An
//! existing object stamped from the same desired content is left alone, so
//! fields defaulted by the API server never trigger a write.

use crate::client::ClusterClient;
use crate::error::{Error, Result};
use crate::objects::{DesiredObjectSet, ManagedObject, ObjectKind};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use strum::Display;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Created,
    Updated,
    Unchanged,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedObject {
    pub kind: ObjectKind,
    pub name: String,
    pub operation: Operation,
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<AppliedObject>,
    pub failed: Vec<(ObjectKind, String, Error)>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.applied
            .iter()
            .filter(|o| o.operation == operation)
            .count()
    }
}

/// Apply `objects` into `namespace`, owned by `owner`.
///
/// `owner` is `None` when the subject has no uid yet; namespaced objects are
/// then reported as failed since garbage collection could not reach them.
pub async fn apply_objects(
    client: &dyn ClusterClient,
    namespace: &str,
    owner: Option<&OwnerReference>,
    objects: DesiredObjectSet,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for mut object in objects {
        let kind = object.kind();
        let name = object.name().to_string();

        if object.is_namespaced() {
            let Some(owner) = owner else {
                warn!(kind = %kind, name = %name, "no owner reference available");
                report.failed.push((
                    kind,
                    name.clone(),
                    Error::MissingOwnerReference { kind, name },
                ));
                continue;
            };
            let meta = object.meta_mut();
            meta.namespace = Some(namespace.to_string());
            meta.owner_references = Some(vec![owner.clone()]);
        }

        if let Err(e) = object.stamp() {
            warn!(kind = %kind, name = %name, error = %e, "failed to hash desired object");
            report.failed.push((kind, name, e));
            continue;
        }

        match apply_one(client, object).await {
            Ok(operation) => {
                info!(kind = %kind, name = %name, namespace = %namespace, operation = %operation, "resource configured");
                report.applied.push(AppliedObject {
                    kind,
                    name,
                    operation,
                });
            }
            Err(e) => {
                warn!(kind = %kind, name = %name, error = %e, "failed to create or update resource");
                report.failed.push((kind, name, e));
            }
        }
    }

    report
}

async fn apply_one(client: &dyn ClusterClient, desired: ManagedObject) -> Result<Operation> {
    let existing = client
        .get_object(desired.kind(), desired.namespace(), desired.name())
        .await?;

    let Some(existing) = existing else {
        client.create_object(&desired).await?;
        return Ok(Operation::Created);
    };

    if existing.is_applied_from(&desired) {
        debug!(kind = %existing.kind(), name = %existing.name(), "resource up to date");
        return Ok(Operation::Unchanged);
    }

    let merged = desired.merge_onto(&existing);
    if merged == existing {
        debug!(kind = %merged.kind(), name = %merged.name(), "resource up to date");
        return Ok(Operation::Unchanged);
    }

    client.replace_object(&merged).await?;
    Ok(Operation::Updated)
}
