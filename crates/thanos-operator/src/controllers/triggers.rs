//! Enqueue mapping for secondary watches.
//!
//! Pure functions deciding which subjects a change to a related object
//! should requeue.

use crate::crds::{ThanosQuery, ThanosReceive};
use crate::labels::{matches, OWNER_LABEL, STORE_API_LABEL, STORE_API_VALUE};
use k8s_openapi::api::{core::v1::Service, discovery::v1::EndpointSlice};
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use std::sync::Arc;

/// Queries in the Service's namespace whose store selector matches it.
pub fn service_to_queries(
    service: &Service,
    queries: &[Arc<ThanosQuery>],
) -> Vec<ObjectRef<ThanosQuery>> {
    let labels = service.labels();
    if labels.get(STORE_API_LABEL).map(String::as_str) != Some(STORE_API_VALUE) {
        return Vec::new();
    }

    let namespace = service.namespace();
    queries
        .iter()
        .filter(|query| query.namespace() == namespace)
        .filter(|query| matches(&query.spec.store_label_selector.match_labels, labels))
        .map(|query| ObjectRef::from_obj(query.as_ref()))
        .collect()
}

/// The ThanosReceive owning the ingester Service behind `slice`.
///
/// A slice qualifies when it has a single Service owner, carries the owner
/// label mirrored from that Service, and the Service is named after the
/// owner.
pub fn endpoint_slice_to_receive(slice: &EndpointSlice) -> Option<ObjectRef<ThanosReceive>> {
    let owner = slice.labels().get(OWNER_LABEL)?;
    let [service] = slice.owner_references() else {
        return None;
    };
    if service.kind != "Service" || !service.name.starts_with(&format!("{owner}-")) {
        return None;
    }
    let namespace = slice.namespace()?;
    Some(ObjectRef::new(owner).within(&namespace))
}
