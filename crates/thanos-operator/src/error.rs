//! Error types shared by the reconcile flows.

use crate::objects::ObjectKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to create or update {failed} resources for the {component}")]
    PartialApply {
        failed: usize,
        component: &'static str,
    },

    #[error("cannot set an owner reference on {kind} {name}: owner has no uid")]
    MissingOwnerReference { kind: ObjectKind, name: String },

    #[error("failed to list endpoint slices for service {service}: {source}")]
    EndpointListing {
        service: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
