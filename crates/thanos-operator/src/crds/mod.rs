//! Custom Resource Definitions
//!
//! CRDs for the Thanos components managed by the operator.

pub mod common;
pub mod query;
pub mod receive;

pub use common::{CommonFields, LogFormat, LogLevel, ObjectStorageConfig};
pub use query::{StoreLabelSelector, ThanosQuery, ThanosQuerySpec};
pub use receive::{
    HashringSpec, IngesterSpec, RouterSpec, TenantMatcher, ThanosReceive, ThanosReceiveSpec,
};
