//! Thanos Operator Library
//!
//! Kubernetes operator for Thanos. Reconciles `ThanosQuery` resources into
//! queriers federating the Store API Services they select, and
//! `ThanosReceive` resources into sharded ingesters, a router and the
//! hashring configuration that routes tenants across them.

pub mod apply;
pub mod client;
pub mod config;
pub mod controllers;
pub mod crds;
pub mod error;
pub mod federation;
pub mod hashring;
pub mod labels;
pub mod manifests;
pub mod objects;
pub mod observability;
pub mod observer;

#[cfg(test)]
mod testing;

pub use crds::{ThanosQuery, ThanosQuerySpec, ThanosReceive, ThanosReceiveSpec};
pub use error::{Error, Result};
