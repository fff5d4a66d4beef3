//! Hashring synthesis
//!
//! Builds the routing table consumed by Thanos Receive routers from the
//! declared hashrings and the ingester endpoints observed as ready. The
//! output is deterministic: entries are sorted by hashring name and each
//! endpoint list is sorted, so an unchanged cluster yields a byte-identical
//! artifact and no rollout churn downstream.

use crate::crds::TenantMatcher;
use crate::error::Result;
use clap::ValueEnum;
use k8s_openapi::api::core::v1::ConfigMap;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Key of the routing table inside its ConfigMap.
pub const HASHRING_CONFIG_KEY: &str = "hashrings.json";

/// Routing table with no hashrings.
pub const EMPTY_HASHRING_CONFIG: &str = "[]";

/// One row of the routing table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashringEntry {
    pub hashring: String,
    #[serde(default)]
    pub tenants: Vec<String>,
    #[serde(default)]
    pub tenant_matcher_type: TenantMatcher,
    #[serde(default)]
    pub endpoints: Vec<HashringEndpoint>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashringEndpoint {
    pub address: String,
    /// Availability zone; reserved and always empty.
    #[serde(default)]
    pub az: String,
}

impl From<String> for HashringEndpoint {
    fn from(address: String) -> Self {
        Self {
            address,
            az: String::new(),
        }
    }
}

/// What to do with a hashring that currently has no ready endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PreservationPolicy {
    /// Keep the endpoints from the previously published routing table, so
    /// tenants keep routing while their ingesters roll.
    #[default]
    #[value(name = "preserve")]
    PreservePersisted,
    /// Publish only what is live; empty hashrings are dropped.
    PreferLive,
}

/// Observed state of one declared hashring.
#[derive(Clone, Debug)]
pub struct ShardObservation {
    /// Hashring name as declared on the resource.
    pub name: String,
    pub tenants: Vec<String>,
    pub tenant_matcher: TenantMatcher,
    /// Higher wins tenant conflicts; derived from declaration order.
    pub priority: usize,
    /// Ready remote-write addresses, sorted.
    pub addresses: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashringStatus {
    Populated,
    /// No hashrings are declared. The empty routing table must still be
    /// published so routers never read a stale configuration.
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hashrings {
    pub entries: Vec<HashringEntry>,
    pub status: HashringStatus,
}

/// Priority of the hashring at `index` in a list of `total`.
pub fn priority(total: usize, index: usize) -> usize {
    total - index
}

/// Synthesize the routing table.
///
/// A tenant claimed by several published hashrings stays only on the one
/// with the highest priority. Hashrings without ready endpoints fall back to
/// their `previous` entry according to `policy` and are omitted when nothing
/// is available; omitted hashrings claim no tenants. A hashring that loses
/// every declared tenant is omitted as well.
pub fn synthesize(
    shards: &[ShardObservation],
    previous: &[HashringEntry],
    policy: PreservationPolicy,
) -> Hashrings {
    if shards.is_empty() {
        return Hashrings {
            entries: Vec::new(),
            status: HashringStatus::Empty,
        };
    }

    let mut by_priority: Vec<&ShardObservation> = shards.iter().collect();
    by_priority.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut entries = Vec::with_capacity(shards.len());

    for shard in by_priority {
        let endpoints = resolve_endpoints(shard, previous, policy);
        if endpoints.is_empty() {
            debug!(hashring = %shard.name, "hashring has no ready endpoints, omitting");
            continue;
        }

        let mut tenants: Vec<String> = Vec::with_capacity(shard.tenants.len());
        for tenant in &shard.tenants {
            if claimed.contains(tenant.as_str()) {
                warn!(
                    hashring = %shard.name,
                    tenant = %tenant,
                    "tenant already routed to a higher priority hashring, dropping"
                );
            } else if !tenants.contains(tenant) {
                tenants.push(tenant.clone());
            }
        }

        // An empty tenant list matches every tenant.
        if tenants.is_empty() && !shard.tenants.is_empty() {
            warn!(
                hashring = %shard.name,
                "every tenant is routed to a higher priority hashring, omitting"
            );
            continue;
        }
        claimed.extend(shard.tenants.iter().map(String::as_str));

        entries.push(HashringEntry {
            hashring: shard.name.clone(),
            tenants,
            tenant_matcher_type: shard.tenant_matcher,
            endpoints,
        });
    }

    entries.sort_by(|a, b| a.hashring.cmp(&b.hashring));

    Hashrings {
        entries,
        status: HashringStatus::Populated,
    }
}

/// Live endpoints of `shard`, or its previously published ones when none
/// are ready and `policy` allows it.
fn resolve_endpoints(
    shard: &ShardObservation,
    previous: &[HashringEntry],
    policy: PreservationPolicy,
) -> Vec<HashringEndpoint> {
    if !shard.addresses.is_empty() {
        return shard.addresses.iter().cloned().map(HashringEndpoint::from).collect();
    }

    match policy {
        PreservationPolicy::PreservePersisted => previous
            .iter()
            .find(|entry| entry.hashring == shard.name)
            .map(|entry| {
                debug!(hashring = %shard.name, "no ready endpoints, preserving previous entry");
                entry.endpoints.clone()
            })
            .unwrap_or_default(),
        PreservationPolicy::PreferLive => Vec::new(),
    }
}

/// Read the routing table previously published in `config_map`.
///
/// A missing key or unparsable content yields no previous entries.
pub fn previous_entries(config_map: &ConfigMap) -> Vec<HashringEntry> {
    let Some(raw) = config_map
        .data
        .as_ref()
        .and_then(|data| data.get(HASHRING_CONFIG_KEY))
    else {
        return Vec::new();
    };

    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unparsable hashring configuration");
        Vec::new()
    })
}

/// Serialize the routing table as indented JSON.
pub fn render(entries: &[HashringEntry]) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    entries.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
