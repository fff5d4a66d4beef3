//! ThanosReceive controller
//!
//! Besides its owned objects, the controller watches the EndpointSlices of
//! ingester Services: ingesters turning ready or unready change the
//! hashring configuration the router reads.

use super::{announce_deletion, endpoint_slice_to_receive, settle, Context, Outcome, ReconcileKey};
use crate::apply::apply_objects;
use crate::crds::ThanosReceive;
use crate::error::{Error, Result};
use crate::hashring::{
    previous_entries, priority, render, synthesize, HashringStatus, Hashrings, ShardObservation,
};
use crate::labels::{merge_labels, COMPONENT_LABEL};
use crate::manifests::receive::{
    build_hashring_config_map, build_ingesters, build_router, ingester_name, router_name,
    IngesterOptions, RouterOptions, INGEST_COMPONENT,
};
use crate::manifests::Options;
use crate::objects::{DesiredObjectSet, ManagedObject, ObjectKind};
use crate::observer::ready_addresses;
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::{ConfigMap, Service, ServiceAccount},
    discovery::v1::EndpointSlice,
};
use kube::{
    api::Api,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Client, Resource, ResourceExt,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

const FINALIZER: &str = "monitoring.thanos.io/receive-finalizer";

pub struct ReceiveController;

impl ReceiveController {
    pub async fn run(client: Client, ctx: Arc<Context>) {
        let receives: Api<ThanosReceive> = Api::all(client.clone());
        let slices: Api<EndpointSlice> = Api::all(client.clone());
        let endpoint_events = ctx.metrics.receive.endpoint_event_reconciliations.clone();

        Controller::new(receives, Config::default())
            .owns(Api::<ConfigMap>::all(client.clone()), Config::default())
            .owns(Api::<ServiceAccount>::all(client.clone()), Config::default())
            .owns(Api::<Service>::all(client.clone()), Config::default())
            .owns(Api::<Deployment>::all(client.clone()), Config::default())
            .owns(Api::<StatefulSet>::all(client), Config::default())
            .watches(
                slices,
                Config::default().labels(&format!("{COMPONENT_LABEL}={INGEST_COMPONENT}")),
                move |slice| {
                    let target = endpoint_slice_to_receive(&slice);
                    if target.is_some() {
                        endpoint_events.increment(1);
                    }
                    target
                },
            )
            .shutdown_on_signal()
            .run(
                |receive, ctx| async move { reconcile(receive, ctx).await },
                error_policy,
                ctx,
            )
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => info!(name = %obj.name, "Reconciled ThanosReceive"),
                    Err(e) => error!(error = %e, "Reconcile error"),
                }
            })
            .await;
    }
}

async fn reconcile(receive: Arc<ThanosReceive>, ctx: Arc<Context>) -> Result<Action> {
    let key = ReconcileKey::from_resource(receive.as_ref());
    reconcile_receive(&key, &ctx).await?;
    Ok(Action::requeue(ctx.config.requeue_after()))
}

fn error_policy(receive: Arc<ThanosReceive>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(name = %receive.name_any(), error = %error, "Reconcile failed");
    Action::requeue(ctx.config.error_requeue())
}

/// Drive the ingesters, hashring configuration and router for `key`.
#[instrument(skip_all, fields(key = %key))]
pub async fn reconcile_receive(key: &ReconcileKey, ctx: &Context) -> Result<Outcome> {
    let metrics = &ctx.metrics.receive.tier;
    metrics.reconciliations.increment(1);

    let result = sync_receive(key, ctx).await;
    if result.is_err() {
        metrics.reconciliations_failed.increment(1);
    }
    result
}

async fn sync_receive(key: &ReconcileKey, ctx: &Context) -> Result<Outcome> {
    let metrics = &ctx.metrics.receive.tier;

    let receive = match ctx.client.get_receive(key).await {
        Ok(Some(receive)) => receive,
        Ok(None) => {
            info!("ThanosReceive resource not found, ignoring since object must be deleted");
            return Ok(Outcome::NotFound);
        }
        Err(e) => {
            metrics.client_errors.increment(1);
            error!(error = %e, "failed to get ThanosReceive");
            return Err(e);
        }
    };

    if receive.meta().deletion_timestamp.is_some() {
        debug!("ThanosReceive is marked for deletion");
        announce_deletion(ctx, &receive, FINALIZER, metrics).await;
        return Ok(Outcome::Deleting);
    }

    let base_labels = merge_labels(receive.labels(), &receive.spec.labels);
    let mut objects = build_ingester_objects(&receive, &base_labels);

    let hashrings = observe_hashrings(&receive, key, ctx).await?;
    if hashrings.status == HashringStatus::Empty {
        debug!("no hashrings declared, publishing empty configuration");
    }

    let config_options = Options::new(&key.name, &key.namespace, &receive.spec.common)
        .with_labels(base_labels.clone());
    objects.push(build_hashring_config_map(
        &config_options,
        render(&hashrings.entries)?,
    ));

    if hashrings.entries.is_empty() {
        debug!("no hashring has ready endpoints yet, router not configured");
    } else {
        objects.extend(build_router_objects(&receive, key, &base_labels));
    }

    let owner = receive.controller_owner_ref(&());
    let report = apply_objects(ctx.client.as_ref(), &key.namespace, owner.as_ref(), objects).await;
    settle(report, metrics, "hashrings")
}

fn build_ingester_objects(
    receive: &ThanosReceive,
    base_labels: &BTreeMap<String, String>,
) -> DesiredObjectSet {
    let spec = &receive.spec;
    let parent = receive.name_any();
    let namespace = receive.namespace().unwrap_or_default();

    let opts: Vec<IngesterOptions> = spec
        .ingester
        .hashrings
        .iter()
        .map(|hashring| IngesterOptions {
            options: Options::new(ingester_name(&parent, &hashring.name), &namespace, &spec.common)
                .with_replicas(hashring.replicas)
                .with_labels(merge_labels(base_labels, &hashring.labels)),
            owner: parent.clone(),
            retention: hashring.retention.clone(),
            storage_size: hashring.storage_size.clone(),
            objstore_secret: spec.object_storage_for(hashring).to_secret_key_selector(),
            external_labels: hashring.external_labels.clone(),
        })
        .collect();

    build_ingesters(&opts)
}

fn build_router_objects(
    receive: &ThanosReceive,
    key: &ReconcileKey,
    base_labels: &BTreeMap<String, String>,
) -> DesiredObjectSet {
    let router = &receive.spec.router;
    build_router(&RouterOptions {
        options: Options::new(router_name(&key.name), &key.namespace, &receive.spec.common)
            .with_replicas(router.replicas)
            .with_labels(merge_labels(base_labels, &router.labels)),
        replication_factor: router.replication_factor,
        hashring_config: key.name.clone(),
    })
}

/// Observe every declared hashring and synthesize the routing table.
async fn observe_hashrings(
    receive: &ThanosReceive,
    key: &ReconcileKey,
    ctx: &Context,
) -> Result<Hashrings> {
    let metrics = &ctx.metrics.receive;

    let previous = match ctx
        .client
        .get_object(ObjectKind::ConfigMap, &key.namespace, &key.name)
        .await
    {
        Ok(Some(ManagedObject::ConfigMap(config_map))) => previous_entries(&config_map),
        Ok(_) => Vec::new(),
        Err(e) => {
            metrics.tier.client_errors.increment(1);
            return Err(e);
        }
    };

    let declared = &receive.spec.ingester.hashrings;
    let total = declared.len();
    let mut shards = Vec::with_capacity(total);

    for (index, hashring) in declared.iter().enumerate() {
        let service = ingester_name(&key.name, &hashring.name);
        let slices = ctx
            .client
            .list_endpoint_slices(&key.namespace, &service)
            .await
            .map_err(|e| {
                metrics.tier.client_errors.increment(1);
                Error::EndpointListing {
                    service: service.clone(),
                    source: Box::new(e),
                }
            })?;

        shards.push(ShardObservation {
            name: hashring.name.clone(),
            tenants: hashring.tenants.clone(),
            tenant_matcher: hashring.tenant_matcher_type,
            priority: priority(total, index),
            addresses: ready_addresses(&slices, &service, &key.namespace),
        });
    }

    metrics.set_hashrings_configured(&key.name, &key.namespace, total);
    Ok(synthesize(&shards, &previous, ctx.config.hashring_policy))
}
