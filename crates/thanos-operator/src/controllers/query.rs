//! ThanosQuery controller

use super::{announce_deletion, service_to_queries, settle, Context, Outcome, ReconcileKey};
use crate::apply::apply_objects;
use crate::crds::ThanosQuery;
use crate::error::{Error, Result};
use crate::labels::{merge_labels, selector_string, PART_OF_LABEL, PART_OF_VALUE, STORE_API_LABEL, STORE_API_VALUE};
use crate::manifests::query::{build_querier, QuerierOptions};
use crate::manifests::Options;
use crate::objects::DesiredObjectSet;
use crate::observer::{observe_store_endpoints, ClassifiedEndpoint};
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Service, ServiceAccount},
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

const FINALIZER: &str = "monitoring.thanos.io/query-finalizer";

pub struct QueryController;

impl QueryController {
    pub async fn run(client: Client, ctx: Arc<Context>) {
        let queries: Api<ThanosQuery> = Api::all(client.clone());
        let store_services: Api<Service> = Api::all(client.clone());

        let store_api_labels = BTreeMap::from([
            (PART_OF_LABEL.to_string(), PART_OF_VALUE.to_string()),
            (STORE_API_LABEL.to_string(), STORE_API_VALUE.to_string()),
        ]);

        let controller = Controller::new(queries, Config::default());
        let store = controller.store();

        controller
            .owns(Api::<ServiceAccount>::all(client.clone()), Config::default())
            .owns(Api::<Service>::all(client.clone()), Config::default())
            .owns(Api::<Deployment>::all(client), Config::default())
            .watches(
                store_services,
                Config::default().labels(&selector_string(&store_api_labels)),
                move |service| service_to_queries(&service, &store.state()),
            )
            .shutdown_on_signal()
            .run(
                |query, ctx| async move { reconcile(query, ctx).await },
                error_policy,
                ctx,
            )
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => info!(name = %obj.name, "Reconciled ThanosQuery"),
                    Err(e) => error!(error = %e, "Reconcile error"),
                }
            })
            .await;
    }
}

async fn reconcile(query: Arc<ThanosQuery>, ctx: Arc<Context>) -> Result<Action> {
    let key = ReconcileKey::from_resource(query.as_ref());
    reconcile_query(&key, &ctx).await?;
    Ok(Action::requeue(ctx.config.requeue_after()))
}

fn error_policy(query: Arc<ThanosQuery>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(name = %query.name_any(), error = %error, "Reconcile failed");
    Action::requeue(ctx.config.error_requeue())
}

/// Drive the querier for `key` toward its declared state.
#[instrument(skip_all, fields(key = %key))]
pub async fn reconcile_query(key: &ReconcileKey, ctx: &Context) -> Result<Outcome> {
    let metrics = &ctx.metrics.query;
    metrics.reconciliations.increment(1);

    let result = sync_query(key, ctx).await;
    if result.is_err() {
        metrics.reconciliations_failed.increment(1);
    }
    result
}

async fn sync_query(key: &ReconcileKey, ctx: &Context) -> Result<Outcome> {
    let metrics = &ctx.metrics.query;

    let query = match ctx.client.get_query(key).await {
        Ok(Some(query)) => query,
        Ok(None) => {
            info!("ThanosQuery resource not found, ignoring since object must be deleted");
            return Ok(Outcome::NotFound);
        }
        Err(e) => {
            metrics.client_errors.increment(1);
            error!(error = %e, "failed to get ThanosQuery");
            return Err(e);
        }
    };

    if query.meta().deletion_timestamp.is_some() {
        debug!("ThanosQuery is marked for deletion");
        announce_deletion(ctx, &query, FINALIZER, metrics).await;
        return Ok(Outcome::Deleting);
    }

    let endpoints = observe_store_endpoints(
        ctx.client.as_ref(),
        &key.namespace,
        &query.spec.store_label_selector.match_labels,
        &metrics.client_errors,
    )
    .await;

    let objects = build_query(&query, endpoints);
    let owner = query.controller_owner_ref(&());
    let report = apply_objects(ctx.client.as_ref(), &key.namespace, owner.as_ref(), objects).await;
    settle(report, metrics, "querier")
}

fn build_query(query: &ThanosQuery, endpoints: Vec<ClassifiedEndpoint>) -> DesiredObjectSet {
    let spec = &query.spec;
    let options = Options::new(
        query.name_any(),
        query.namespace().unwrap_or_default(),
        &spec.common,
    )
    .with_replicas(spec.replicas)
    .with_labels(merge_labels(query.labels(), &spec.labels));

    build_querier(&QuerierOptions {
        replica_labels: spec.querier_replica_labels.clone(),
        ..QuerierOptions::new(options, endpoints)
    })
}
