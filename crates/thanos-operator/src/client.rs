//! Cluster access
//!
//! [`ClusterClient`] is the seam between the reconcile logic and the API
//! server. [`KubeClient`] implements it on top of `kube::Client`.

use crate::controllers::ReconcileKey;
use crate::crds::{ThanosQuery, ThanosReceive};
use crate::error::Result;
use crate::labels::{selector_string, SERVICE_NAME_LABEL};
use crate::objects::{ManagedObject, ObjectKind};
use async_trait::async_trait;
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, StatefulSet},
        core::v1::{ConfigMap, ObjectReference, Service, ServiceAccount},
        discovery::v1::EndpointSlice,
    },
    NamespaceResourceScope,
};
use kube::{
    api::{Api, ListParams, PostParams},
    runtime::events::{Event, Recorder, Reporter},
    Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_query(&self, key: &ReconcileKey) -> Result<Option<ThanosQuery>>;

    async fn get_receive(&self, key: &ReconcileKey) -> Result<Option<ThanosReceive>>;

    /// Fetch a managed object, `None` when it does not exist.
    async fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>>;

    async fn create_object(&self, object: &ManagedObject) -> Result<()>;

    /// Replace an existing object. The object carries the live
    /// resourceVersion, so concurrent writers fail with a conflict.
    async fn replace_object(&self, object: &ManagedObject) -> Result<()>;

    async fn list_services(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Service>>;

    /// EndpointSlices the platform maintains for the Service `service_name`.
    async fn list_endpoint_slices(
        &self,
        namespace: &str,
        service_name: &str,
    ) -> Result<Vec<EndpointSlice>>;

    async fn publish_event(&self, reference: &ObjectReference, event: Event) -> Result<()>;
}

/// [`ClusterClient`] backed by the Kubernetes API.
pub struct KubeClient {
    client: Client,
    recorder: Recorder,
    field_manager: String,
}

impl KubeClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        let field_manager = field_manager.into();
        let reporter = Reporter {
            controller: field_manager.clone(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            field_manager,
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    async fn get_namespaced<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_namespaced<K>(&self, object: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let namespace = object.meta().namespace.as_deref().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.create(&self.post_params(), object).await?;
        Ok(())
    }

    async fn replace_namespaced<K>(&self, object: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let meta = object.meta();
        let namespace = meta.namespace.as_deref().unwrap_or_default();
        let name = meta.name.as_deref().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &self.post_params(), object).await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn get_query(&self, key: &ReconcileKey) -> Result<Option<ThanosQuery>> {
        self.get_namespaced(&key.namespace, &key.name).await
    }

    async fn get_receive(&self, key: &ReconcileKey) -> Result<Option<ThanosReceive>> {
        self.get_namespaced(&key.namespace, &key.name).await
    }

    async fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>> {
        let object = match kind {
            ObjectKind::ServiceAccount => self
                .get_namespaced::<ServiceAccount>(namespace, name)
                .await?
                .map(ManagedObject::ServiceAccount),
            ObjectKind::Service => self
                .get_namespaced::<Service>(namespace, name)
                .await?
                .map(ManagedObject::Service),
            ObjectKind::Deployment => self
                .get_namespaced::<Deployment>(namespace, name)
                .await?
                .map(ManagedObject::Deployment),
            ObjectKind::StatefulSet => self
                .get_namespaced::<StatefulSet>(namespace, name)
                .await?
                .map(ManagedObject::StatefulSet),
            ObjectKind::ConfigMap => self
                .get_namespaced::<ConfigMap>(namespace, name)
                .await?
                .map(ManagedObject::ConfigMap),
        };
        Ok(object)
    }

    async fn create_object(&self, object: &ManagedObject) -> Result<()> {
        match object {
            ManagedObject::ServiceAccount(o) => self.create_namespaced(o).await,
            ManagedObject::Service(o) => self.create_namespaced(o).await,
            ManagedObject::Deployment(o) => self.create_namespaced(o).await,
            ManagedObject::StatefulSet(o) => self.create_namespaced(o).await,
            ManagedObject::ConfigMap(o) => self.create_namespaced(o).await,
        }
    }

    async fn replace_object(&self, object: &ManagedObject) -> Result<()> {
        match object {
            ManagedObject::ServiceAccount(o) => self.replace_namespaced(o).await,
            ManagedObject::Service(o) => self.replace_namespaced(o).await,
            ManagedObject::Deployment(o) => self.replace_namespaced(o).await,
            ManagedObject::StatefulSet(o) => self.replace_namespaced(o).await,
            ManagedObject::ConfigMap(o) => self.replace_namespaced(o).await,
        }
    }

    async fn list_services(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&selector_string(match_labels));
        Ok(api.list(&params).await?.items)
    }

    async fn list_endpoint_slices(
        &self,
        namespace: &str,
        service_name: &str,
    ) -> Result<Vec<EndpointSlice>> {
        let api: Api<EndpointSlice> = Api::namespaced(self.client.clone(), namespace);
        let params =
            ListParams::default().labels(&format!("{SERVICE_NAME_LABEL}={service_name}"));
        Ok(api.list(&params).await?.items)
    }

    async fn publish_event(&self, reference: &ObjectReference, event: Event) -> Result<()> {
        self.recorder.publish(&event, reference).await?;
        Ok(())
    }
}
