//! In-memory [`ClusterClient`] for reconcile tests.

use crate::client::ClusterClient;
use crate::controllers::ReconcileKey;
use crate::crds::{ThanosQuery, ThanosReceive};
use crate::error::Result;
use crate::labels::{matches, SERVICE_NAME_LABEL};
use crate::objects::{ManagedObject, ObjectKind};
use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::DeploymentStrategy,
    core::v1::{ObjectReference, PodTemplateSpec, Service},
    discovery::v1::EndpointSlice,
};
use kube::error::ErrorResponse;
use kube::runtime::events::{Event, EventType};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type ObjectKey = (ObjectKind, String, String);

#[derive(Clone, Debug)]
pub struct RecordedEvent {
    pub object: String,
    pub type_: EventType,
    pub reason: String,
    pub note: Option<String>,
}

#[derive(Default)]
pub struct FakeCluster {
    queries: Mutex<BTreeMap<(String, String), ThanosQuery>>,
    receives: Mutex<BTreeMap<(String, String), ThanosReceive>>,
    objects: Mutex<BTreeMap<ObjectKey, ManagedObject>>,
    slices: Mutex<Vec<EndpointSlice>>,
    events: Mutex<Vec<RecordedEvent>>,
    failing_kinds: Mutex<BTreeSet<ObjectKind>>,
    fail_service_listing: Mutex<bool>,
    fail_slice_listing: Mutex<bool>,
    writes: AtomicUsize,
    revision: AtomicUsize,
}

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    })
}

/// Fill in what the API server defaults on workloads, so stored objects
/// differ from what was sent.
fn apply_server_defaults(object: &mut ManagedObject) {
    match object {
        ManagedObject::Deployment(deployment) => {
            if let Some(spec) = deployment.spec.as_mut() {
                spec.strategy.get_or_insert_with(|| DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    ..Default::default()
                });
                spec.revision_history_limit.get_or_insert(10);
                default_pod_template(&mut spec.template);
            }
        }
        ManagedObject::StatefulSet(stateful_set) => {
            if let Some(spec) = stateful_set.spec.as_mut() {
                spec.pod_management_policy
                    .get_or_insert_with(|| "OrderedReady".to_string());
                default_pod_template(&mut spec.template);
            }
        }
        ManagedObject::Service(service) => {
            if let Some(spec) = service.spec.as_mut() {
                spec.cluster_ip.get_or_insert_with(|| "10.96.0.10".to_string());
                spec.type_.get_or_insert_with(|| "ClusterIP".to_string());
                spec.session_affinity.get_or_insert_with(|| "None".to_string());
            }
        }
        ManagedObject::ServiceAccount(_) | ManagedObject::ConfigMap(_) => {}
    }
}

fn default_pod_template(template: &mut PodTemplateSpec) {
    let Some(pod) = template.spec.as_mut() else {
        return;
    };
    pod.restart_policy.get_or_insert_with(|| "Always".to_string());
    pod.dns_policy.get_or_insert_with(|| "ClusterFirst".to_string());
    pod.scheduler_name.get_or_insert_with(|| "default-scheduler".to_string());
    pod.termination_grace_period_seconds.get_or_insert(30);
    for container in &mut pod.containers {
        container
            .termination_message_path
            .get_or_insert_with(|| "/dev/termination-log".to_string());
        container
            .termination_message_policy
            .get_or_insert_with(|| "File".to_string());
        container
            .image_pull_policy
            .get_or_insert_with(|| "IfNotPresent".to_string());
    }
}

impl FakeCluster {
    pub fn add_query(&self, query: ThanosQuery) {
        let key = (query.namespace().unwrap_or_default(), query.name_any());
        self.queries.lock().unwrap().insert(key, query);
    }

    pub fn add_receive(&self, receive: ThanosReceive) {
        let key = (receive.namespace().unwrap_or_default(), receive.name_any());
        self.receives.lock().unwrap().insert(key, receive);
    }

    /// Seed an object without counting it as a write.
    pub fn add_object(&self, object: ManagedObject) {
        let key = Self::key(&object);
        self.objects.lock().unwrap().insert(key, object);
    }

    pub fn add_service(&self, service: Service) {
        self.add_object(ManagedObject::Service(service));
    }

    pub fn add_endpoint_slice(&self, slice: EndpointSlice) {
        self.slices.lock().unwrap().push(slice);
    }

    pub fn fail_writes_for(&self, kind: ObjectKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    pub fn fail_service_listing(&self) {
        *self.fail_service_listing.lock().unwrap() = true;
    }

    pub fn fail_slice_listing(&self) {
        *self.fail_slice_listing.lock().unwrap() = true;
    }

    pub fn object(&self, kind: ObjectKind, namespace: &str, name: &str) -> Option<ManagedObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn objects_of(&self, kind: ObjectKind) -> Vec<ManagedObject> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, o)| o.clone())
            .collect()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn key(object: &ManagedObject) -> ObjectKey {
        (
            object.kind(),
            object.namespace().to_string(),
            object.name().to_string(),
        )
    }

    fn check_writable(&self, kind: ObjectKind) -> Result<()> {
        if self.failing_kinds.lock().unwrap().contains(&kind) {
            return Err(api_error(500, "InternalError").into());
        }
        Ok(())
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_query(&self, key: &ReconcileKey) -> Result<Option<ThanosQuery>> {
        Ok(self
            .queries
            .lock()
            .unwrap()
            .get(&(key.namespace.clone(), key.name.clone()))
            .cloned())
    }

    async fn get_receive(&self, key: &ReconcileKey) -> Result<Option<ThanosReceive>> {
        Ok(self
            .receives
            .lock()
            .unwrap()
            .get(&(key.namespace.clone(), key.name.clone()))
            .cloned())
    }

    async fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>> {
        Ok(self.object(kind, namespace, name))
    }

    async fn create_object(&self, object: &ManagedObject) -> Result<()> {
        self.check_writable(object.kind())?;
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(self.next_revision());
        apply_server_defaults(&mut stored);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.add_object(stored);
        Ok(())
    }

    async fn replace_object(&self, object: &ManagedObject) -> Result<()> {
        self.check_writable(object.kind())?;
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(self.next_revision());
        apply_server_defaults(&mut stored);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.add_object(stored);
        Ok(())
    }

    async fn list_services(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Service>> {
        if *self.fail_service_listing.lock().unwrap() {
            return Err(api_error(503, "ServiceUnavailable").into());
        }
        let services = self
            .objects_of(ObjectKind::Service)
            .into_iter()
            .filter_map(|o| match o {
                ManagedObject::Service(svc) => Some(svc),
                _ => None,
            })
            .filter(|svc| svc.namespace().as_deref() == Some(namespace))
            .filter(|svc| matches(match_labels, svc.labels()))
            .collect();
        Ok(services)
    }

    async fn list_endpoint_slices(
        &self,
        namespace: &str,
        service_name: &str,
    ) -> Result<Vec<EndpointSlice>> {
        if *self.fail_slice_listing.lock().unwrap() {
            return Err(api_error(503, "ServiceUnavailable").into());
        }
        Ok(self
            .slices
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.namespace().as_deref() == Some(namespace))
            .filter(|s| s.labels().get(SERVICE_NAME_LABEL).map(String::as_str) == Some(service_name))
            .cloned()
            .collect())
    }

    async fn publish_event(&self, reference: &ObjectReference, event: Event) -> Result<()> {
        self.events.lock().unwrap().push(RecordedEvent {
            object: reference.name.clone().unwrap_or_default(),
            type_: event.type_,
            reason: event.reason,
            note: event.note,
        });
        Ok(())
    }
}
