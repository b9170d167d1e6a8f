//! # Object Store
//!
//! The engine's view of the cluster API: get / list / create / update / delete of
//! managed resources, plus the AppInstance / AppTemplate reads and status writes the
//! reconcilers need.
//!
//! "Not found" is never an error here: reads return `Ok(None)` and deletes of absent
//! objects succeed. Every other failure is surfaced as a [`ReconcilerError`].
//!
//! - [`KubeStore`] talks to the Kubernetes API server.
//! - [`MemoryStore`] keeps objects in memory with an operation journal and fault
//!   injection, for tests and dry runs.

mod kube_store;
mod memory;

pub use crate::controller::mutex_registry::{ManagedResourceKey, ResourceKind};
pub use kube_store::KubeStore;
pub use memory::{Fault, MemoryStore, Operation, StoreOp};

use crate::controller::error::ReconcilerError;
use crate::controller::merge::TemplateFetcher;
use crate::crd::{
    AppInstance, AppInstanceStatus, AppTemplate, AppTemplateStatus, ExternalSecret,
    LonghornVolume, RecurringJob,
};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A namespaced object the engine reads and writes
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: ResourceKind;

    /// The part of the object compared for drift
    ///
    /// Metadata is compared separately (labels, annotations, owners), status and
    /// type information never.
    fn comparable(&self) -> Result<Value, ReconcilerError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            for key in ["metadata", "status", "apiVersion", "kind"] {
                map.remove(key);
            }
        }
        Ok(value)
    }
}

impl ManagedResource for AppInstance {
    const KIND: ResourceKind = ResourceKind::AppInstance;
}

impl ManagedResource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;
}

impl ManagedResource for Service {
    const KIND: ResourceKind = ResourceKind::Service;
}

impl ManagedResource for Ingress {
    const KIND: ResourceKind = ResourceKind::Ingress;
}

impl ManagedResource for PersistentVolumeClaim {
    const KIND: ResourceKind = ResourceKind::PersistentVolumeClaim;
}

impl ManagedResource for ConfigMap {
    const KIND: ResourceKind = ResourceKind::ConfigMap;
}

impl ManagedResource for ExternalSecret {
    const KIND: ResourceKind = ResourceKind::ExternalSecret;
}

impl ManagedResource for RecurringJob {
    const KIND: ResourceKind = ResourceKind::RecurringJob;
}

impl ManagedResource for LonghornVolume {
    const KIND: ResourceKind = ResourceKind::LonghornVolume;
}

/// Label selector as an exact-match map
pub type LabelFilter = BTreeMap<String, String>;

/// Cluster API collaborator of the reconcilers
#[async_trait]
pub trait ObjectStore: TemplateFetcher + Send + Sync + 'static {
    /// Fetch an object, `Ok(None)` when it does not exist
    async fn get<K: ManagedResource>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<K>, ReconcilerError>;

    /// List objects carrying every label of `labels`, in one namespace or all of them
    async fn list<K: ManagedResource>(
        &self,
        namespace: Option<&str>,
        labels: &LabelFilter,
    ) -> Result<Vec<K>, ReconcilerError>;

    async fn create<K: ManagedResource>(&self, object: &K) -> Result<K, ReconcilerError>;

    /// Update an existing object to match `object`
    async fn update<K: ManagedResource>(&self, object: &K) -> Result<K, ReconcilerError>;

    /// Delete an object; deleting an absent object succeeds
    async fn delete<K: ManagedResource>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<(), ReconcilerError>;

    async fn list_templates(&self) -> Result<Vec<AppTemplate>, ReconcilerError>;

    /// Replace the finalizers of the AppTemplate `name`; a missing template is not an error
    async fn patch_template_finalizers(
        &self,
        name: &str,
        finalizers: &[String],
    ) -> Result<(), ReconcilerError>;

    async fn patch_instance_status(
        &self,
        name: &str,
        namespace: &str,
        status: &AppInstanceStatus,
    ) -> Result<(), ReconcilerError>;

    async fn patch_template_status(
        &self,
        name: &str,
        status: &AppTemplateStatus,
    ) -> Result<(), ReconcilerError>;
}

/// Whether `labels` carries every entry of `filter`
#[must_use]
pub fn labels_match(labels: Option<&BTreeMap<String, String>>, filter: &LabelFilter) -> bool {
    filter
        .iter()
        .all(|(key, value)| labels.and_then(|l| l.get(key)) == Some(value))
}
