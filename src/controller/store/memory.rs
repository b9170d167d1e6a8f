//! In-memory [`ObjectStore`] with an operation journal and fault injection.
//!
//! Objects are kept as JSON keyed by `(kind, namespace, name)`. Updates replace the
//! stored object but keep fields that only the server populates (uid, resource
//! version), so derivative comparison sees a realistic current object.

use super::{labels_match, LabelFilter, ManagedResource, ManagedResourceKey, ObjectStore, ResourceKind};
use crate::controller::error::ReconcilerError;
use crate::controller::merge::TemplateFetcher;
use crate::crd::{AppInstanceStatus, AppTemplate, AppTemplateSpec, AppTemplateStatus};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Store operation recorded in the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
    PatchStatus,
    /// Finalizer changes
    PatchMetadata,
}

impl Operation {
    /// Whether the operation mutates a managed resource
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Delete)
    }
}

/// One journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOp {
    pub operation: Operation,
    pub key: ManagedResourceKey,
}

/// Failure injected into the next matching operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reject the write as touching an immutable field
    ImmutableField,
    /// Fail like a dropped connection or a rate limit
    Transient,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(ResourceKind, String, String), Value>,
    journal: Vec<StoreOp>,
    faults: VecDeque<(ResourceKind, Operation, Fault)>,
    next_uid: u64,
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every API call by `latency`, yielding to other tasks like a real round trip
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `object` directly, bypassing the journal
    pub fn insert<K: ManagedResource>(&self, object: &K) -> Result<(), ReconcilerError> {
        let key = (
            K::KIND,
            object.namespace().unwrap_or_default(),
            object.name_any(),
        );
        let value = serde_json::to_value(object)?;
        self.inner().objects.insert(key, value);
        Ok(())
    }

    /// Store an AppTemplate directly, bypassing the journal
    pub fn insert_template(&self, name: &str, spec: AppTemplateSpec) -> Result<(), ReconcilerError> {
        let value = serde_json::to_value(AppTemplate::new(name, spec))?;
        self.inner()
            .objects
            .insert((ResourceKind::AppTemplate, String::new(), name.to_string()), value);
        Ok(())
    }

    /// Remove an object directly, bypassing the journal
    pub fn remove(&self, kind: ResourceKind, name: &str, namespace: &str) -> bool {
        self.inner()
            .objects
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .is_some()
    }

    /// Delete an AppTemplate the way the API server does, bypassing the journal
    ///
    /// A template with finalizers is only marked as terminating. Returns whether the
    /// template existed.
    pub fn delete_template(&self, name: &str) -> bool {
        let mut inner = self.inner();
        let key = (ResourceKind::AppTemplate, String::new(), name.to_string());
        let Some(object) = inner.objects.get_mut(&key) else {
            return false;
        };
        let finalized = object
            .pointer("/metadata/finalizers")
            .and_then(Value::as_array)
            .is_some_and(|finalizers| !finalizers.is_empty());
        if finalized {
            object["metadata"]["deletionTimestamp"] =
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        } else {
            inner.objects.remove(&key);
        }
        true
    }

    /// Read an object directly, bypassing the journal
    pub fn peek<K: ManagedResource>(&self, name: &str, namespace: &str) -> Option<K> {
        self.inner()
            .objects
            .get(&(K::KIND, namespace.to_string(), name.to_string()))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Read an AppTemplate directly, bypassing the journal
    pub fn peek_template(&self, name: &str) -> Option<AppTemplate> {
        self.inner()
            .objects
            .get(&(ResourceKind::AppTemplate, String::new(), name.to_string()))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Fail the next `operation` on `kind` with `fault`
    pub fn inject_fault(&self, kind: ResourceKind, operation: Operation, fault: Fault) {
        self.inner().faults.push_back((kind, operation, fault));
    }

    /// Every operation so far
    #[must_use]
    pub fn journal(&self) -> Vec<StoreOp> {
        self.inner().journal.clone()
    }

    /// Every managed-resource write so far
    #[must_use]
    pub fn writes(&self) -> Vec<StoreOp> {
        self.inner()
            .journal
            .iter()
            .filter(|op| op.operation.is_write())
            .cloned()
            .collect()
    }

    /// Number of `operation`s on `kind`
    #[must_use]
    pub fn count(&self, kind: ResourceKind, operation: Operation) -> usize {
        self.inner()
            .journal
            .iter()
            .filter(|op| op.key.kind == kind && op.operation == operation)
            .count()
    }

    /// Number of stored objects of `kind`
    #[must_use]
    pub fn len_of(&self, kind: ResourceKind) -> usize {
        self.inner().objects.keys().filter(|(k, _, _)| *k == kind).count()
    }

    pub fn clear_journal(&self) {
        self.inner().journal.clear();
    }

    /// Record the operation, then fail it if a fault is pending for it
    fn record(
        inner: &mut Inner,
        operation: Operation,
        key: ManagedResourceKey,
    ) -> Result<(), ReconcilerError> {
        let pending = inner
            .faults
            .iter()
            .position(|(kind, op, _)| *kind == key.kind && *op == operation);
        let fault = pending.and_then(|index| inner.faults.remove(index));
        inner.journal.push(StoreOp {
            operation,
            key: key.clone(),
        });
        match fault {
            None => Ok(()),
            Some((_, _, Fault::ImmutableField)) => Err(ReconcilerError::ImmutableField {
                kind: key.kind,
                name: key.name,
                message: "spec.selector: Invalid value: field is immutable".to_string(),
            }),
            Some((_, _, Fault::Transient)) => Err(ReconcilerError::Store {
                kind: key.kind,
                name: key.name,
                message: "injected transient failure".to_string(),
            }),
        }
    }

    fn key_of<K: ManagedResource>(object: &K) -> ManagedResourceKey {
        ManagedResourceKey::new(
            K::KIND,
            object.name_any(),
            object.namespace().unwrap_or_default(),
        )
    }

    fn patch_status(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
        status: Value,
    ) -> Result<(), ReconcilerError> {
        let mut inner = self.inner();
        Self::record(
            &mut inner,
            Operation::PatchStatus,
            ManagedResourceKey::new(kind, name, namespace),
        )?;
        if let Some(Value::Object(object)) =
            inner
                .objects
                .get_mut(&(kind, namespace.to_string(), name.to_string()))
        {
            object.insert("status".to_string(), status);
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateFetcher for MemoryStore {
    async fn fetch_template(&self, name: &str) -> Result<Option<AppTemplate>, ReconcilerError> {
        self.round_trip().await;
        let mut inner = self.inner();
        Self::record(
            &mut inner,
            Operation::Get,
            ManagedResourceKey::new(ResourceKind::AppTemplate, name, ""),
        )?;
        inner
            .objects
            .get(&(ResourceKind::AppTemplate, String::new(), name.to_string()))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(ReconcilerError::from)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: ManagedResource>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<K>, ReconcilerError> {
        self.round_trip().await;
        let mut inner = self.inner();
        Self::record(
            &mut inner,
            Operation::Get,
            ManagedResourceKey::new(K::KIND, name, namespace),
        )?;
        inner
            .objects
            .get(&(K::KIND, namespace.to_string(), name.to_string()))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(ReconcilerError::from)
    }

    async fn list<K: ManagedResource>(
        &self,
        namespace: Option<&str>,
        labels: &LabelFilter,
    ) -> Result<Vec<K>, ReconcilerError> {
        self.round_trip().await;
        let mut inner = self.inner();
        Self::record(
            &mut inner,
            Operation::List,
            ManagedResourceKey::new(K::KIND, "", namespace.unwrap_or_default()),
        )?;
        let mut items = Vec::new();
        for ((kind, ns, _), value) in &inner.objects {
            if *kind != K::KIND || namespace.is_some_and(|n| n != ns.as_str()) {
                continue;
            }
            let object: K = serde_json::from_value(value.clone())?;
            if labels_match(object.meta().labels.as_ref(), labels) {
                items.push(object);
            }
        }
        Ok(items)
    }

    async fn create<K: ManagedResource>(&self, object: &K) -> Result<K, ReconcilerError> {
        let key = Self::key_of(object);
        self.round_trip().await;
        let mut inner = self.inner();
        Self::record(&mut inner, Operation::Create, key.clone())?;
        let map_key = (key.kind, key.namespace.clone(), key.name.clone());
        if inner.objects.contains_key(&map_key) {
            return Err(ReconcilerError::Store {
                kind: key.kind,
                name: key.name,
                message: "already exists".to_string(),
            });
        }
        inner.next_uid += 1;
        let mut created = object.clone();
        created.meta_mut().uid = Some(format!("uid-{}", inner.next_uid));
        created.meta_mut().resource_version = Some("1".to_string());
        inner.objects.insert(map_key, serde_json::to_value(&created)?);
        Ok(created)
    }

    async fn update<K: ManagedResource>(&self, object: &K) -> Result<K, ReconcilerError> {
        let key = Self::key_of(object);
        self.round_trip().await;
        let mut inner = self.inner();
        Self::record(&mut inner, Operation::Update, key.clone())?;
        let map_key = (key.kind, key.namespace.clone(), key.name.clone());
        let Some(existing) = inner.objects.get(&map_key) else {
            return Err(ReconcilerError::Store {
                kind: key.kind,
                name: key.name,
                message: "not found".to_string(),
            });
        };
        let existing: K = serde_json::from_value(existing.clone())?;
        let mut updated = object.clone();
        let version = existing
            .meta()
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        updated.meta_mut().uid.clone_from(&existing.meta().uid);
        updated.meta_mut().resource_version = Some((version + 1).to_string());
        inner.objects.insert(map_key, serde_json::to_value(&updated)?);
        Ok(updated)
    }

    async fn delete<K: ManagedResource>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<(), ReconcilerError> {
        self.round_trip().await;
        let mut inner = self.inner();
        Self::record(
            &mut inner,
            Operation::Delete,
            ManagedResourceKey::new(K::KIND, name, namespace),
        )?;
        inner
            .objects
            .remove(&(K::KIND, namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<AppTemplate>, ReconcilerError> {
        self.round_trip().await;
        let mut inner = self.inner();
        Self::record(
            &mut inner,
            Operation::List,
            ManagedResourceKey::new(ResourceKind::AppTemplate, "", ""),
        )?;
        inner
            .objects
            .iter()
            .filter(|((kind, _, _), _)| *kind == ResourceKind::AppTemplate)
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(ReconcilerError::from))
            .collect()
    }

    async fn patch_template_finalizers(
        &self,
        name: &str,
        finalizers: &[String],
    ) -> Result<(), ReconcilerError> {
        self.round_trip().await;
        let mut inner = self.inner();
        Self::record(
            &mut inner,
            Operation::PatchMetadata,
            ManagedResourceKey::new(ResourceKind::AppTemplate, name, ""),
        )?;
        let key = (ResourceKind::AppTemplate, String::new(), name.to_string());
        let Some(object) = inner.objects.get_mut(&key) else {
            return Ok(());
        };
        let terminating = object.pointer("/metadata/deletionTimestamp").is_some();
        if terminating && finalizers.is_empty() {
            inner.objects.remove(&key);
        } else {
            object["metadata"]["finalizers"] = serde_json::json!(finalizers);
        }
        Ok(())
    }

    async fn patch_instance_status(
        &self,
        name: &str,
        namespace: &str,
        status: &AppInstanceStatus,
    ) -> Result<(), ReconcilerError> {
        let status = serde_json::to_value(status)?;
        self.round_trip().await;
        self.patch_status(ResourceKind::AppInstance, name, namespace, status)
    }

    async fn patch_template_status(
        &self,
        name: &str,
        status: &AppTemplateStatus,
    ) -> Result<(), ReconcilerError> {
        let status = serde_json::to_value(status)?;
        self.round_trip().await;
        self.patch_status(ResourceKind::AppTemplate, name, "", status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map(name: &str, app: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default".into()),
                labels: Some(BTreeMap::from([("appbundle".to_string(), app.to_string())])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_crud_and_journal() {
        let store = MemoryStore::new();
        assert!(store
            .get::<ConfigMap>("web", "default")
            .await
            .unwrap()
            .is_none());

        let created = store.create(&config_map("web", "web")).await.unwrap();
        assert_eq!(created.metadata.uid.as_deref(), Some("uid-1"));
        assert!(store.create(&config_map("web", "web")).await.is_err());

        let updated = store.update(&config_map("web", "web")).await.unwrap();
        assert_eq!(updated.metadata.uid.as_deref(), Some("uid-1"));
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));

        store.create(&config_map("api", "api")).await.unwrap();
        let filter = BTreeMap::from([("appbundle".to_string(), "web".to_string())]);
        let listed: Vec<ConfigMap> = store.list(Some("default"), &filter).await.unwrap();
        assert_eq!(listed.len(), 1);

        store.delete::<ConfigMap>("web", "default").await.unwrap();
        store.delete::<ConfigMap>("web", "default").await.unwrap();
        assert_eq!(store.len_of(ResourceKind::ConfigMap), 1);

        assert_eq!(store.count(ResourceKind::ConfigMap, Operation::Create), 3);
        assert_eq!(store.count(ResourceKind::ConfigMap, Operation::Delete), 2);
        assert_eq!(store.writes().len(), 6);
    }

    #[tokio::test]
    async fn test_fault_injection_is_consumed_once() {
        let store = MemoryStore::new();
        store.insert(&config_map("web", "web")).unwrap();
        store.inject_fault(ResourceKind::ConfigMap, Operation::Update, Fault::ImmutableField);

        let err = store.update(&config_map("web", "web")).await.unwrap_err();
        assert!(err.is_immutable_field_conflict());
        store.update(&config_map("web", "web")).await.unwrap();
    }

    #[tokio::test]
    async fn test_templates() {
        let store = MemoryStore::new();
        store
            .insert_template(
                "base",
                AppTemplateSpec {
                    replicas: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        let template = store.fetch_template("base").await.unwrap().unwrap();
        assert_eq!(template.spec.replicas, Some(2));
        assert!(store.fetch_template("other").await.unwrap().is_none());
        assert_eq!(store.list_templates().await.unwrap().len(), 1);
    }
}
