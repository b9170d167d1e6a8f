//! Kubernetes API server backed [`ObjectStore`].

use super::{LabelFilter, ManagedResource, ObjectStore};
use crate::constants::FIELD_MANAGER;
use crate::controller::diff::stale_metadata_patch;
use crate::controller::error::{is_not_found, ReconcilerError};
use crate::controller::merge::TemplateFetcher;
use crate::crd::{AppInstance, AppInstanceStatus, AppTemplate, AppTemplateStatus};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

/// Object store talking to the API server
///
/// Updates are server-side applies with forced ownership under the controller's
/// field manager. Labels and annotations left behind by other managers are then
/// removed with a merge patch, so metadata matches exactly.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn namespaced<K: ManagedResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of<K: ManagedResource>(object: &K) -> Result<String, ReconcilerError> {
        object.namespace().ok_or_else(|| {
            ReconcilerError::configuration(format!(
                "{} {} has no namespace",
                K::KIND,
                object.name_any()
            ))
        })
    }
}

#[async_trait]
impl TemplateFetcher for KubeStore {
    async fn fetch_template(&self, name: &str) -> Result<Option<AppTemplate>, ReconcilerError> {
        let api: Api<AppTemplate> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: ManagedResource>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<K>, ReconcilerError> {
        Ok(self.namespaced::<K>(namespace).get_opt(name).await?)
    }

    async fn list<K: ManagedResource>(
        &self,
        namespace: Option<&str>,
        labels: &LabelFilter,
    ) -> Result<Vec<K>, ReconcilerError> {
        let api: Api<K> = match namespace {
            Some(ns) => self.namespaced(ns),
            None => Api::all(self.client.clone()),
        };
        let selector = labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&selector)
        };
        Ok(api.list(&params).await?.items)
    }

    async fn create<K: ManagedResource>(&self, object: &K) -> Result<K, ReconcilerError> {
        let namespace = Self::namespace_of(object)?;
        let name = object.name_any();
        self.namespaced::<K>(&namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| ReconcilerError::from_write(e, K::KIND, &name))
    }

    async fn update<K: ManagedResource>(&self, object: &K) -> Result<K, ReconcilerError> {
        let namespace = Self::namespace_of(object)?;
        let name = object.name_any();
        let mut object = object.clone();
        object.meta_mut().resource_version = None;
        object.meta_mut().managed_fields = None;
        let api = self.namespaced::<K>(&namespace);
        let applied = api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&object),
            )
            .await
            .map_err(|e| ReconcilerError::from_write(e, K::KIND, &name))?;

        // Keys owned by other field managers survive the apply
        let Some(patch) = stale_metadata_patch(object.meta(), applied.meta()) else {
            return Ok(applied);
        };
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ReconcilerError::from_write(e, K::KIND, &name))
    }

    async fn delete<K: ManagedResource>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<(), ReconcilerError> {
        match self
            .namespaced::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(ReconcilerError::from_write(e, K::KIND, name)),
        }
    }

    async fn list_templates(&self) -> Result<Vec<AppTemplate>, ReconcilerError> {
        let api: Api<AppTemplate> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_template_finalizers(
        &self,
        name: &str,
        finalizers: &[String],
    ) -> Result<(), ReconcilerError> {
        let api: Api<AppTemplate> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        match api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_instance_status(
        &self,
        name: &str,
        namespace: &str,
        status: &AppInstanceStatus,
    ) -> Result<(), ReconcilerError> {
        let api: Api<AppInstance> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "status": status
        });
        match api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            // deleted while we were reconciling
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_template_status(
        &self,
        name: &str,
        status: &AppTemplateStatus,
    ) -> Result<(), ReconcilerError> {
        let api: Api<AppTemplate> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "status": status
        });
        match api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
