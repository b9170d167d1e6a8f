//! # Builders
//!
//! Pure functions turning a resolved AppInstance spec into the managed resources
//! it expects to exist. Builders never talk to the cluster: the orchestrator feeds
//! their output to the upsert engine.
//!
//! - `deployment`: the workload (`<name>`)
//! - `service`: the Service (`<name>`), absent without routes
//! - `ingress`: one Ingress per route declaring `ingress` (`<name>-<route>`)
//! - `volumes`: PersistentVolumeClaims of managed volumes (`<name>-<volume>`)
//! - `config_map`: inline config files (`<name>`)
//! - `external_secret`: secrets projected from the secret store (`<name>`)
//! - `backup`: the longhorn RecurringJob (`<name>-<namespace>`)
//! - `homepage`: dashboard annotations shared by the Service and the `web` Ingress
//!
//! Map fields are `BTreeMap`s, so every builder iterates keys in sorted order and
//! produces identical output for identical input.

pub mod backup;
pub mod config_map;
pub mod deployment;
pub mod external_secret;
pub mod homepage;
pub mod ingress;
pub mod service;
pub mod volumes;

use crate::constants::{
    LABEL_APP_BUNDLE, LABEL_INSTANCE, LABEL_NAME, SELECTOR_LABEL, SYSTEM_ANNOTATION_PREFIXES,
};
use crate::controller::error::ReconcilerError;
use crate::crd::{AppInstance, AppInstanceSpec, ConfigEntry};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

pub use backup::build_recurring_job;
pub use config_map::build_config_map;
pub use deployment::build_deployment;
pub use external_secret::build_external_secret;
pub use homepage::homepage_annotations;
pub use ingress::build_ingresses;
pub use service::build_service;
pub use volumes::build_claims;

/// Identity of the AppInstance the managed resources belong to
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMeta {
    pub name: String,
    pub namespace: String,
    /// User annotations propagated to the workload and the Service
    pub annotations: BTreeMap<String, String>,
    /// Controller reference stamped on every namespaced managed object
    pub owner: OwnerReference,
}

impl InstanceMeta {
    #[must_use]
    pub fn from_instance(instance: &AppInstance) -> Self {
        let annotations = instance
            .annotations()
            .iter()
            .filter(|(key, _)| {
                !SYSTEM_ANNOTATION_PREFIXES
                    .iter()
                    .any(|prefix| key.starts_with(prefix))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            name: instance.name_any(),
            namespace: instance.namespace().unwrap_or_default(),
            annotations,
            owner: OwnerReference {
                api_version: AppInstance::api_version(&()).to_string(),
                kind: AppInstance::kind(&()).to_string(),
                name: instance.name_any(),
                uid: instance.uid().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            },
        }
    }
}

/// An instance spec after template resolution, with the identity of its instance
///
/// Request-scoped: built once per reconcile pass and shared read-only by every
/// sub-reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSpec {
    pub meta: InstanceMeta,
    pub spec: AppInstanceSpec,
    /// Templates walked during resolution, nearest first
    pub chain: Vec<String>,
}

impl ResolvedSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.meta.namespace
    }
}

/// Labels carried by every managed object of instance `name`
#[must_use]
pub fn standard_labels(name: &str) -> BTreeMap<String, String> {
    [LABEL_INSTANCE, LABEL_NAME, LABEL_APP_BUNDLE, SELECTOR_LABEL]
        .into_iter()
        .map(|key| (key.to_string(), name.to_string()))
        .collect()
}

/// Pod selector of instance `name`
#[must_use]
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(SELECTOR_LABEL.to_string(), name.to_string())])
}

/// Object metadata of a namespaced managed object owned by the instance
#[must_use]
pub fn owned_meta(resolved: &ResolvedSpec, name: impl Into<String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(resolved.meta.namespace.clone()),
        labels: Some(standard_labels(&resolved.meta.name)),
        owner_references: Some(vec![resolved.meta.owner.clone()]),
        ..Default::default()
    }
}

/// Where the content of a config file comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource<'a> {
    /// A key of a ConfigMap managed elsewhere
    Existing(&'a str),
    /// Rendered from secrets into the projected secret
    Secret,
    /// Inline content stored in the instance ConfigMap
    Inline(&'a str),
}

/// Classify a config entry
pub fn config_source<'a>(
    key: &str,
    entry: &'a ConfigEntry,
) -> Result<ConfigSource<'a>, ReconcilerError> {
    if let Some(existing) = entry.existing.as_deref().filter(|e| !e.is_empty()) {
        return Ok(ConfigSource::Existing(existing));
    }
    if entry.is_secret() {
        return Ok(ConfigSource::Secret);
    }
    entry
        .content
        .as_deref()
        .map(ConfigSource::Inline)
        .ok_or_else(|| {
            ReconcilerError::configuration(format!(
                "config {key} declares neither content, existing nor secrets"
            ))
        })
}

/// Read a required string field of a keyed entry
pub(crate) fn required<'a>(
    value: Option<&'a String>,
    owner: &str,
    key: &str,
    field: &str,
) -> Result<&'a str, ReconcilerError> {
    value
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReconcilerError::configuration(format!("{owner} {key} has no {field}")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::AppInstanceSpec;

    #[test]
    fn test_standard_labels() {
        let labels = standard_labels("web");
        assert_eq!(labels.len(), 4);
        assert!(labels.values().all(|v| v == "web"));
        assert_eq!(labels["appbundle"], "web");
        assert_eq!(labels["app.kubernetes.io/instance"], "web");
    }

    #[test]
    fn test_instance_meta_filters_system_annotations() {
        let instance = AppInstance {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("apps".into()),
                uid: Some("1234".into()),
                annotations: Some(BTreeMap::from([
                    ("team".to_string(), "infra".to_string()),
                    (
                        "kubectl.kubernetes.io/last-applied-configuration".to_string(),
                        "{}".to_string(),
                    ),
                ])),
                ..Default::default()
            },
            spec: AppInstanceSpec::default(),
            status: None,
        };
        let meta = InstanceMeta::from_instance(&instance);
        assert_eq!(meta.annotations.len(), 1);
        assert_eq!(meta.owner.uid, "1234");
        assert_eq!(meta.owner.kind, "AppInstance");
        assert_eq!(meta.owner.api_version, "atro.xyz/v1alpha1");
        assert_eq!(meta.owner.controller, Some(true));
    }

    #[test]
    fn test_config_source() {
        let existing = ConfigEntry {
            existing: Some("shared".into()),
            content: Some("ignored".into()),
            ..Default::default()
        };
        assert_eq!(
            config_source("a", &existing).unwrap(),
            ConfigSource::Existing("shared")
        );

        let secret = ConfigEntry {
            content: Some("pw={{ .pw }}".into()),
            secrets: Some(BTreeMap::from([("pw".into(), "remote/pw".into())])),
            ..Default::default()
        };
        assert_eq!(config_source("b", &secret).unwrap(), ConfigSource::Secret);

        let inline = ConfigEntry {
            content: Some("x=1".into()),
            ..Default::default()
        };
        assert_eq!(config_source("c", &inline).unwrap(), ConfigSource::Inline("x=1"));

        let empty = ConfigEntry::default();
        assert!(config_source("d", &empty).is_err());
    }
}
