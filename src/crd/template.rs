//! # AppTemplate
//!
//! A cluster-scoped set of reusable defaults. AppInstances (and other templates)
//! inherit from a template through `base`, forming a singly-linked chain.

use super::instance::{
    AppImage, AppInstanceSpec, BackupSchedule, ConfigEntry, HomePage, Route, SourcedEnv, Volume,
};
use super::status::AppTemplateStatus;
use k8s_openapi::api::core::v1::{Probe, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// AppTemplate Custom Resource Definition
///
/// Same field shape as an AppInstance spec, minus identity-specific fields
/// (`tailscaleName`).
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "AppTemplate",
    group = "atro.xyz",
    version = "v1alpha1",
    status = "AppTemplateStatus",
    shortname = "at",
    printcolumn = r#"{"name":"Base", "type":"string", "jsonPath":".spec.base"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppTemplateSpec {
    /// Name of the AppTemplate this template inherits from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<AppImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_nvidia: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envs: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_store_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourced_envs: Option<BTreeMap<String, SourcedEnv>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<BTreeMap<String, Route>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<HomePage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<BTreeMap<String, Volume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs: Option<BTreeMap<String, ConfigEntry>>,
}

impl AppTemplateSpec {
    /// The template's defaults in instance shape, ready to be merged into an instance
    ///
    /// `base` is dropped: the chain is walked by the resolver, not merged.
    #[must_use]
    pub fn to_instance_defaults(&self) -> AppInstanceSpec {
        AppInstanceSpec {
            base: None,
            image: self.image.clone(),
            node_selector: self.node_selector.clone(),
            use_nvidia: self.use_nvidia,
            replicas: self.replicas,
            resources: self.resources.clone(),
            envs: self.envs.clone(),
            secret_store_ref: self.secret_store_ref.clone(),
            sourced_envs: self.sourced_envs.clone(),
            service_type: self.service_type.clone(),
            routes: self.routes.clone(),
            homepage: self.homepage.clone(),
            volumes: self.volumes.clone(),
            backup: self.backup.clone(),
            selector: self.selector.clone(),
            liveness_probe: self.liveness_probe.clone(),
            readiness_probe: self.readiness_probe.clone(),
            startup_probe: self.startup_probe.clone(),
            tailscale_name: None,
            command: self.command.clone(),
            args: self.args.clone(),
            configs: self.configs.clone(),
        }
    }

    /// Name of the parent template, if any
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.base.as_deref().filter(|b| !b.is_empty())
    }
}
