//! # AppInstance
//!
//! The top-level desired-state record for one deployable application.
//!
//! Every field is optional: an instance may declare only what differs from the
//! template it inherits from (`base`), and the template chain fills the gaps.

use super::status::AppInstanceStatus;
use k8s_openapi::api::core::v1::{Probe, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// AppInstance Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: atro.xyz/v1alpha1
/// kind: AppInstance
/// metadata:
///   name: grafana
///   namespace: monitoring
/// spec:
///   base: web-defaults
///   image:
///     repository: grafana/grafana
///     tag: "11.2.0"
///   routes:
///     web:
///       port: 3000
///       ingress:
///         domain: grafana.example.com
///         auth: true
///   volumes:
///     data:
///       path: /var/lib/grafana
///       size: 5Gi
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "AppInstance",
    group = "atro.xyz",
    version = "v1alpha1",
    namespaced,
    status = "AppInstanceStatus",
    shortname = "ai",
    printcolumn = r#"{"name":"Base", "type":"string", "jsonPath":".spec.base"}"#,
    printcolumn = r#"{"name":"Last Reconciliation", "type":"string", "jsonPath":".status.lastReconciliation"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppInstanceSpec {
    /// Name of the AppTemplate this instance inherits unset fields from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<AppImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    /// Schedule onto NVIDIA nodes and expose all GPUs to the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_nvidia: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Plain environment variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envs: Option<BTreeMap<String, String>>,
    /// SecretStore used for every externally sourced secret of this instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_store_ref: Option<String>,
    /// Environment variables sourced from secrets, config maps or an external secret store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourced_envs: Option<BTreeMap<String, SourcedEnv>>,
    /// Service type (defaults to ClusterIP)
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
    /// Expose the service on the tailnet under this hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tailscale_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Config files, keyed by config name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs: Option<BTreeMap<String, ConfigEntry>>,
}

/// Container image reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Always, IfNotPresent or Never (defaults to Always)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
}

/// Environment variable sourced from somewhere other than the spec
///
/// Exactly one of `externalSecret`, `secret` and `configMap` is expected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourcedEnv {
    /// Remote key in the instance's secret store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_secret: Option<String>,
    /// Name of an existing Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Name of an existing ConfigMap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<String>,
    /// Key inside the Secret or ConfigMap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// A named network route of the application
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// Container port (defaults to `port`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,
    /// TCP, UDP or SCTP (defaults to TCP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<RouteIngress>,
}

/// Public exposure of a route through an Ingress
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Put the route behind the authentication middleware
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<bool>,
}

/// Dashboard entry metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<String>,
}

/// A named volume mounted into the container
///
/// `hostPath`, `emptyDir` and `existingClaim` select the volume source; otherwise
/// a claim named `<instance>-<key>` is managed for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<bool>,
    /// Mount path inside the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Requested storage, e.g. `5Gi`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_claim: Option<String>,
    /// Include the claim in the instance's recurring backup job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<bool>,
}

/// Recurring backup of the instance's volumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupSchedule {
    /// Cron expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    /// Number of backups to keep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retain: Option<i32>,
}

/// A config file mounted into the container
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Inline file content (a template when `secrets` is set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Mount this key of an existing ConfigMap instead of managing one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<String>,
    /// Template variable name to remote secret key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir_path: Option<String>,
    /// Copy the file into place with an init container instead of mounting it read-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_over: Option<bool>,
}

impl ConfigEntry {
    /// Whether the content is rendered from secrets (projected through the ExternalSecret)
    #[must_use]
    pub fn is_secret(&self) -> bool {
        self.secrets.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Stable identifier of an instance in the state cache
#[must_use]
pub fn instance_id(name: &str, namespace: &str) -> String {
    format!("{name}_{namespace}")
}

impl AppInstance {
    /// Stable identifier of this instance in the state cache (`<name>_<namespace>`)
    #[must_use]
    pub fn id(&self) -> String {
        instance_id(&self.name_any(), &self.namespace().unwrap_or_default())
    }
}
