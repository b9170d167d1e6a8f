//! # Status
//!
//! Status types for AppInstances and AppTemplates.

use serde::{Deserialize, Serialize};

/// Status of an AppInstance
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppInstanceStatus {
    /// Time of the last successful reconciliation (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciliation: Option<String>,
    /// Hash of the (pre-resolution) spec that was last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_spec_hash: Option<String>,
    /// Template chain walked on the last successful reconciliation, nearest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved_templates: Vec<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Status of an AppTemplate
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppTemplateStatus {
    /// Time of the last reconciliation (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_spec_hash: Option<String>,
    /// Instances (`namespace/name`) invalidated by the last template change
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalidated_instances: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    /// `Ready=True` condition stamped after a successful reconciliation
    #[must_use]
    pub fn ready(now: &str, message: impl Into<String>) -> Self {
        Self {
            r#type: "Ready".to_string(),
            status: "True".to_string(),
            last_transition_time: Some(now.to_string()),
            reason: Some("Reconciled".to_string()),
            message: Some(message.into()),
        }
    }
}
