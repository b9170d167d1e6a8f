//! # Builder Configuration
//!
//! Cluster conventions that the managed resource builders stamp onto objects:
//! ingress controller annotations, image pull secrets and the backup system namespace.

use super::{env_var_opt, env_var_or_default_str};

/// Cluster conventions used by the builders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Traefik entry point set on every ingress
    pub ingress_entry_point: String,
    /// cert-manager cluster issuer set on every ingress
    pub ingress_cluster_issuer: String,
    /// Traefik middleware for routes with `auth: true` (disabled when unset)
    pub ingress_auth_middleware: Option<String>,
    /// Image pull secrets attached to every workload
    pub image_pull_secrets: Vec<String>,
    /// Namespace of the backup system (RecurringJobs and Volumes live there)
    pub backup_namespace: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            ingress_entry_point: DEFAULT_INGRESS_ENTRY_POINT.to_string(),
            ingress_cluster_issuer: DEFAULT_INGRESS_CLUSTER_ISSUER.to_string(),
            ingress_auth_middleware: Some(DEFAULT_INGRESS_AUTH_MIDDLEWARE.to_string()),
            image_pull_secrets: split_list(DEFAULT_IMAGE_PULL_SECRETS),
            backup_namespace: DEFAULT_BACKUP_NAMESPACE.to_string(),
        }
    }
}

impl BuilderConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        let ingress_auth_middleware = match std::env::var("INGRESS_AUTH_MIDDLEWARE") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value),
            Err(_) => Some(DEFAULT_INGRESS_AUTH_MIDDLEWARE.to_string()),
        };
        Self {
            ingress_entry_point: env_var_or_default_str(
                "INGRESS_ENTRY_POINT",
                DEFAULT_INGRESS_ENTRY_POINT,
            ),
            ingress_cluster_issuer: env_var_or_default_str(
                "INGRESS_CLUSTER_ISSUER",
                DEFAULT_INGRESS_CLUSTER_ISSUER,
            ),
            ingress_auth_middleware,
            image_pull_secrets: split_list(
                &env_var_opt("IMAGE_PULL_SECRETS")
                    .unwrap_or_else(|| DEFAULT_IMAGE_PULL_SECRETS.to_string()),
            ),
            backup_namespace: env_var_or_default_str("BACKUP_NAMESPACE", DEFAULT_BACKUP_NAMESPACE),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
