//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_opt, env_var_or_default, env_var_or_default_str};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Resync window (seconds)
    /// An unchanged spec is fully reconciled again once this much time has elapsed
    pub resync_window_secs: u64,
    /// Requeue interval when a reconciliation is gated by the state cache (seconds)
    pub gated_requeue_secs: u64,
    /// Requeue interval after a successful reconciliation (seconds)
    pub resync_requeue_secs: u64,
    /// Fibonacci backoff starting value (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff maximum value (seconds)
    pub backoff_max_secs: u64,
    /// Requeue interval for configuration errors (seconds)
    pub configuration_error_requeue_secs: u64,
    /// Maximum concurrent reconciliations per controller
    pub max_concurrent_reconciliations: u16,
    /// Restrict the AppInstance watch to one namespace (all namespaces when unset)
    pub watch_namespace: Option<String>,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            resync_window_secs: DEFAULT_RESYNC_WINDOW_SECS,
            gated_requeue_secs: DEFAULT_GATED_REQUEUE_SECS,
            resync_requeue_secs: DEFAULT_RESYNC_REQUEUE_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            configuration_error_requeue_secs: DEFAULT_CONFIGURATION_ERROR_REQUEUE_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            watch_namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            resync_window_secs: env_var_or_default(
                "RESYNC_WINDOW_SECS",
                DEFAULT_RESYNC_WINDOW_SECS,
            ),
            gated_requeue_secs: env_var_or_default(
                "GATED_REQUEUE_SECS",
                DEFAULT_GATED_REQUEUE_SECS,
            ),
            resync_requeue_secs: env_var_or_default(
                "RESYNC_REQUEUE_SECS",
                DEFAULT_RESYNC_REQUEUE_SECS,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            configuration_error_requeue_secs: env_var_or_default(
                "CONFIGURATION_ERROR_REQUEUE_SECS",
                DEFAULT_CONFIGURATION_ERROR_REQUEUE_SECS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            watch_namespace: env_var_opt("WATCH_NAMESPACE"),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
        }
    }

    /// Get resync window duration
    #[must_use]
    pub fn resync_window(&self) -> Duration {
        Duration::from_secs(self.resync_window_secs)
    }

    /// Get gated requeue duration
    #[must_use]
    pub fn gated_requeue(&self) -> Duration {
        Duration::from_secs(self.gated_requeue_secs)
    }

    /// Get resync requeue duration
    #[must_use]
    pub fn resync_requeue(&self) -> Duration {
        Duration::from_secs(self.resync_requeue_secs)
    }

    /// Get configuration error requeue duration
    #[must_use]
    pub fn configuration_error_requeue(&self) -> Duration {
        Duration::from_secs(self.configuration_error_requeue_secs)
    }
}
