//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default resync window (seconds)
/// An unchanged spec is re-asserted once this much time has passed since its last reconciliation
pub const DEFAULT_RESYNC_WINDOW_SECS: u64 = 30;

/// Default requeue interval when the state cache gates a reconciliation (seconds)
pub const DEFAULT_GATED_REQUEUE_SECS: u64 = 10;

/// Default requeue interval after a successful reconciliation (seconds)
pub const DEFAULT_RESYNC_REQUEUE_SECS: u64 = 60;

/// Default Fibonacci backoff starting value (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 10;

/// Default Fibonacci backoff maximum value (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default requeue interval for configuration errors (seconds)
/// These cannot self-heal, so they are not retried on the fast backoff path
pub const DEFAULT_CONFIGURATION_ERROR_REQUEUE_SECS: u64 = 300;

/// Default maximum number of concurrent reconciliations per controller
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "app-bundle-controller";

/// Label carrying the owning instance name, also used as the pod selector
pub const SELECTOR_LABEL: &str = "appbundle";

/// Standard `app.kubernetes.io/instance` label
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard `app.kubernetes.io/name` label
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Label marking an object as produced from an AppInstance
pub const LABEL_APP_BUNDLE: &str = "atro.xyz/app-bundle";

/// Finalizer holding deleted AppTemplates until their dependents are invalidated
pub const TEMPLATE_FINALIZER: &str = "atro.xyz/template-dependents";

/// Pod template annotation holding the digest of inline config contents
pub const CONFIG_HASH_ANNOTATION: &str = "atro.xyz/config-hash";

/// Annotation prefixes written by the API server or tooling, ignored when comparing annotations
pub const SYSTEM_ANNOTATION_PREFIXES: &[&str] = &[
    "deployment.kubernetes.io/",
    "kubectl.kubernetes.io/",
    "control-plane.alpha.kubernetes.io/",
    "pv.kubernetes.io/",
    "volume.beta.kubernetes.io/",
    "volume.kubernetes.io/",
];

/// Default traefik entry point for ingresses
pub const DEFAULT_INGRESS_ENTRY_POINT: &str = "websecure";

/// Default cert-manager cluster issuer for ingresses
pub const DEFAULT_INGRESS_CLUSTER_ISSUER: &str = "letsencrypt";

/// Default traefik middleware applied to routes requesting authentication
pub const DEFAULT_INGRESS_AUTH_MIDDLEWARE: &str = "auth-authelia@kubernetescrd";

/// Default image pull secrets attached to every workload (comma separated)
pub const DEFAULT_IMAGE_PULL_SECRETS: &str = "regcred";

/// Default namespace of the backup system (longhorn)
pub const DEFAULT_BACKUP_NAMESPACE: &str = "longhorn-system";

/// Image used by config copy-over init containers
pub const COPY_OVER_IMAGE: &str = "busybox:stable";

/// Refresh interval of generated ExternalSecrets
pub const EXTERNAL_SECRET_REFRESH_INTERVAL: &str = "15m";

/// Route key whose ingress carries homepage annotations
pub const HOMEPAGE_ROUTE_KEY: &str = "web";
