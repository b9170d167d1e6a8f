//! # Custom Resource Definitions
//!
//! CRD types for the AppInstance controller.
//!
//! ## Module Structure
//!
//! - `instance.rs` - AppInstance and the field types shared with templates
//! - `template.rs` - AppTemplate (cluster-scoped defaults)
//! - `status.rs` - Status types for tracking reconciliation state
//! - `external.rs` - Third-party resources managed or read by the controller

mod external;
mod instance;
mod status;
mod template;

// Re-export all public types
pub use external::{
    ExternalSecret, ExternalSecretData, ExternalSecretRemoteRef, ExternalSecretSpec,
    ExternalSecretTarget, ExternalSecretTemplate, LonghornVolume, LonghornVolumeSpec,
    RecurringJob, RecurringJobSpec, SecretStoreRef,
};
pub use instance::{
    instance_id, AppImage, AppInstance, AppInstanceSpec, BackupSchedule, ConfigEntry, HomePage,
    Route, RouteIngress, SourcedEnv, Volume,
};
pub use status::{AppInstanceStatus, AppTemplateStatus, Condition};
pub use template::{AppTemplate, AppTemplateSpec};
