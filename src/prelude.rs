//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use app_bundle_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (AppInstance, AppTemplate, etc.)
//! - Reconciler types (Reconciler, ReconcilerError, outcomes)
//! - The object store seam and its implementations
//! - Config types (ControllerConfig, BuilderConfig)

// CRD types - most commonly used
pub use crate::crd::*;

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile, reconcile_template, ReconcileOutcome, Reconciler, ReconcilerError,
    TemplateOutcome,
};

// Engine building blocks
pub use crate::controller::diff::{upsert, UpdateStrategy, UpsertOutcome};
pub use crate::controller::merge::{resolve, Resolution, TemplateFetcher};
pub use crate::controller::state_cache::{SpecHash, StateCache};
pub use crate::controller::store::{
    KubeStore, ManagedResource, ManagedResourceKey, MemoryStore, ObjectStore, ResourceKind,
};

// Config types - for configuration management
pub use crate::config::{BuilderConfig, ControllerConfig};
