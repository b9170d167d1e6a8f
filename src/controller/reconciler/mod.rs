//! # Reconciler
//!
//! Reconciliation of AppInstances and AppTemplates.
//!
//! ## Module Structure
//!
//! - `types.rs` - Shared reconciler context and pass outcomes
//! - `reconcile.rs` - AppInstance orchestrator and controller entrypoint
//! - `resources.rs` - Per-kind sub-reconciles
//! - `template.rs` - AppTemplate dependents invalidation
//! - `status.rs` - Status documents

mod reconcile;
mod resources;
mod status;
mod template;
mod types;

pub use crate::controller::error::ReconcilerError;
pub use reconcile::{reconcile, SUB_RECONCILES};
pub use resources::Writes;
pub use status::{instance_status, template_status};
pub use template::reconcile_template;
pub use types::{ReconcileOutcome, Reconciler, TemplateOutcome};
