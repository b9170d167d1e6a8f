//! # Diff & Upsert
//!
//! Decides whether a freshly built ("expected") resource differs from the stored
//! ("current") one, and applies the minimal correction.
//!
//! - `derivative`: structural comparison tolerating server-populated fields
//! - `quantity`: resource quantities compared by amount
//! - `paths`: changed-path reporting for the human-readable reason strings
//! - `metadata`: exact label / annotation / owner comparison
//! - `upsert`: the no-op / create / update / recreate / delete decision

mod derivative;
mod metadata;
mod paths;
mod quantity;
mod upsert;

pub use derivative::is_derivative;
pub use metadata::{annotation_drift, label_drift, owner_drift, stale_metadata_patch};
pub use paths::{changed_paths, labels_reason, spec_reason};
pub use upsert::{drift_reason, upsert, UpdateStrategy, UpsertOutcome};
