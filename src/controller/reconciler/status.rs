//! # Status
//!
//! Status documents written after successful passes.

use crate::controller::state_cache::SpecHash;
use crate::crd::{AppInstanceStatus, AppTemplateStatus, Condition};
use chrono::{DateTime, SecondsFormat, Utc};

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Status of an AppInstance after a full pass
#[must_use]
pub fn instance_status(
    spec_hash: &SpecHash,
    chain: &[String],
    writes: usize,
    now: DateTime<Utc>,
) -> AppInstanceStatus {
    let now = timestamp(now);
    AppInstanceStatus {
        last_reconciliation: Some(now.clone()),
        observed_spec_hash: Some(spec_hash.as_str().to_string()),
        resolved_templates: chain.to_vec(),
        conditions: vec![Condition::ready(
            &now,
            format!("All managed resources converged ({writes} writes)"),
        )],
    }
}

/// Status of an AppTemplate after its dependents were invalidated
#[must_use]
pub fn template_status(
    spec_hash: &SpecHash,
    invalidated: &[String],
    now: DateTime<Utc>,
) -> AppTemplateStatus {
    AppTemplateStatus {
        last_reconciliation: Some(timestamp(now)),
        observed_spec_hash: Some(spec_hash.as_str().to_string()),
        invalidated_instances: invalidated.to_vec(),
    }
}
