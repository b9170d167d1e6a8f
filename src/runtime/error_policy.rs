//! # Error Policy
//!
//! Error handling and backoff for the controller watch loops.
//! Backoff state lives in the per-object state cache entry, so failures of one
//! object never delay another.

use crate::controller::error::ReconcilerError;
use crate::controller::reconciler::Reconciler;
use crate::crd::{AppInstance, AppTemplate};
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info};

fn requeue(
    kind: &str,
    id: &str,
    error: &ReconcilerError,
    backoff: std::time::Duration,
) -> Action {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = kind,
        resource.id = id,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {} {}: {}", kind, id, error);
    observability::metrics::increment_reconciliation_errors(error.class().as_str());

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero());
    info!(
        "📅 Next retry scheduled: {} (in {}s)",
        next_trigger_time.to_rfc3339(),
        backoff.as_secs()
    );

    observability::metrics::increment_requeues(error.class().as_str());
    Action::requeue(backoff)
}

/// Handle AppInstance reconciliation errors
pub fn handle_instance_error(
    obj: Arc<AppInstance>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let id = obj.id();
    let backoff = ctx.requeue_after_error(&ctx.instance_states, &id, error);
    requeue("AppInstance", &id, error, backoff)
}

/// Handle AppTemplate reconciliation errors
pub fn handle_template_error(
    obj: Arc<AppTemplate>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let id = obj.name_any();
    let backoff = ctx.requeue_after_error(&ctx.template_states, &id, error);
    requeue("AppTemplate", &id, error, backoff)
}
