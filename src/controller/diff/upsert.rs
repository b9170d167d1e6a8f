//! The upsert decision.

use super::derivative::is_derivative;
use super::metadata::{annotation_drift, label_drift, owner_drift};
use super::paths::{changed_paths, labels_reason, spec_reason};
use crate::controller::error::ReconcilerError;
use crate::controller::store::{ManagedResource, ObjectStore};
use crate::observability;
use kube::{Resource, ResourceExt};
use tracing::{info, warn};

/// How drift on an existing resource is corrected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Update in place; immutable-field conflicts are propagated
    InPlace,
    /// Update in place, falling back to delete-then-create on an immutable-field conflict
    InPlaceOrRecreate,
    /// Always correct drift by delete-then-create
    Replace,
}

/// What the upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Current already matches expected
    Unchanged,
    Created,
    Updated,
    /// Deleted and created again
    Recreated,
    /// Expected absent, current deleted
    Deleted,
    /// Neither expected nor current exist
    Absent,
}

impl UpsertOutcome {
    /// Whether the store was written to
    #[must_use]
    pub fn is_write(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged | UpsertOutcome::Absent)
    }
}

/// Why `current` must be corrected to match `expected`, or `None` when it already does
///
/// The spec part uses the derivative comparison; labels and annotations must match
/// exactly and every expected owner must be present.
pub fn drift_reason<K: ManagedResource>(
    expected: &K,
    current: &K,
) -> Result<Option<String>, ReconcilerError> {
    let mut reasons = Vec::new();

    let expected_body = expected.comparable()?;
    let current_body = current.comparable()?;
    if !is_derivative(&expected_body, &current_body) {
        reasons.push(spec_reason(&changed_paths(&expected_body, &current_body)));
    }

    let labels = label_drift(expected.meta().labels.as_ref(), current.meta().labels.as_ref());
    if !labels.is_empty() {
        reasons.push(labels_reason(&labels));
    }

    let annotations = annotation_drift(
        expected.meta().annotations.as_ref(),
        current.meta().annotations.as_ref(),
    );
    if !annotations.is_empty() {
        reasons.push(format!(
            "Annotations changed, namely the paths: {}",
            annotations.join(", ")
        ));
    }

    if owner_drift(
        expected.meta().owner_references.as_ref(),
        current.meta().owner_references.as_ref(),
    ) {
        reasons.push("Owner references changed".to_string());
    }

    Ok((!reasons.is_empty()).then(|| reasons.join("; ")))
}

/// Converge the stored object towards `expected`
///
/// `current` is the result of reading the object: a read error aborts the upsert
/// untouched. `expected == None` means the object should not exist.
pub async fn upsert<S, K>(
    store: &S,
    expected: Option<&K>,
    current: Result<Option<K>, ReconcilerError>,
    strategy: UpdateStrategy,
) -> Result<UpsertOutcome, ReconcilerError>
where
    S: ObjectStore,
    K: ManagedResource,
{
    let current = current?;
    let kind = K::KIND.as_str();

    match (expected, current) {
        (None, None) => Ok(UpsertOutcome::Absent),
        (None, Some(current)) => {
            let name = current.name_any();
            let namespace = current.namespace().unwrap_or_default();
            info!(
                "🗑️ Deleting {} {}/{}: no longer declared",
                kind, namespace, name
            );
            store.delete::<K>(&name, &namespace).await?;
            observability::metrics::increment_resource_writes(kind, "delete");
            Ok(UpsertOutcome::Deleted)
        }
        (Some(expected), None) => {
            info!(
                "✨ Creating {} {}/{}",
                kind,
                expected.namespace().unwrap_or_default(),
                expected.name_any()
            );
            store.create(expected).await?;
            observability::metrics::increment_resource_writes(kind, "create");
            Ok(UpsertOutcome::Created)
        }
        (Some(expected), Some(current)) => {
            let Some(reason) = drift_reason(expected, &current)? else {
                return Ok(UpsertOutcome::Unchanged);
            };
            let name = expected.name_any();
            let namespace = expected.namespace().unwrap_or_default();
            info!(
                "📝 Upserting {} {}/{} because: {}",
                kind, namespace, name, reason
            );

            if strategy == UpdateStrategy::Replace {
                recreate(store, expected).await?;
                return Ok(UpsertOutcome::Recreated);
            }

            match store.update(expected).await {
                Ok(_) => {
                    observability::metrics::increment_resource_writes(kind, "update");
                    Ok(UpsertOutcome::Updated)
                }
                Err(e)
                    if e.is_immutable_field_conflict()
                        && strategy == UpdateStrategy::InPlaceOrRecreate =>
                {
                    warn!(
                        "♻️ {} {}/{} cannot be updated in place, recreating: {}",
                        kind, namespace, name, e
                    );
                    recreate(store, expected).await?;
                    Ok(UpsertOutcome::Recreated)
                }
                Err(e) => Err(e),
            }
        }
    }
}

async fn recreate<S: ObjectStore, K: ManagedResource>(
    store: &S,
    expected: &K,
) -> Result<(), ReconcilerError> {
    let kind = K::KIND.as_str();
    store
        .delete::<K>(
            &expected.name_any(),
            &expected.namespace().unwrap_or_default(),
        )
        .await?;
    observability::metrics::increment_resource_writes(kind, "delete");
    store.create(expected).await?;
    observability::metrics::increment_resource_writes(kind, "create");
    Ok(())
}
