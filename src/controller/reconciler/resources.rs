//! # Sub-reconciles
//!
//! One sub-reconcile per managed resource kind. Each builds its expected state from
//! the resolved spec, then converges every resource it owns, holding that
//! resource's mutex around the read and the write.

use super::types::Reconciler;
use crate::constants::LABEL_APP_BUNDLE;
use crate::controller::builders::backup::volume_owner;
use crate::controller::builders::volumes::{is_managed_claim, recurring_job_name};
use crate::controller::builders::{
    build_claims, build_config_map, build_deployment, build_external_secret, build_ingresses,
    build_recurring_job, build_service, ResolvedSpec,
};
use crate::controller::diff::{upsert, UpdateStrategy, UpsertOutcome};
use crate::controller::error::ReconcilerError;
use crate::controller::store::{
    LabelFilter, ManagedResource, ManagedResourceKey, ObjectStore,
};
use crate::crd::{AppInstance, ExternalSecret, LonghornVolume, RecurringJob};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeSet;
use tracing::debug;

/// Number of writes a sub-reconcile issued
pub type Writes = usize;

fn writes(outcome: UpsertOutcome) -> Writes {
    usize::from(outcome.is_write())
}

/// The AppInstance controlling `object`, as `(name, uid)`
fn controlling_instance<K: ManagedResource>(object: &K) -> Option<(&str, &str)> {
    object
        .meta()
        .owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true) && owner.kind == AppInstance::kind(&()))
        .map(|owner| (owner.name.as_str(), owner.uid.as_str()))
}

/// Refuse to take over an object that another instance controls
fn check_ownership<K: ManagedResource>(expected: &K, current: &K) -> Result<(), ReconcilerError> {
    let (Some((_, ours)), Some((owner, theirs))) =
        (controlling_instance(expected), controlling_instance(current))
    else {
        return Ok(());
    };
    if ours == theirs {
        return Ok(());
    }
    Err(ReconcilerError::OwnershipConflict {
        kind: K::KIND,
        name: current.name_any(),
        owner: owner.to_string(),
    })
}

impl<S: ObjectStore> Reconciler<S> {
    /// Converge the `K` named `name` in `namespace` towards `expected` under its mutex
    ///
    /// An existing object controlled by a different AppInstance is left untouched
    /// and reported as [`ReconcilerError::OwnershipConflict`].
    pub async fn converge<K: ManagedResource>(
        &self,
        expected: Option<&K>,
        name: &str,
        namespace: &str,
        strategy: UpdateStrategy,
    ) -> Result<UpsertOutcome, ReconcilerError> {
        let key = ManagedResourceKey::new(K::KIND, name, namespace);
        let _guard = self.locks.lock(&key).await;
        let current = self.store.get::<K>(name, namespace).await;
        if let (Some(expected), Ok(Some(current))) = (expected, &current) {
            check_ownership(expected, current)?;
        }
        let outcome = upsert(&*self.store, expected, current, strategy).await?;
        debug!("{} converged: {:?}", key, outcome);
        Ok(outcome)
    }

    pub(crate) async fn reconcile_deployment(
        &self,
        resolved: &ResolvedSpec,
    ) -> Result<Writes, ReconcilerError> {
        let expected = build_deployment(resolved, &self.builders)?;
        self.converge::<Deployment>(
            Some(&expected),
            resolved.name(),
            resolved.namespace(),
            UpdateStrategy::InPlaceOrRecreate,
        )
        .await
        .map(writes)
    }

    pub(crate) async fn reconcile_service(
        &self,
        resolved: &ResolvedSpec,
    ) -> Result<Writes, ReconcilerError> {
        let expected = build_service(resolved)?;
        self.converge::<Service>(
            expected.as_ref(),
            resolved.name(),
            resolved.namespace(),
            UpdateStrategy::InPlaceOrRecreate,
        )
        .await
        .map(writes)
    }

    /// Converge declared ingresses, then delete labelled ingresses of the instance
    /// that are no longer declared
    pub(crate) async fn reconcile_ingresses(
        &self,
        resolved: &ResolvedSpec,
    ) -> Result<Writes, ReconcilerError> {
        let expected = build_ingresses(resolved, &self.builders)?;
        let mut total = 0;
        let mut declared = BTreeSet::new();

        for ingress in &expected {
            let name = ingress.name_any();
            total += writes(
                self.converge(
                    Some(ingress),
                    &name,
                    resolved.namespace(),
                    UpdateStrategy::InPlaceOrRecreate,
                )
                .await?,
            );
            declared.insert(name);
        }

        let filter = LabelFilter::from([(LABEL_APP_BUNDLE.to_string(), resolved.name().to_string())]);
        let existing = self
            .store
            .list::<Ingress>(Some(resolved.namespace()), &filter)
            .await?;
        for stale in existing
            .iter()
            .map(ResourceExt::name_any)
            .filter(|name| !declared.contains(name))
        {
            total += writes(
                self.converge::<Ingress>(
                    None,
                    &stale,
                    resolved.namespace(),
                    UpdateStrategy::InPlace,
                )
                .await?,
            );
        }

        Ok(total)
    }

    /// Create or resize claims; claims are never deleted or recreated
    pub(crate) async fn reconcile_claims(
        &self,
        resolved: &ResolvedSpec,
    ) -> Result<Writes, ReconcilerError> {
        let mut total = 0;
        for claim in build_claims(resolved)? {
            total += writes(
                self.converge(
                    Some(&claim),
                    &claim.name_any(),
                    resolved.namespace(),
                    UpdateStrategy::InPlace,
                )
                .await?,
            );
        }
        Ok(total)
    }

    pub(crate) async fn reconcile_config_map(
        &self,
        resolved: &ResolvedSpec,
    ) -> Result<Writes, ReconcilerError> {
        let expected = build_config_map(resolved)?;
        self.converge::<ConfigMap>(
            expected.as_ref(),
            resolved.name(),
            resolved.namespace(),
            UpdateStrategy::InPlace,
        )
        .await
        .map(writes)
    }

    pub(crate) async fn reconcile_external_secret(
        &self,
        resolved: &ResolvedSpec,
    ) -> Result<Writes, ReconcilerError> {
        let expected = build_external_secret(resolved)?;
        self.converge::<ExternalSecret>(
            expected.as_ref(),
            resolved.name(),
            resolved.namespace(),
            UpdateStrategy::Replace,
        )
        .await
        .map(writes)
    }

    pub(crate) async fn reconcile_backup(
        &self,
        resolved: &ResolvedSpec,
    ) -> Result<Writes, ReconcilerError> {
        let owner = if resolved.spec.backup.is_some() {
            self.backup_owner(resolved).await?
        } else {
            None
        };
        let expected = build_recurring_job(resolved, &self.builders, owner)?;
        self.converge::<RecurringJob>(
            expected.as_ref(),
            &recurring_job_name(resolved.name(), resolved.namespace()),
            &self.builders.backup_namespace,
            UpdateStrategy::InPlace,
        )
        .await
        .map(writes)
    }

    /// Owner of the backup job: the longhorn Volume behind the first bound claim
    /// included in backups
    async fn backup_owner(
        &self,
        resolved: &ResolvedSpec,
    ) -> Result<Option<OwnerReference>, ReconcilerError> {
        let claims = resolved
            .spec
            .volumes
            .iter()
            .flatten()
            .filter(|(_, volume)| is_managed_claim(volume) && volume.backup.unwrap_or(false))
            .map(|(key, _)| format!("{}-{key}", resolved.name()));

        for claim_name in claims {
            let Some(claim) = self
                .store
                .get::<PersistentVolumeClaim>(&claim_name, resolved.namespace())
                .await?
            else {
                continue;
            };
            let bound = claim
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                == Some("Bound");
            let Some(volume_name) = claim.spec.as_ref().and_then(|s| s.volume_name.clone()) else {
                continue;
            };
            if !bound {
                continue;
            }
            if let Some(volume) = self
                .store
                .get::<LonghornVolume>(&volume_name, &self.builders.backup_namespace)
                .await?
            {
                return Ok(Some(volume_owner(&volume)));
            }
        }
        Ok(None)
    }
}
