//! # Reconciliation Logic
//!
//! The AppInstance orchestrator:
//!
//! `Fetch → GateByStateCache → ResolveTemplateChain → FanOutSubReconciles → Join → MarkReconciled`
//!
//! The gate is evaluated once per pass under the instance mutex only, before any
//! template is fetched. Sub-reconciles run concurrently; a failing one never cancels
//! its siblings, and the first error (in fan-out order) is returned once all of them
//! have finished.

use super::status::instance_status;
use super::types::{ReconcileOutcome, Reconciler};
use crate::controller::builders::{InstanceMeta, ResolvedSpec};
use crate::controller::error::ReconcilerError;
use crate::controller::merge::resolve;
use crate::controller::state_cache::SpecHash;
use crate::controller::store::{KubeStore, ManagedResourceKey, ObjectStore, ResourceKind};
use crate::crd::{instance_id, AppInstance};
use crate::observability;
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Sub-reconcile names, in fan-out order
pub const SUB_RECONCILES: [&str; 7] = [
    "deployment",
    "service",
    "ingresses",
    "claims",
    "config-map",
    "external-secret",
    "backup",
];

impl<S: ObjectStore> Reconciler<S> {
    /// Reconcile the AppInstance `namespace/name`
    pub async fn reconcile_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        self.reconcile_instance_at(namespace, name, Utc::now()).await
    }

    /// [`Self::reconcile_instance`] with the state cache evaluated at `now`
    pub async fn reconcile_instance_at(
        &self,
        namespace: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let key = ManagedResourceKey::new(ResourceKind::AppInstance, name, namespace);
        let _guard = self.locks.lock(&key).await;
        let id = instance_id(name, namespace);

        let Some(instance) = self.store.get::<AppInstance>(name, namespace).await? else {
            debug!("AppInstance {}/{} is gone, forgetting its state", namespace, name);
            self.instance_states.forget(&id);
            return Ok(ReconcileOutcome::Gone);
        };

        let spec_hash = SpecHash::of(&instance.spec)?;
        self.instance_states.register_if_absent(&id);
        if !self
            .instance_states
            .needs_reconciliation_at(&id, &spec_hash, now)
        {
            debug!("AppInstance {}/{} unchanged, skipping", namespace, name);
            observability::metrics::increment_gated_reconciliations();
            return Ok(ReconcileOutcome::Gated);
        }

        info!("🔄 Reconciling AppInstance {}/{}", namespace, name);

        let resolution = resolve(&instance.spec, &*self.store).await?;
        let resolved = ResolvedSpec {
            meta: InstanceMeta::from_instance(&instance),
            spec: resolution.spec,
            chain: resolution.chain,
        };

        let writes = self.fan_out(&resolved).await?;

        let status = instance_status(&spec_hash, &resolved.chain, writes, now);
        self.store
            .patch_instance_status(name, namespace, &status)
            .await?;
        self.instance_states.mark_reconciled_at(&id, spec_hash, now);

        info!(
            "✅ Reconciled AppInstance {}/{} ({} writes, templates: [{}])",
            namespace,
            name,
            writes,
            resolved.chain.join(", ")
        );
        Ok(ReconcileOutcome::Reconciled {
            writes,
            chain: resolved.chain,
        })
    }

    /// Run every sub-reconcile to completion and return the first error, if any
    async fn fan_out(&self, resolved: &ResolvedSpec) -> Result<usize, ReconcilerError> {
        let tasks: Vec<BoxFuture<'_, Result<usize, ReconcilerError>>> = vec![
            self.reconcile_deployment(resolved).boxed(),
            self.reconcile_service(resolved).boxed(),
            self.reconcile_ingresses(resolved).boxed(),
            self.reconcile_claims(resolved).boxed(),
            self.reconcile_config_map(resolved).boxed(),
            self.reconcile_external_secret(resolved).boxed(),
            self.reconcile_backup(resolved).boxed(),
        ];

        let mut writes = 0;
        let mut first_error = None;
        for (task, result) in SUB_RECONCILES.iter().zip(join_all(tasks).await) {
            match result {
                Ok(count) => writes += count,
                Err(error) => {
                    warn!(
                        "❌ Sub-reconcile {} of {}/{} failed: {}",
                        task,
                        resolved.namespace(),
                        resolved.name(),
                        error
                    );
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(writes),
        }
    }
}

/// Controller entrypoint for AppInstances
///
/// Errors are handled by the error policy, which applies the per-instance backoff.
pub async fn reconcile(
    instance: Arc<AppInstance>,
    ctx: Arc<Reconciler<KubeStore>>,
) -> Result<Action, ReconcilerError> {
    let name = instance.name_any();
    let namespace = instance.namespace().unwrap_or_default();
    let span = tracing::info_span!(
        "reconcile",
        resource.kind = "AppInstance",
        resource.name = %name,
        resource.namespace = %namespace
    );

    async move {
        let start = Instant::now();
        observability::metrics::increment_reconciliations("appinstance");

        let result = ctx.reconcile_instance(&namespace, &name).await;
        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        observability::metrics::set_state_cache_entries(ctx.instance_states.len());

        Ok(match result? {
            ReconcileOutcome::Reconciled { .. } => {
                observability::metrics::increment_requeues("resync");
                Action::requeue(ctx.config.resync_requeue())
            }
            ReconcileOutcome::Gated => {
                observability::metrics::increment_requeues("gated");
                Action::requeue(ctx.config.gated_requeue())
            }
            ReconcileOutcome::Gone => Action::await_change(),
        })
    }
    .instrument(span)
    .await
}
