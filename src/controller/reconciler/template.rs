//! # Template Reconciliation
//!
//! AppTemplates own no resources. A changed (or deleted) template invalidates the
//! state cache entry of every instance whose chain passes through it and enqueues
//! those instances, so the next instance pass re-resolves instead of being gated.
//!
//! Templates carry a finalizer so that deletion is observed: a terminating template
//! invalidates its dependents before the finalizer is released.

use super::status::template_status;
use super::types::{Reconciler, TemplateOutcome};
use crate::controller::error::ReconcilerError;
use crate::controller::state_cache::SpecHash;
use crate::constants::TEMPLATE_FINALIZER;
use crate::controller::store::{LabelFilter, ManagedResourceKey, ObjectStore, ResourceKind};
use crate::crd::{instance_id, AppInstance, AppTemplate};
use crate::observability;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Instrument};

/// Whether the chain starting at `base` passes through `template`
///
/// `parents` maps every known template to its own base. A chain that loops is
/// walked once.
fn chain_contains(
    base: Option<&str>,
    template: &str,
    parents: &HashMap<String, Option<String>>,
) -> bool {
    let mut visited = HashSet::new();
    let mut next = base.filter(|b| !b.is_empty());
    while let Some(current) = next {
        if current == template {
            return true;
        }
        if !visited.insert(current) {
            return false;
        }
        next = parents
            .get(current)
            .and_then(|parent| parent.as_deref())
            .filter(|p| !p.is_empty());
    }
    false
}

impl<S: ObjectStore> Reconciler<S> {
    /// Instances whose template chain passes through `template`, as `(name, namespace)`
    pub async fn dependents_of(
        &self,
        template: &str,
    ) -> Result<Vec<(String, String)>, ReconcilerError> {
        let parents: HashMap<String, Option<String>> = self
            .store
            .list_templates()
            .await?
            .into_iter()
            .map(|t| (t.name_any(), t.spec.parent().map(str::to_string)))
            .collect();

        let instances = self
            .store
            .list::<AppInstance>(self.config.watch_namespace.as_deref(), &LabelFilter::new())
            .await?;

        let mut dependents: Vec<(String, String)> = instances
            .iter()
            .filter(|i| chain_contains(i.spec.base.as_deref(), template, &parents))
            .map(|i| (i.name_any(), i.namespace().unwrap_or_default()))
            .collect();
        dependents.sort();
        Ok(dependents)
    }

    /// Reconcile the AppTemplate `name`
    pub async fn reconcile_template(&self, name: &str) -> Result<TemplateOutcome, ReconcilerError> {
        self.reconcile_template_at(name, Utc::now()).await
    }

    /// [`Self::reconcile_template`] with the state cache evaluated at `now`
    pub async fn reconcile_template_at(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<TemplateOutcome, ReconcilerError> {
        let key = ManagedResourceKey::new(ResourceKind::AppTemplate, name, "");
        let _guard = self.locks.lock(&key).await;

        let Some(template) = self.store.fetch_template(name).await? else {
            info!("🗑️ AppTemplate {} deleted, invalidating dependents", name);
            return self.forget_template(name).await;
        };

        if template.metadata.deletion_timestamp.is_some() {
            info!("🗑️ AppTemplate {} is being deleted, invalidating dependents", name);
            let outcome = self.forget_template(name).await?;
            let remaining: Vec<String> = template
                .finalizers()
                .iter()
                .filter(|f| f.as_str() != TEMPLATE_FINALIZER)
                .cloned()
                .collect();
            if remaining.len() != template.finalizers().len() {
                self.store.patch_template_finalizers(name, &remaining).await?;
            }
            return Ok(outcome);
        }

        if !template.finalizers().iter().any(|f| f == TEMPLATE_FINALIZER) {
            debug!("Adding finalizer to AppTemplate {}", name);
            let mut finalizers = template.finalizers().to_vec();
            finalizers.push(TEMPLATE_FINALIZER.to_string());
            self.store.patch_template_finalizers(name, &finalizers).await?;
        }

        let spec_hash = SpecHash::of(&template.spec)?;
        self.template_states.register_if_absent(name);
        if !self
            .template_states
            .needs_reconciliation_at(name, &spec_hash, now)
        {
            debug!("AppTemplate {} unchanged, skipping", name);
            observability::metrics::increment_gated_reconciliations();
            return Ok(TemplateOutcome::Gated);
        }

        let invalidated = self.invalidate_dependents(name).await?;
        self.store
            .patch_template_status(name, &template_status(&spec_hash, &invalidated, now))
            .await?;
        self.template_states.mark_reconciled_at(name, spec_hash, now);

        Ok(TemplateOutcome::Invalidated(invalidated))
    }

    async fn forget_template(&self, name: &str) -> Result<TemplateOutcome, ReconcilerError> {
        let invalidated = self.invalidate_dependents(name).await?;
        self.template_states.forget(name);
        Ok(TemplateOutcome::Deleted(invalidated))
    }

    /// Invalidate and enqueue every dependent of `template`, returning `namespace/name`s
    async fn invalidate_dependents(&self, template: &str) -> Result<Vec<String>, ReconcilerError> {
        let dependents = self.dependents_of(template).await?;
        let mut invalidated = Vec::with_capacity(dependents.len());

        for (name, namespace) in dependents {
            {
                let key = ManagedResourceKey::new(ResourceKind::AppInstance, &name, &namespace);
                let _guard = self.locks.lock(&key).await;
                self.instance_states
                    .invalidate(&instance_id(&name, &namespace));
            }
            self.enqueue(&name, &namespace);
            invalidated.push(format!("{namespace}/{name}"));
        }

        if !invalidated.is_empty() {
            info!(
                "♻️ AppTemplate {} changed, invalidated {} instance(s): {}",
                template,
                invalidated.len(),
                invalidated.join(", ")
            );
        }
        observability::metrics::increment_template_invalidations(invalidated.len());
        Ok(invalidated)
    }
}

/// Controller entrypoint for AppTemplates
///
/// Terminating templates are finalized here: the kube controller never calls back
/// for objects that are already gone.
pub async fn reconcile_template<S: ObjectStore>(
    template: Arc<AppTemplate>,
    ctx: Arc<Reconciler<S>>,
) -> Result<Action, ReconcilerError> {
    let name = template.name_any();
    let span = tracing::info_span!(
        "reconcile",
        resource.kind = "AppTemplate",
        resource.name = %name
    );

    async move {
        let start = Instant::now();
        observability::metrics::increment_reconciliations("apptemplate");

        let result = ctx.reconcile_template(&name).await;
        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        observability::metrics::set_state_cache_entries(ctx.instance_states.len());

        Ok(match result? {
            TemplateOutcome::Invalidated(_) => {
                observability::metrics::increment_requeues("resync");
                Action::requeue(ctx.config.resync_requeue())
            }
            TemplateOutcome::Deleted(_) => Action::await_change(),
            TemplateOutcome::Gated => {
                observability::metrics::increment_requeues("gated");
                Action::requeue(ctx.config.gated_requeue())
            }
        })
    }
    .instrument(span)
    .await
}
