//! # Types
//!
//! Core types for the reconcilers.

use crate::config::{BuilderConfig, ControllerConfig};
use crate::controller::error::{ErrorClass, ReconcilerError};
use crate::controller::mutex_registry::MutexRegistry;
use crate::controller::state_cache::StateCache;
use crate::controller::store::{KubeStore, ObjectStore};
use crate::crd::AppInstance;
use futures::channel::mpsc::UnboundedSender;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What a pass of the instance reconciler did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every managed resource converged
    Reconciled {
        /// Number of create/update/delete calls issued
        writes: usize,
        /// Templates walked during resolution, nearest first
        chain: Vec<String>,
    },
    /// Skipped by the state cache: unchanged spec inside the resync window
    Gated,
    /// The object no longer exists
    Gone,
}

/// What a pass of the template reconciler did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOutcome {
    /// Dependent instances (`namespace/name`) were invalidated
    Invalidated(Vec<String>),
    /// The template is gone or terminating; its dependents were invalidated
    Deleted(Vec<String>),
    Gated,
}

/// Shared context of both reconcilers
///
/// One per process. Holds the only process-wide mutable state: the two state
/// caches and the mutex registry.
pub struct Reconciler<S: ObjectStore = KubeStore> {
    pub store: Arc<S>,
    pub config: ControllerConfig,
    pub builders: BuilderConfig,
    /// Debounce gate of AppInstances, keyed by `<name>_<namespace>`
    pub instance_states: StateCache,
    /// Debounce gate of AppTemplates, keyed by name
    pub template_states: StateCache,
    pub locks: MutexRegistry,
    /// Enqueues instances with the AppInstance controller
    trigger: Option<UnboundedSender<ObjectRef<AppInstance>>>,
}

impl<S: ObjectStore> std::fmt::Debug for Reconciler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("instance_states", &self.instance_states.len())
            .field("template_states", &self.template_states.len())
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore> Reconciler<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: ControllerConfig, builders: BuilderConfig) -> Self {
        let state_cache = || {
            StateCache::new(
                config.resync_window(),
                config.backoff_min_secs,
                config.backoff_max_secs,
            )
        };
        Self {
            instance_states: state_cache(),
            template_states: state_cache(),
            store,
            config,
            builders,
            locks: MutexRegistry::new(),
            trigger: None,
        }
    }

    /// Enqueue invalidated instances through `trigger`
    #[must_use]
    pub fn with_trigger(mut self, trigger: UnboundedSender<ObjectRef<AppInstance>>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Ask the AppInstance controller to reconcile `namespace/name` soon
    pub(crate) fn enqueue(&self, name: &str, namespace: &str) {
        let Some(trigger) = &self.trigger else {
            return;
        };
        if trigger
            .unbounded_send(ObjectRef::new(name).within(namespace))
            .is_err()
        {
            debug!("AppInstance trigger closed, {}/{} not enqueued", namespace, name);
        }
    }

    /// Requeue interval after a failed pass over the object identified by `id`
    ///
    /// Configuration errors wait a fixed, long interval; everything else follows the
    /// object's Fibonacci backoff, which advances here and resets on success.
    pub fn requeue_after_error(
        &self,
        states: &StateCache,
        id: &str,
        error: &ReconcilerError,
    ) -> Duration {
        let (backoff, error_count) = states.record_failure(id);
        if error.class() == ErrorClass::Configuration {
            info!(
                "⏸️ Configuration error for {} (attempt {}), waiting {}s for the spec to change",
                id,
                error_count,
                self.config.configuration_error_requeue_secs
            );
            return self.config.configuration_error_requeue();
        }
        info!(
            "🔄 Retrying {} with Fibonacci backoff: {}s (error count: {})",
            id,
            backoff.as_secs(),
            error_count
        );
        backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::store::MemoryStore;
    use futures::StreamExt;

    fn reconciler() -> Reconciler<MemoryStore> {
        Reconciler::new(
            Arc::new(MemoryStore::new()),
            ControllerConfig::default(),
            BuilderConfig::default(),
        )
    }

    #[test]
    fn test_transient_errors_follow_backoff() {
        let reconciler = reconciler();
        let error = ReconcilerError::TemplateNotFound("base".into());
        let states = &reconciler.instance_states;
        assert_eq!(
            reconciler.requeue_after_error(states, "web_apps", &error),
            Duration::from_secs(10)
        );
        assert_eq!(
            reconciler.requeue_after_error(states, "web_apps", &error),
            Duration::from_secs(10)
        );
        assert_eq!(
            reconciler.requeue_after_error(states, "web_apps", &error),
            Duration::from_secs(20)
        );
        assert_eq!(states.get("web_apps").unwrap().error_count, 3);
    }

    #[test]
    fn test_configuration_errors_wait_fixed_interval() {
        let reconciler = reconciler();
        let error = ReconcilerError::configuration("secretStoreRef is not set");
        let states = &reconciler.instance_states;
        for _ in 0..3 {
            assert_eq!(
                reconciler.requeue_after_error(states, "web_apps", &error),
                Duration::from_secs(300)
            );
        }
    }

    #[tokio::test]
    async fn test_enqueue_sends_object_ref() {
        let (tx, mut rx) = futures::channel::mpsc::unbounded();
        let reconciler = reconciler().with_trigger(tx);
        reconciler.enqueue("web", "apps");
        let object = rx.next().await.unwrap();
        assert_eq!(object.name, "web");
        assert_eq!(object.namespace.as_deref(), Some("apps"));
    }
}
