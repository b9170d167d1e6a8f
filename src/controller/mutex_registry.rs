//! # Mutex Registry
//!
//! Hands out one async mutex per managed resource `(kind, name, namespace)`.
//!
//! Locks are created lazily on first request and never evicted, so the registry grows
//! with the number of distinct resources the process has touched, not with concurrency.
//! Every read-then-write sequence against a managed resource runs under its lock, which
//! serializes sibling sub-reconciles of one instance as well as different instances
//! racing for the same resource.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Kind of object the engine reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    AppInstance,
    AppTemplate,
    Deployment,
    Service,
    Ingress,
    PersistentVolumeClaim,
    ConfigMap,
    ExternalSecret,
    RecurringJob,
    LonghornVolume,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::AppInstance => "AppInstance",
            ResourceKind::AppTemplate => "AppTemplate",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::ExternalSecret => "ExternalSecret",
            ResourceKind::RecurringJob => "RecurringJob",
            ResourceKind::LonghornVolume => "Volume",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of any resource the engine reads or writes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedResourceKey {
    pub kind: ResourceKind,
    pub name: String,
    /// Empty for cluster-scoped objects
    pub namespace: String,
}

impl ManagedResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ManagedResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

type LockMap = HashMap<ResourceKind, HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>;

/// Registry of per-resource locks
#[derive(Debug, Default)]
pub struct MutexRegistry {
    locks: Mutex<LockMap>,
}

impl MutexRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or lazily create) the lock for `key`
    fn lock_for(&self, key: &ManagedResourceKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(key.kind)
            .or_default()
            .entry((key.name.clone(), key.namespace.clone()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `key`
    ///
    /// The registry map lock is released before waiting, so contention on one
    /// resource never blocks lookups of another. The returned guard releases on drop.
    pub async fn lock(&self, key: &ManagedResourceKey) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(key);
        lock.lock_owned().await
    }

    /// Number of locks handed out so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_exclusive() {
        let registry = Arc::new(MutexRegistry::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let key = ManagedResourceKey::new(ResourceKind::Deployment, "web", "default");

        let tasks = (0..16).map(|_| {
            let registry = Arc::clone(&registry);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = registry.lock(&key).await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        });
        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let registry = MutexRegistry::new();
        let web = ManagedResourceKey::new(ResourceKind::Service, "web", "default");
        let api = ManagedResourceKey::new(ResourceKind::Service, "api", "default");
        let web_ingress = ManagedResourceKey::new(ResourceKind::Ingress, "web", "default");

        let _a = registry.lock(&web).await;
        let b = tokio::time::timeout(Duration::from_millis(100), registry.lock(&api)).await;
        assert!(b.is_ok());
        let c = tokio::time::timeout(Duration::from_millis(100), registry.lock(&web_ingress)).await;
        assert!(c.is_ok());

        // same key is held
        let d = tokio::time::timeout(Duration::from_millis(20), registry.lock(&web)).await;
        assert!(d.is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_key_display() {
        let key = ManagedResourceKey::new(ResourceKind::AppTemplate, "base", "");
        assert_eq!(key.to_string(), "AppTemplate/base");
        let key = ManagedResourceKey::new(ResourceKind::ConfigMap, "web", "apps");
        assert_eq!(key.to_string(), "ConfigMap/apps/web");
    }
}
