//! Common test utilities for the reconciler integration tests
//!
//! Provides an in-memory reconciler and AppInstance/AppTemplate fixtures.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use app_bundle_controller::config::{BuilderConfig, ControllerConfig};
use app_bundle_controller::controller::reconciler::Reconciler;
use app_bundle_controller::controller::store::MemoryStore;
use app_bundle_controller::crd::{
    AppImage, AppInstance, AppInstanceSpec, ConfigEntry, Route, RouteIngress, Volume,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAMESPACE: &str = "apps";

/// Reconciler over an empty in-memory store with default configuration
pub fn reconciler() -> Reconciler<MemoryStore> {
    reconciler_over(MemoryStore::new())
}

/// Reconciler over `store` with default configuration
pub fn reconciler_over(store: MemoryStore) -> Reconciler<MemoryStore> {
    Reconciler::new(
        Arc::new(store),
        ControllerConfig::default(),
        BuilderConfig::default(),
    )
}

/// Fixed starting instant, so resync windows are deterministic
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn image(repository: &str, tag: &str) -> AppImage {
    AppImage {
        repository: Some(repository.into()),
        tag: Some(tag.into()),
        pull_policy: None,
    }
}

/// A web app with one public route, one managed volume and one inline config
pub fn web_spec() -> AppInstanceSpec {
    AppInstanceSpec {
        image: Some(image("nginx", "1.27")),
        routes: Some(BTreeMap::from([(
            "web".to_string(),
            Route {
                port: Some(80),
                ingress: Some(RouteIngress {
                    domain: Some("web.example.com".into()),
                    auth: None,
                }),
                ..Default::default()
            },
        )])),
        volumes: Some(BTreeMap::from([(
            "data".to_string(),
            Volume {
                path: Some("/data".into()),
                size: Some("1Gi".into()),
                ..Default::default()
            },
        )])),
        configs: Some(BTreeMap::from([(
            "nginx".to_string(),
            ConfigEntry {
                file_name: Some("nginx.conf".into()),
                content: Some("worker_processes 1;".into()),
                dir_path: Some("/etc/nginx".into()),
                ..Default::default()
            },
        )])),
        ..Default::default()
    }
}

/// Store an AppInstance `name` in [`NAMESPACE`]
pub fn insert_instance(store: &MemoryStore, name: &str, spec: AppInstanceSpec) -> AppInstance {
    let mut instance = AppInstance::new(name, spec);
    instance.metadata.namespace = Some(NAMESPACE.to_string());
    instance.metadata.uid = Some(format!("uid-{name}"));
    store.insert(&instance).unwrap();
    instance
}
