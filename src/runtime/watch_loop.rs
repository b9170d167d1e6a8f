//! # Watch Loop
//!
//! Controller watch loops for AppInstances and AppTemplates.
//!
//! The AppInstance controller watches the instances and every kind they own, plus
//! the trigger stream fed by the template reconciler. The AppTemplate controller
//! watches templates cluster-wide.

use crate::controller::reconciler::{reconcile, reconcile_template, Reconciler};
use crate::controller::server::ServerState;
use crate::controller::store::KubeStore;
use crate::crd::{AppInstance, AppTemplate, ExternalSecret};
use crate::runtime::error_policy::{handle_instance_error, handle_template_error};
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::controller::{Action, Config as ControllerSettings, Error as ControllerError};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn};

type ControllerResult<K, E> = Result<(ObjectRef<K>, Action), ControllerError<E, watcher::Error>>;

/// Namespaced API in `namespace`, or across all namespaces
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

fn log_result<K, E>(kind: &str, result: ControllerResult<K, E>)
where
    K: Resource,
    E: std::error::Error + 'static,
{
    match result {
        Ok((object, _)) => debug!("watch.event.success: {}", object),
        // Watch events of owned objects can outlive their owner
        Err(ControllerError::ObjectNotFound(object)) => {
            debug!("{} {} no longer exists", kind, object);
        }
        Err(e) => warn!("{} controller event error: {}", kind, e),
    }
}

/// Run the AppInstance controller until shutdown
pub async fn run_instance_controller(
    client: Client,
    reconciler: Arc<Reconciler>,
    trigger: UnboundedReceiver<ObjectRef<AppInstance>>,
) {
    let namespace = reconciler.config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    let settings =
        ControllerSettings::default().concurrency(reconciler.config.max_concurrent_reconciliations);
    let owned = watcher::Config::default;

    info!(
        "Starting AppInstance controller (namespace: {})...",
        namespace.unwrap_or("all")
    );

    Controller::new(
        scoped_api::<AppInstance>(&client, namespace),
        watcher::Config::default().any_semantic(),
    )
    .owns(scoped_api::<Deployment>(&client, namespace), owned())
    .owns(scoped_api::<Service>(&client, namespace), owned())
    .owns(scoped_api::<Ingress>(&client, namespace), owned())
    .owns(scoped_api::<PersistentVolumeClaim>(&client, namespace), owned())
    .owns(scoped_api::<ConfigMap>(&client, namespace), owned())
    .owns(scoped_api::<ExternalSecret>(&client, namespace), owned())
    .reconcile_on(trigger)
    .with_config(settings)
    .shutdown_on_signal()
    .run(reconcile, handle_instance_error, reconciler)
    .for_each(|result| async move { log_result("AppInstance", result) })
    .await;

    info!("AppInstance controller stopped");
}

/// Run the AppTemplate controller until shutdown
pub async fn run_template_controller(client: Client, reconciler: Arc<Reconciler>) {
    let settings =
        ControllerSettings::default().concurrency(reconciler.config.max_concurrent_reconciliations);

    info!("Starting AppTemplate controller...");

    Controller::new(
        Api::<AppTemplate>::all(client),
        watcher::Config::default().any_semantic(),
    )
    .with_config(settings)
    .shutdown_on_signal()
    .run(reconcile_template::<KubeStore>, handle_template_error, reconciler)
    .for_each(|result| async move { log_result("AppTemplate", result) })
    .await;

    info!("AppTemplate controller stopped");
}

/// Run both controllers until shutdown, then mark the server as not ready
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    trigger: UnboundedReceiver<ObjectRef<AppInstance>>,
    server_state: Arc<ServerState>,
) {
    server_state.set_ready(true);

    futures::join!(
        run_instance_controller(client.clone(), Arc::clone(&reconciler), trigger),
        run_template_controller(client, reconciler),
    );

    server_state.set_ready(false);
    info!("Controllers stopped gracefully");
}
