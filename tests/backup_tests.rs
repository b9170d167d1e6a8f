//! # Backup Job Tests
//!
//! The longhorn RecurringJob follows the instance's `backup` schedule and is owned
//! by the Volume behind the first bound claim included in backups.

mod common;

use app_bundle_controller::controller::reconciler::ReconcileOutcome;
use app_bundle_controller::controller::store::{Operation, ResourceKind};
use app_bundle_controller::crd::{
    AppInstanceSpec, BackupSchedule, LonghornVolume, LonghornVolumeSpec, RecurringJob,
};
use chrono::Duration;
use common::{insert_instance, reconciler, t0, web_spec, NAMESPACE};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimStatus};

const BACKUP_NAMESPACE: &str = "longhorn-system";

fn backed_up_spec() -> AppInstanceSpec {
    let mut spec = web_spec();
    spec.backup = Some(BackupSchedule {
        frequency: Some("0 3 * * *".into()),
        retain: Some(7),
    });
    if let Some(volume) = spec.volumes.as_mut().and_then(|v| v.get_mut("data")) {
        volume.backup = Some(true);
    }
    spec
}

#[tokio::test]
async fn test_job_waits_for_bound_claim_before_taking_an_owner() {
    let reconciler = reconciler();
    let store = &reconciler.store;
    insert_instance(store, "web", backed_up_spec());

    let outcome = reconciler
        .reconcile_instance_at(NAMESPACE, "web", t0())
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Reconciled { writes: 6, .. }));

    let job = store
        .peek::<RecurringJob>("web-apps", BACKUP_NAMESPACE)
        .unwrap();
    assert!(job.metadata.owner_references.is_none());
    assert_eq!(job.spec.cron, "0 3 * * *");

    let claim = store
        .peek::<PersistentVolumeClaim>("web-data", NAMESPACE)
        .unwrap();
    let labels = claim.metadata.labels.clone().unwrap();
    assert_eq!(
        labels
            .get("recurring-job.longhorn.io/web-apps")
            .map(String::as_str),
        Some("enabled")
    );

    // The claim gets bound to a longhorn volume
    let mut bound = claim.clone();
    bound.metadata.labels = Some(labels);
    if let Some(spec) = bound.spec.as_mut() {
        spec.volume_name = Some("pvc-1234".into());
    }
    bound.status = Some(PersistentVolumeClaimStatus {
        phase: Some("Bound".into()),
        ..Default::default()
    });
    store.insert(&bound).unwrap();
    let mut volume = LonghornVolume::new("pvc-1234", LonghornVolumeSpec::default());
    volume.metadata.namespace = Some(BACKUP_NAMESPACE.to_string());
    volume.metadata.uid = Some("vol-uid".into());
    store.insert(&volume).unwrap();
    store.clear_journal();

    reconciler
        .reconcile_instance_at(NAMESPACE, "web", t0() + Duration::seconds(31))
        .await
        .unwrap();

    let job = store
        .peek::<RecurringJob>("web-apps", BACKUP_NAMESPACE)
        .unwrap();
    let owners = job.metadata.owner_references.unwrap();
    assert_eq!(owners[0].kind, "Volume");
    assert_eq!(owners[0].uid, "vol-uid");
    assert_eq!(store.count(ResourceKind::RecurringJob, Operation::Update), 1);
    // The bound claim itself did not drift
    assert_eq!(
        store.count(ResourceKind::PersistentVolumeClaim, Operation::Update),
        0
    );
}

#[tokio::test]
async fn test_job_removed_with_schedule() {
    let reconciler = reconciler();
    let store = &reconciler.store;
    insert_instance(store, "web", backed_up_spec());
    reconciler
        .reconcile_instance_at(NAMESPACE, "web", t0())
        .await
        .unwrap();
    assert_eq!(store.len_of(ResourceKind::RecurringJob), 1);

    insert_instance(store, "web", web_spec());
    reconciler
        .reconcile_instance_at(NAMESPACE, "web", t0() + Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(store.len_of(ResourceKind::RecurringJob), 0);
    // Claims are never deleted, even when they leave the backup set
    assert!(store
        .peek::<PersistentVolumeClaim>("web-data", NAMESPACE)
        .is_some());
}
