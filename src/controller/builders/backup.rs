//! Expected longhorn RecurringJob backing up the claims of an instance.
//!
//! The job lives in the backup namespace, so it cannot be owned by the AppInstance.
//! It is owned by the longhorn Volume behind the first bound claim instead, and
//! carries no owner until a claim is bound.

use super::volumes::recurring_job_name;
use super::{required, standard_labels, ResolvedSpec};
use crate::config::BuilderConfig;
use crate::controller::error::ReconcilerError;
use crate::crd::{LonghornVolume, RecurringJob, RecurringJobSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

const CONCURRENCY: i32 = 1;

/// Owner reference pointing at a longhorn Volume
#[must_use]
pub fn volume_owner(volume: &LonghornVolume) -> OwnerReference {
    OwnerReference {
        api_version: LonghornVolume::api_version(&()).to_string(),
        kind: LonghornVolume::kind(&()).to_string(),
        name: volume.name_any(),
        uid: volume.uid().unwrap_or_default(),
        controller: None,
        block_owner_deletion: None,
    }
}

/// Build the RecurringJob `<name>-<namespace>`, `None` when `backup` is unset
pub fn build_recurring_job(
    resolved: &ResolvedSpec,
    config: &BuilderConfig,
    owner: Option<OwnerReference>,
) -> Result<Option<RecurringJob>, ReconcilerError> {
    let Some(backup) = resolved.spec.backup.as_ref() else {
        return Ok(None);
    };
    let cron = required(backup.frequency.as_ref(), "backup", "schedule", "frequency")?;
    let retain = backup
        .retain
        .ok_or_else(|| ReconcilerError::configuration("backup schedule has no retain"))?;

    let job_name = recurring_job_name(resolved.name(), resolved.namespace());
    let labels = standard_labels(resolved.name());

    Ok(Some(RecurringJob {
        metadata: ObjectMeta {
            name: Some(job_name.clone()),
            namespace: Some(config.backup_namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: owner.map(|o| vec![o]),
            ..Default::default()
        },
        spec: RecurringJobSpec {
            name: job_name,
            groups: Vec::new(),
            task: "backup".to_string(),
            cron: cron.to_string(),
            retain,
            concurrency: CONCURRENCY,
            labels,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::builders::fixtures::resolved;
    use crate::crd::{AppInstanceSpec, BackupSchedule, LonghornVolumeSpec};

    fn backed_up() -> AppInstanceSpec {
        AppInstanceSpec {
            backup: Some(BackupSchedule {
                frequency: Some("0 3 * * *".into()),
                retain: Some(7),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_recurring_job() {
        let job = build_recurring_job(&resolved(backed_up()), &BuilderConfig::default(), None)
            .unwrap()
            .unwrap();
        assert_eq!(job.metadata.name.as_deref(), Some("web-apps"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("longhorn-system"));
        assert!(job.metadata.owner_references.is_none());
        assert_eq!(job.spec.name, "web-apps");
        assert_eq!(job.spec.task, "backup");
        assert_eq!(job.spec.cron, "0 3 * * *");
        assert_eq!(job.spec.retain, 7);
        assert_eq!(job.spec.concurrency, 1);
        assert!(job.spec.groups.is_empty());
    }

    #[test]
    fn test_owned_by_volume() {
        let mut volume = LonghornVolume::new("pvc-1234", LonghornVolumeSpec::default());
        volume.metadata.uid = Some("vol-uid".into());
        let owner = volume_owner(&volume);
        assert_eq!(owner.api_version, "longhorn.io/v1beta2");
        assert_eq!(owner.kind, "Volume");

        let job = build_recurring_job(
            &resolved(backed_up()),
            &BuilderConfig::default(),
            Some(owner),
        )
        .unwrap()
        .unwrap();
        let owners = job.metadata.owner_references.unwrap();
        assert_eq!(owners[0].name, "pvc-1234");
        assert_eq!(owners[0].uid, "vol-uid");
    }

    #[test]
    fn test_absent_without_backup() {
        assert!(build_recurring_job(
            &resolved(AppInstanceSpec::default()),
            &BuilderConfig::default(),
            None
        )
        .unwrap()
        .is_none());
    }
}
