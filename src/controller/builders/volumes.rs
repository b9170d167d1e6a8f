//! Expected PersistentVolumeClaims of an instance.

use super::{owned_meta, required, ResolvedSpec};
use crate::controller::error::ReconcilerError;
use crate::crd::Volume;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Whether the engine manages a claim for this volume
#[must_use]
pub fn is_managed_claim(volume: &Volume) -> bool {
    volume.host_path.as_deref().is_none_or(str::is_empty)
        && !volume.empty_dir.unwrap_or(false)
        && volume.existing_claim.as_deref().is_none_or(str::is_empty)
}

/// Name of the RecurringJob backing up claims of the instance
#[must_use]
pub fn recurring_job_name(name: &str, namespace: &str) -> String {
    format!("{name}-{namespace}")
}

/// Build one claim `<name>-<key>` per managed volume
pub fn build_claims(resolved: &ResolvedSpec) -> Result<Vec<PersistentVolumeClaim>, ReconcilerError> {
    let name = resolved.name();
    resolved
        .spec
        .volumes
        .iter()
        .flatten()
        .filter(|(_, volume)| is_managed_claim(volume))
        .map(|(key, volume)| {
            let size = required(volume.size.as_ref(), "volume", key, "size")?;

            let mut metadata = owned_meta(resolved, format!("{name}-{key}"));
            if volume.backup.unwrap_or(false) {
                let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
                for key in [
                    format!(
                        "recurring-job.longhorn.io/{}",
                        recurring_job_name(name, resolved.namespace())
                    ),
                    "recurring-job.longhorn.io/source".to_string(),
                    "recurring-job-group.longhorn.io/default".to_string(),
                ] {
                    labels.insert(key, "enabled".to_string());
                }
            }

            Ok(PersistentVolumeClaim {
                metadata,
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    storage_class_name: volume.storage_class.clone(),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity(size.to_string()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                status: None,
            })
        })
        .collect()
}
