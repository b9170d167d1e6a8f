//! Expected ConfigMap holding the inline config files of an instance.

use super::{config_source, owned_meta, ConfigSource, ResolvedSpec};
use crate::controller::error::ReconcilerError;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeMap;

/// Build the ConfigMap `<name>`, `None` when no config carries inline content
pub fn build_config_map(resolved: &ResolvedSpec) -> Result<Option<ConfigMap>, ReconcilerError> {
    let mut data = BTreeMap::new();
    for (key, entry) in resolved.spec.configs.iter().flatten() {
        if let ConfigSource::Inline(content) = config_source(key, entry)? {
            data.insert(key.clone(), content.to_string());
        }
    }

    if data.is_empty() {
        return Ok(None);
    }

    Ok(Some(ConfigMap {
        metadata: owned_meta(resolved, resolved.name()),
        data: Some(data),
        ..Default::default()
    }))
}
