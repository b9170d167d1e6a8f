//! Expected ExternalSecret projecting secret store entries into the Secret `<name>`.
//!
//! Sourced env `KEY` lands under `env<KEY>`, the rendered config file `key` under
//! `cfg<key>`; the Deployment mounts and references exactly those keys.

use super::{owned_meta, ResolvedSpec};
use crate::constants::EXTERNAL_SECRET_REFRESH_INTERVAL;
use crate::controller::error::ReconcilerError;
use crate::crd::{
    ExternalSecret, ExternalSecretData, ExternalSecretRemoteRef, ExternalSecretSpec,
    ExternalSecretTarget, ExternalSecretTemplate, SecretStoreRef,
};
use std::collections::BTreeMap;

/// Build the ExternalSecret `<name>`, `None` when nothing secret is declared
///
/// Secrets declared without `secretStoreRef` are a configuration error.
pub fn build_external_secret(
    resolved: &ResolvedSpec,
) -> Result<Option<ExternalSecret>, ReconcilerError> {
    let spec = &resolved.spec;

    // secret key -> remote key
    let mut remote: BTreeMap<String, String> = BTreeMap::new();
    let mut templates: BTreeMap<String, String> = BTreeMap::new();

    for (key, sourced) in spec.sourced_envs.iter().flatten() {
        if let Some(remote_key) = sourced.external_secret.as_ref().filter(|r| !r.is_empty()) {
            remote.insert(key.clone(), remote_key.clone());
            templates.insert(format!("env{key}"), format!("{{{{ .{key} }}}}"));
        }
    }
    for (key, entry) in spec.configs.iter().flatten() {
        if !entry.is_secret() {
            continue;
        }
        for (variable, remote_key) in entry.secrets.iter().flatten() {
            remote.insert(variable.clone(), remote_key.clone());
        }
        templates.insert(format!("cfg{key}"), entry.content.clone().unwrap_or_default());
    }

    if remote.is_empty() {
        return Ok(None);
    }

    let store = spec
        .secret_store_ref
        .as_ref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ReconcilerError::configuration("secrets are declared but secretStoreRef is not set")
        })?;

    let data = remote
        .into_iter()
        .map(|(secret_key, key)| ExternalSecretData {
            secret_key,
            remote_ref: ExternalSecretRemoteRef {
                key,
                decoding_strategy: Some("None".to_string()),
                conversion_strategy: Some("Default".to_string()),
                metadata_policy: Some("None".to_string()),
            },
        })
        .collect();

    let mut external_secret = ExternalSecret::new(
        resolved.name(),
        ExternalSecretSpec {
            secret_store_ref: SecretStoreRef {
                name: store.clone(),
                kind: Some("SecretStore".to_string()),
            },
            refresh_interval: Some(EXTERNAL_SECRET_REFRESH_INTERVAL.to_string()),
            target: ExternalSecretTarget {
                name: Some(resolved.name().to_string()),
                creation_policy: Some("Owner".to_string()),
                deletion_policy: Some("Delete".to_string()),
                template: Some(ExternalSecretTemplate {
                    engine_version: Some("v2".to_string()),
                    merge_policy: Some("Replace".to_string()),
                    data: templates,
                }),
            },
            data,
        },
    );
    external_secret.metadata = owned_meta(resolved, resolved.name());
    Ok(Some(external_secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::builders::fixtures::resolved;
    use crate::crd::{AppInstanceSpec, ConfigEntry, SourcedEnv};

    fn secret_spec() -> AppInstanceSpec {
        AppInstanceSpec {
            secret_store_ref: Some("vault".into()),
            sourced_envs: Some(BTreeMap::from([
                (
                    "TOKEN".to_string(),
                    SourcedEnv {
                        external_secret: Some("app/token".into()),
                        ..Default::default()
                    },
                ),
                (
                    "PLAIN".to_string(),
                    SourcedEnv {
                        secret: Some("other".into()),
                        key: Some("k".into()),
                        ..Default::default()
                    },
                ),
            ])),
            configs: Some(BTreeMap::from([(
                "db".to_string(),
                ConfigEntry {
                    content: Some("password={{ .dbpw }}".into()),
                    secrets: Some(BTreeMap::from([("dbpw".into(), "app/db".into())])),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn test_data_and_templates() {
        let external_secret = build_external_secret(&resolved(secret_spec()))
            .unwrap()
            .unwrap();
        assert_eq!(external_secret.metadata.name.as_deref(), Some("web"));
        assert_eq!(external_secret.metadata.namespace.as_deref(), Some("apps"));

        let spec = &external_secret.spec;
        assert_eq!(spec.secret_store_ref.name, "vault");
        assert_eq!(spec.secret_store_ref.kind.as_deref(), Some("SecretStore"));
        assert_eq!(spec.refresh_interval.as_deref(), Some("15m"));

        let keys: Vec<_> = spec.data.iter().map(|d| d.secret_key.as_str()).collect();
        assert_eq!(keys, vec!["TOKEN", "dbpw"]);
        assert_eq!(spec.data[0].remote_ref.key, "app/token");

        let template = spec.target.template.as_ref().unwrap();
        assert_eq!(template.data["envTOKEN"], "{{ .TOKEN }}");
        assert_eq!(template.data["cfgdb"], "password={{ .dbpw }}");
        assert_eq!(template.data.len(), 2);
        assert_eq!(spec.target.creation_policy.as_deref(), Some("Owner"));
    }

    #[test]
    fn test_absent_without_secrets() {
        assert!(build_external_secret(&resolved(AppInstanceSpec::default()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_store_is_configuration_error() {
        let mut spec = secret_spec();
        spec.secret_store_ref = None;
        let err = build_external_secret(&resolved(spec)).unwrap_err();
        assert!(!err.is_retryable());
    }
}
