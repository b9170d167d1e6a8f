//! Expected Deployment of an instance.

use super::{config_source, owned_meta, required, selector_labels, ConfigSource, ResolvedSpec};
use crate::config::BuilderConfig;
use crate::constants::{CONFIG_HASH_ANNOTATION, COPY_OVER_IMAGE, SELECTOR_LABEL};
use crate::controller::error::ReconcilerError;
use crate::controller::state_cache::SpecHash;
use crate::crd::{AppInstanceSpec, SourcedEnv};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapKeySelector, ConfigMapVolumeSource, Container, ContainerPort,
    EmptyDirVolumeSource, EnvVar, EnvVarSource, HostPathVolumeSource, KeyToPath,
    LocalObjectReference, PersistentVolumeClaimVolumeSource, PodAffinityTerm, PodAntiAffinity,
    PodSpec, PodTemplateSpec, SecretKeySelector, SecretVolumeSource, Toleration, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use std::collections::BTreeMap;

const REVISION_HISTORY_LIMIT: i32 = 3;
const NVIDIA_ENV: &str = "NVIDIA_VISIBLE_DEVICES";
const NVIDIA_TOLERATION_KEY: &str = "nvidia.com/gpu";
const NVIDIA_RUNTIME_CLASS: &str = "nvidia";
const COPY_OVER_STAGING_ROOT: &str = "/atrok";

/// Build the Deployment `<name>`
///
/// Always present: an instance without an image is a configuration error.
pub fn build_deployment(
    resolved: &ResolvedSpec,
    config: &BuilderConfig,
) -> Result<Deployment, ReconcilerError> {
    let name = resolved.name();
    let spec = &resolved.spec;

    let (data_volumes, data_mounts) = data_volumes(name, spec)?;
    let files = config_files(name, spec)?;

    let mut volumes = data_volumes;
    volumes.extend(files.volumes);

    let mut mounts = data_mounts.clone();
    mounts.extend(files.mounts);

    let init_containers: Vec<Container> = files
        .copy_over
        .into_iter()
        .map(|copy| copy_over_container(copy, &data_mounts))
        .collect();

    let use_nvidia = spec.use_nvidia.unwrap_or(false);

    let container = Container {
        name: name.to_string(),
        image: Some(image(spec)?),
        image_pull_policy: Some(
            spec.image
                .as_ref()
                .and_then(|i| i.pull_policy.clone())
                .unwrap_or_else(|| "Always".to_string()),
        ),
        ports: Some(container_ports(spec)?),
        env: Some(env(name, spec, use_nvidia)?),
        volume_mounts: Some(mounts),
        resources: spec.resources.clone(),
        liveness_probe: spec.liveness_probe.clone(),
        readiness_probe: spec.readiness_probe.clone(),
        startup_probe: spec.startup_probe.clone(),
        command: spec.command.clone(),
        args: spec.args.clone(),
        ..Default::default()
    };

    let image_pull_secrets = config
        .image_pull_secrets
        .iter()
        .map(|secret| LocalObjectReference {
            name: secret.clone(),
        })
        .collect::<Vec<_>>();

    let pod_annotations = files
        .inline_hash
        .map(|hash| BTreeMap::from([(CONFIG_HASH_ANNOTATION.to_string(), hash.to_string())]));

    let mut metadata = owned_meta(resolved, name);
    if !resolved.meta.annotations.is_empty() {
        metadata.annotations = Some(resolved.meta.annotations.clone());
    }

    Ok(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: spec.replicas,
            revision_history_limit: Some(REVISION_HISTORY_LIMIT),
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                rolling_update: None,
            }),
            selector: LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(name)),
                    annotations: pod_annotations,
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    image_pull_secrets: (!image_pull_secrets.is_empty())
                        .then_some(image_pull_secrets),
                    init_containers: (!init_containers.is_empty()).then_some(init_containers),
                    affinity: Some(hostname_anti_affinity(name)),
                    containers: vec![container],
                    node_selector: spec.node_selector.clone(),
                    tolerations: use_nvidia.then(|| {
                        vec![Toleration {
                            key: Some(NVIDIA_TOLERATION_KEY.to_string()),
                            operator: Some("Exists".to_string()),
                            effect: Some("NoSchedule".to_string()),
                            ..Default::default()
                        }]
                    }),
                    runtime_class_name: use_nvidia.then(|| NVIDIA_RUNTIME_CLASS.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

fn image(spec: &AppInstanceSpec) -> Result<String, ReconcilerError> {
    let image = spec
        .image
        .as_ref()
        .ok_or_else(|| ReconcilerError::configuration("image is not set"))?;
    let repository = image
        .repository
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ReconcilerError::configuration("image.repository is not set"))?;
    let tag = image
        .tag
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ReconcilerError::configuration("image.tag is not set"))?;
    Ok(format!("{repository}:{tag}"))
}

fn container_ports(spec: &AppInstanceSpec) -> Result<Vec<ContainerPort>, ReconcilerError> {
    spec.routes
        .iter()
        .flatten()
        .map(|(key, route)| {
            let port = route
                .port
                .ok_or_else(|| ReconcilerError::configuration(format!("route {key} has no port")))?;
            Ok(ContainerPort {
                name: Some(key.clone()),
                container_port: route.target_port.unwrap_or(port),
                protocol: Some(route.protocol.clone().unwrap_or_else(|| "TCP".to_string())),
                ..Default::default()
            })
        })
        .collect()
}

fn env(name: &str, spec: &AppInstanceSpec, use_nvidia: bool) -> Result<Vec<EnvVar>, ReconcilerError> {
    let mut env: Vec<EnvVar> = spec
        .envs
        .iter()
        .flatten()
        .map(|(key, value)| EnvVar {
            name: key.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();

    for (key, sourced) in spec.sourced_envs.iter().flatten() {
        env.push(EnvVar {
            name: key.clone(),
            value_from: Some(sourced_env(name, key, sourced)?),
            ..Default::default()
        });
    }

    if use_nvidia && !env.iter().any(|e| e.name == NVIDIA_ENV) {
        env.push(EnvVar {
            name: NVIDIA_ENV.to_string(),
            value: Some("all".to_string()),
            ..Default::default()
        });
    }

    Ok(env)
}

fn sourced_env(name: &str, key: &str, sourced: &SourcedEnv) -> Result<EnvVarSource, ReconcilerError> {
    if sourced.external_secret.as_deref().is_some_and(|s| !s.is_empty()) {
        return Ok(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: name.to_string(),
                key: format!("env{key}"),
                optional: None,
            }),
            ..Default::default()
        });
    }
    if let Some(secret) = sourced.secret.as_ref().filter(|s| !s.is_empty()) {
        return Ok(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.clone(),
                key: required(sourced.key.as_ref(), "sourced env", key, "key")?.to_string(),
                optional: None,
            }),
            ..Default::default()
        });
    }
    if let Some(config_map) = sourced.config_map.as_ref().filter(|c| !c.is_empty()) {
        return Ok(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: config_map.clone(),
                key: required(sourced.key.as_ref(), "sourced env", key, "key")?.to_string(),
                optional: None,
            }),
            ..Default::default()
        });
    }
    Err(ReconcilerError::configuration(format!(
        "sourced env {key} declares neither externalSecret, secret nor configMap"
    )))
}

/// Volumes and mounts of `spec.volumes`
fn data_volumes(
    name: &str,
    spec: &AppInstanceSpec,
) -> Result<(Vec<Volume>, Vec<VolumeMount>), ReconcilerError> {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    for (key, volume) in spec.volumes.iter().flatten() {
        let path = required(volume.path.as_ref(), "volume", key, "path")?;
        let existing_claim = volume.existing_claim.as_ref().filter(|c| !c.is_empty());
        let volume_name = existing_claim.cloned().unwrap_or_else(|| key.clone());

        let mut entry = Volume {
            name: volume_name.clone(),
            ..Default::default()
        };
        if let Some(host_path) = volume.host_path.as_ref().filter(|p| !p.is_empty()) {
            entry.host_path = Some(HostPathVolumeSource {
                path: host_path.clone(),
                type_: Some("DirectoryOrCreate".to_string()),
            });
        } else if volume.empty_dir.unwrap_or(false) {
            entry.empty_dir = Some(EmptyDirVolumeSource::default());
        } else {
            entry.persistent_volume_claim = Some(PersistentVolumeClaimVolumeSource {
                claim_name: existing_claim
                    .cloned()
                    .unwrap_or_else(|| format!("{name}-{key}")),
                read_only: None,
            });
        }

        volumes.push(entry);
        mounts.push(VolumeMount {
            name: volume_name,
            mount_path: path.to_string(),
            ..Default::default()
        });
    }

    Ok((volumes, mounts))
}

/// A config file staged by an init container
struct CopyOver {
    key: String,
    volume: String,
    file_name: String,
    mount_path: String,
}

#[derive(Default)]
struct ConfigFiles {
    volumes: Vec<Volume>,
    /// Mounts of the main container
    mounts: Vec<VolumeMount>,
    copy_over: Vec<CopyOver>,
    /// Digest of the inline contents, `None` without inline configs
    inline_hash: Option<SpecHash>,
}

fn config_files(name: &str, spec: &AppInstanceSpec) -> Result<ConfigFiles, ReconcilerError> {
    let mut files = ConfigFiles::default();
    let mut inline: BTreeMap<&str, &str> = BTreeMap::new();

    for (key, entry) in spec.configs.iter().flatten() {
        let file_name = required(entry.file_name.as_ref(), "config", key, "fileName")?;
        let dir_path = required(entry.dir_path.as_ref(), "config", key, "dirPath")?;
        let mount_path = format!("{}/{file_name}", dir_path.trim_end_matches('/'));

        let volume = match config_source(key, entry)? {
            ConfigSource::Existing(config_map) => Volume {
                name: format!("cm-{key}"),
                config_map: Some(ConfigMapVolumeSource {
                    name: config_map.to_string(),
                    items: Some(vec![key_to_path(key, file_name)]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ConfigSource::Inline(content) => {
                inline.insert(key.as_str(), content);
                Volume {
                    name: format!("cm-{key}"),
                    config_map: Some(ConfigMapVolumeSource {
                        name: name.to_string(),
                        items: Some(vec![key_to_path(key, file_name)]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }
            }
            ConfigSource::Secret => Volume {
                name: format!("sec-{key}"),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(name.to_string()),
                    items: Some(vec![key_to_path(&format!("cfg{key}"), file_name)]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };

        if entry.copy_over.unwrap_or(false) {
            files.copy_over.push(CopyOver {
                key: key.clone(),
                volume: volume.name.clone(),
                file_name: file_name.to_string(),
                mount_path,
            });
        } else {
            files.mounts.push(VolumeMount {
                name: volume.name.clone(),
                mount_path,
                sub_path: Some(file_name.to_string()),
                read_only: Some(true),
                ..Default::default()
            });
        }
        files.volumes.push(volume);
    }

    if !inline.is_empty() {
        files.inline_hash = Some(SpecHash::of(&inline)?);
    }
    Ok(files)
}

fn key_to_path(key: &str, path: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: path.to_string(),
        mode: None,
    }
}

/// Init container copying a config file into a writable data volume
fn copy_over_container(copy: CopyOver, data_mounts: &[VolumeMount]) -> Container {
    let staging = format!("{COPY_OVER_STAGING_ROOT}{}", copy.mount_path);
    let mut mounts = data_mounts.to_vec();
    mounts.push(VolumeMount {
        name: copy.volume,
        mount_path: staging.clone(),
        sub_path: Some(copy.file_name),
        read_only: Some(true),
        ..Default::default()
    });

    Container {
        name: format!("copy-over-{}", copy.key),
        image: Some(COPY_OVER_IMAGE.to_string()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!(
                "cp {staging} {target} && chmod 777 {target}",
                target = copy.mount_path
            ),
        ]),
        volume_mounts: Some(mounts),
        ..Default::default()
    }
}

/// Keep replicas of one instance on distinct nodes
fn hostname_anti_affinity(name: &str) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                topology_key: "kubernetes.io/hostname".to_string(),
                label_selector: Some(LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key: SELECTOR_LABEL.to_string(),
                        operator: "In".to_string(),
                        values: Some(vec![name.to_string()]),
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::builders::fixtures::resolved;
    use crate::crd::{AppImage, ConfigEntry, Route, Volume as AppVolume};

    fn base_spec() -> AppInstanceSpec {
        AppInstanceSpec {
            image: Some(AppImage {
                repository: Some("nginx".into()),
                tag: Some("1.27".into()),
                pull_policy: None,
            }),
            ..Default::default()
        }
    }

    fn pod_spec(deployment: &Deployment) -> &PodSpec {
        deployment
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap()
    }

    #[test]
    fn test_minimal_deployment() {
        let deployment = build_deployment(&resolved(base_spec()), &BuilderConfig::default()).unwrap();
        assert_eq!(deployment.metadata.name.as_deref(), Some("web"));
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("apps"));
        assert_eq!(deployment.metadata.owner_references.as_ref().unwrap().len(), 1);

        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.revision_history_limit, Some(3));
        assert_eq!(
            spec.strategy.as_ref().unwrap().type_.as_deref(),
            Some("Recreate")
        );
        assert_eq!(spec.selector.match_labels.as_ref().unwrap()["appbundle"], "web");

        let pod = pod_spec(&deployment);
        let container = &pod.containers[0];
        assert_eq!(container.name, "web");
        assert_eq!(container.image.as_deref(), Some("nginx:1.27"));
        assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));
        assert_eq!(pod.image_pull_secrets.as_ref().unwrap()[0].name, "regcred");
        assert!(pod.runtime_class_name.is_none());
        assert!(pod.init_containers.is_none());
    }

    #[test]
    fn test_missing_image_is_configuration_error() {
        let err = build_deployment(&resolved(AppInstanceSpec::default()), &BuilderConfig::default())
            .unwrap_err();
        assert!(!err.is_retryable());

        let mut spec = base_spec();
        spec.image.as_mut().unwrap().tag = None;
        let err = build_deployment(&resolved(spec), &BuilderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("image.tag"));
    }

    #[test]
    fn test_ports_and_env_order() {
        let mut spec = base_spec();
        spec.routes = Some(BTreeMap::from([(
            "web".to_string(),
            Route {
                port: Some(80),
                target_port: Some(8080),
                ..Default::default()
            },
        )]));
        spec.envs = Some(BTreeMap::from([
            ("B".to_string(), "2".to_string()),
            ("A".to_string(), "1".to_string()),
        ]));
        spec.sourced_envs = Some(BTreeMap::from([(
            "TOKEN".to_string(),
            SourcedEnv {
                external_secret: Some("app/token".into()),
                ..Default::default()
            },
        )]));
        spec.secret_store_ref = Some("vault".into());
        spec.use_nvidia = Some(true);

        let deployment = build_deployment(&resolved(spec), &BuilderConfig::default()).unwrap();
        let pod = pod_spec(&deployment);
        let container = &pod.containers[0];

        let port = &container.ports.as_ref().unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("web"));
        assert_eq!(port.container_port, 8080);
        assert_eq!(port.protocol.as_deref(), Some("TCP"));

        let names: Vec<_> = container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B", "TOKEN", "NVIDIA_VISIBLE_DEVICES"]);
        let token = &container.env.as_ref().unwrap()[2];
        let selector = token
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(selector.name, "web");
        assert_eq!(selector.key, "envTOKEN");

        assert_eq!(pod.runtime_class_name.as_deref(), Some("nvidia"));
        assert_eq!(
            pod.tolerations.as_ref().unwrap()[0].key.as_deref(),
            Some("nvidia.com/gpu")
        );
    }

    #[test]
    fn test_sourced_env_without_source_is_configuration_error() {
        let mut spec = base_spec();
        spec.sourced_envs = Some(BTreeMap::from([(
            "X".to_string(),
            SourcedEnv::default(),
        )]));
        let err = build_deployment(&resolved(spec), &BuilderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("sourced env X"));
    }

    #[test]
    fn test_volume_sources() {
        let mut spec = base_spec();
        spec.volumes = Some(BTreeMap::from([
            (
                "cache".to_string(),
                AppVolume {
                    empty_dir: Some(true),
                    path: Some("/cache".into()),
                    ..Default::default()
                },
            ),
            (
                "data".to_string(),
                AppVolume {
                    path: Some("/data".into()),
                    size: Some("1Gi".into()),
                    ..Default::default()
                },
            ),
            (
                "host".to_string(),
                AppVolume {
                    host_path: Some("/mnt/host".into()),
                    path: Some("/host".into()),
                    ..Default::default()
                },
            ),
            (
                "shared".to_string(),
                AppVolume {
                    existing_claim: Some("media".into()),
                    path: Some("/media".into()),
                    ..Default::default()
                },
            ),
        ]));

        let deployment = build_deployment(&resolved(spec), &BuilderConfig::default()).unwrap();
        let volumes = pod_spec(&deployment).volumes.as_ref().unwrap();
        assert!(volumes[0].empty_dir.is_some());
        assert_eq!(
            volumes[1].persistent_volume_claim.as_ref().unwrap().claim_name,
            "web-data"
        );
        assert_eq!(
            volumes[2].host_path.as_ref().unwrap().type_.as_deref(),
            Some("DirectoryOrCreate")
        );
        assert_eq!(volumes[3].name, "media");
        assert_eq!(
            volumes[3].persistent_volume_claim.as_ref().unwrap().claim_name,
            "media"
        );
    }

    #[test]
    fn test_volume_without_path_is_configuration_error() {
        let mut spec = base_spec();
        spec.volumes = Some(BTreeMap::from([("data".to_string(), AppVolume::default())]));
        let err = build_deployment(&resolved(spec), &BuilderConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: volume data has no path");
    }

    #[test]
    fn test_config_mounts_and_hash() {
        let mut spec = base_spec();
        spec.configs = Some(BTreeMap::from([
            (
                "app".to_string(),
                ConfigEntry {
                    file_name: Some("app.yaml".into()),
                    dir_path: Some("/etc/app/".into()),
                    content: Some("a: 1".into()),
                    ..Default::default()
                },
            ),
            (
                "creds".to_string(),
                ConfigEntry {
                    file_name: Some("creds.env".into()),
                    dir_path: Some("/etc/app".into()),
                    content: Some("PW={{ .pw }}".into()),
                    secrets: Some(BTreeMap::from([("pw".into(), "app/pw".into())])),
                    copy_over: Some(true),
                    ..Default::default()
                },
            ),
        ]));

        let first = build_deployment(&resolved(spec.clone()), &BuilderConfig::default()).unwrap();
        let pod = pod_spec(&first);
        let volumes = pod.volumes.as_ref().unwrap();
        assert_eq!(volumes[0].name, "cm-app");
        assert_eq!(volumes[1].name, "sec-creds");
        assert_eq!(
            volumes[1].secret.as_ref().unwrap().items.as_ref().unwrap()[0].key,
            "cfgcreds"
        );

        let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].mount_path, "/etc/app/app.yaml");
        assert_eq!(mounts[0].sub_path.as_deref(), Some("app.yaml"));

        let init = &pod.init_containers.as_ref().unwrap()[0];
        assert_eq!(init.name, "copy-over-creds");
        assert_eq!(init.image.as_deref(), Some("busybox:stable"));
        assert_eq!(
            init.command.as_ref().unwrap()[2],
            "cp /atrok/etc/app/creds.env /etc/app/creds.env && chmod 777 /etc/app/creds.env"
        );

        let hash = |d: &Deployment| {
            d.spec.as_ref().unwrap().template.metadata.as_ref().unwrap().annotations.as_ref().unwrap()
                [CONFIG_HASH_ANNOTATION]
                .clone()
        };
        let again = build_deployment(&resolved(spec.clone()), &BuilderConfig::default()).unwrap();
        assert_eq!(hash(&first), hash(&again));

        spec.configs.as_mut().unwrap().get_mut("app").unwrap().content = Some("a: 2".into());
        let changed = build_deployment(&resolved(spec), &BuilderConfig::default()).unwrap();
        assert_ne!(hash(&first), hash(&changed));
    }
}
