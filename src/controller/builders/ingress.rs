//! Expected Ingresses of an instance.

use super::{homepage_annotations, owned_meta, required, ResolvedSpec};
use crate::config::BuilderConfig;
use crate::constants::HOMEPAGE_ROUTE_KEY;
use crate::controller::error::ReconcilerError;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use std::collections::BTreeMap;

/// Build one Ingress `<name>-<route>` per route declaring `ingress`
pub fn build_ingresses(
    resolved: &ResolvedSpec,
    config: &BuilderConfig,
) -> Result<Vec<Ingress>, ReconcilerError> {
    let name = resolved.name();
    let mut ingresses = Vec::new();

    for (key, route) in resolved.spec.routes.iter().flatten() {
        let Some(exposure) = route.ingress.as_ref() else {
            continue;
        };
        let domain = required(exposure.domain.as_ref(), "route", key, "ingress.domain")?;
        let port = route
            .port
            .ok_or_else(|| ReconcilerError::configuration(format!("route {key} has no port")))?;
        let ingress_name = format!("{name}-{key}");

        let mut annotations = BTreeMap::from([
            (
                "traefik.ingress.kubernetes.io/router.entryPoints".to_string(),
                config.ingress_entry_point.clone(),
            ),
            (
                "traefik.ingress.kubernetes.io/router.tls".to_string(),
                "true".to_string(),
            ),
            (
                "cert-manager.io/cluster-issuer".to_string(),
                config.ingress_cluster_issuer.clone(),
            ),
        ]);
        if exposure.auth.unwrap_or(false) {
            if let Some(middleware) = &config.ingress_auth_middleware {
                annotations.insert(
                    "traefik.ingress.kubernetes.io/router.middlewares".to_string(),
                    middleware.clone(),
                );
            }
        }
        if key == HOMEPAGE_ROUTE_KEY {
            annotations.extend(homepage_annotations(resolved).unwrap_or_default());
        }

        let mut metadata = owned_meta(resolved, ingress_name.clone());
        metadata.annotations = Some(annotations);

        ingresses.push(Ingress {
            metadata,
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(domain.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: name.to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(port),
                                        name: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                tls: Some(vec![IngressTLS {
                    hosts: Some(vec![domain.to_string()]),
                    secret_name: Some(format!(
                        "{ingress_name}-{}-ingress-tls",
                        resolved.namespace()
                    )),
                }]),
                ..Default::default()
            }),
            status: None,
        });
    }

    Ok(ingresses)
}
