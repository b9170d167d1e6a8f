//! Expected Service of an instance.

use super::{homepage_annotations, owned_meta, selector_labels, ResolvedSpec};
use crate::controller::error::ReconcilerError;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Build the Service `<name>`, `None` when the instance declares no routes
pub fn build_service(resolved: &ResolvedSpec) -> Result<Option<Service>, ReconcilerError> {
    let spec = &resolved.spec;
    let Some(routes) = spec.routes.as_ref().filter(|r| !r.is_empty()) else {
        return Ok(None);
    };

    let ports = routes
        .iter()
        .map(|(key, route)| {
            let port = route
                .port
                .ok_or_else(|| ReconcilerError::configuration(format!("route {key} has no port")))?;
            Ok(ServicePort {
                name: Some(key.clone()),
                port,
                target_port: Some(IntOrString::Int(route.target_port.unwrap_or(port))),
                protocol: Some(route.protocol.clone().unwrap_or_else(|| "TCP".to_string())),
                ..Default::default()
            })
        })
        .collect::<Result<Vec<_>, ReconcilerError>>()?;

    let mut annotations = resolved.meta.annotations.clone();
    if let Some(hostname) = spec.tailscale_name.as_ref().filter(|h| !h.is_empty()) {
        annotations.insert("tailscale.com/hostname".to_string(), hostname.clone());
        annotations.insert("tailscale.com/expose".to_string(), "true".to_string());
        annotations.extend(homepage_annotations(resolved).unwrap_or_default());
    }

    let mut metadata = owned_meta(resolved, resolved.name());
    if !annotations.is_empty() {
        metadata.annotations = Some(annotations);
    }

    Ok(Some(Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some(
                spec.service_type
                    .clone()
                    .unwrap_or_else(|| "ClusterIP".to_string()),
            ),
            selector: Some(selector_labels(resolved.name())),
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::builders::fixtures::resolved;
    use crate::crd::{AppInstanceSpec, HomePage, Route};
    use std::collections::BTreeMap;

    fn with_routes() -> AppInstanceSpec {
        AppInstanceSpec {
            routes: Some(BTreeMap::from([
                (
                    "web".to_string(),
                    Route {
                        port: Some(80),
                        target_port: Some(8080),
                        ..Default::default()
                    },
                ),
                (
                    "dns".to_string(),
                    Route {
                        port: Some(53),
                        protocol: Some("UDP".into()),
                        ..Default::default()
                    },
                ),
            ])),
            ..Default::default()
        }
    }

    #[test]
    fn test_absent_without_routes() {
        assert!(build_service(&resolved(AppInstanceSpec::default()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ports_and_defaults() {
        let service = build_service(&resolved(with_routes())).unwrap().unwrap();
        let spec = service.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(spec.selector.unwrap()["appbundle"], "web");

        let ports = spec.ports.unwrap();
        assert_eq!(ports[0].name.as_deref(), Some("dns"));
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(53)));
        assert_eq!(ports[0].protocol.as_deref(), Some("UDP"));
        assert_eq!(ports[1].port, 80);
        assert_eq!(ports[1].target_port, Some(IntOrString::Int(8080)));
        assert_eq!(ports[1].protocol.as_deref(), Some("TCP"));
        assert!(service.metadata.annotations.is_none());
    }

    #[test]
    fn test_tailscale_annotations() {
        let mut spec = with_routes();
        spec.tailscale_name = Some("web-ts".into());
        spec.homepage = Some(HomePage::default());
        let service = build_service(&resolved(spec)).unwrap().unwrap();
        let annotations = service.metadata.annotations.unwrap();
        assert_eq!(annotations["tailscale.com/hostname"], "web-ts");
        assert_eq!(annotations["tailscale.com/expose"], "true");
        assert_eq!(annotations["gethomepage.dev/enabled"], "true");
    }
}
