//! Dashboard (gethomepage.dev) annotations.

use super::ResolvedSpec;
use std::collections::BTreeMap;

const PREFIX: &str = "gethomepage.dev";
const DEFAULT_GROUP: &str = "Other";

/// Annotations announcing the instance on the dashboard, `None` without `homepage`
#[must_use]
pub fn homepage_annotations(resolved: &ResolvedSpec) -> Option<BTreeMap<String, String>> {
    let homepage = resolved.spec.homepage.as_ref()?;
    let mut annotations = BTreeMap::new();
    let mut put = |field: &str, value: String| {
        annotations.insert(format!("{PREFIX}/{field}"), value);
    };

    put("enabled", "true".to_string());
    if let Some(description) = &homepage.description {
        put("description", description.clone());
    }
    put(
        "group",
        homepage
            .groups
            .clone()
            .or_else(|| homepage.section.clone())
            .unwrap_or_else(|| DEFAULT_GROUP.to_string()),
    );
    if let Some(href) = homepage.href.clone().or_else(|| first_domain(resolved)) {
        put("href", href);
    }
    if let Some(icon) = &homepage.icon {
        put("icon", icon.clone());
    }
    put(
        "name",
        homepage
            .name
            .clone()
            .unwrap_or_else(|| resolved.meta.name.clone()),
    );

    Some(annotations)
}

fn first_domain(resolved: &ResolvedSpec) -> Option<String> {
    resolved
        .spec
        .routes
        .iter()
        .flatten()
        .find_map(|(_, route)| route.ingress.as_ref()?.domain.clone())
        .map(|domain| format!("https://{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::builders::fixtures::resolved;
    use crate::crd::{AppInstanceSpec, HomePage, Route, RouteIngress};

    #[test]
    fn test_absent_without_homepage() {
        assert!(homepage_annotations(&resolved(AppInstanceSpec::default())).is_none());
    }

    #[test]
    fn test_defaults() {
        let spec = AppInstanceSpec {
            homepage: Some(HomePage::default()),
            routes: Some(BTreeMap::from([
                ("api".to_string(), Route::default()),
                (
                    "web".to_string(),
                    Route {
                        ingress: Some(RouteIngress {
                            domain: Some("web.example.com".into()),
                            auth: None,
                        }),
                        ..Default::default()
                    },
                ),
            ])),
            ..Default::default()
        };
        let annotations = homepage_annotations(&resolved(spec)).unwrap();
        assert_eq!(annotations["gethomepage.dev/enabled"], "true");
        assert_eq!(annotations["gethomepage.dev/group"], "Other");
        assert_eq!(annotations["gethomepage.dev/name"], "web");
        assert_eq!(annotations["gethomepage.dev/href"], "https://web.example.com");
        assert!(!annotations.contains_key("gethomepage.dev/icon"));
    }

    #[test]
    fn test_explicit_fields_win() {
        let spec = AppInstanceSpec {
            homepage: Some(HomePage {
                description: Some("Dashboards".into()),
                section: Some("Monitoring".into()),
                href: Some("https://grafana.internal".into()),
                icon: Some("grafana.png".into()),
                name: Some("Grafana".into()),
                groups: None,
            }),
            ..Default::default()
        };
        let annotations = homepage_annotations(&resolved(spec)).unwrap();
        assert_eq!(annotations["gethomepage.dev/group"], "Monitoring");
        assert_eq!(annotations["gethomepage.dev/href"], "https://grafana.internal");
        assert_eq!(annotations["gethomepage.dev/name"], "Grafana");
        assert_eq!(annotations["gethomepage.dev/description"], "Dashboards");
    }
}
