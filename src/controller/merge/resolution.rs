//! Template chain resolution.

use super::merge_spec;
use crate::controller::error::ReconcilerError;
use crate::crd::{AppInstanceSpec, AppTemplate};
use async_trait::async_trait;
use tracing::debug;

/// Source of AppTemplates for the resolver
#[async_trait]
pub trait TemplateFetcher: Send + Sync {
    /// Fetch a template by name; `Ok(None)` when it does not exist
    async fn fetch_template(&self, name: &str) -> Result<Option<AppTemplate>, ReconcilerError>;
}

/// Result of walking an instance's template chain
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The fully merged spec
    pub spec: AppInstanceSpec,
    /// Template names in the order they were merged (nearest first)
    pub chain: Vec<String>,
}

/// Resolve `spec` against its `base` chain
///
/// Without `base` this is the identity. Each template in the chain only fills what
/// is still unset after the templates closer to the instance were merged. A chain
/// that revisits a template fails with [`ReconcilerError::TemplateCycle`], a missing
/// template with [`ReconcilerError::TemplateNotFound`].
pub async fn resolve<F>(spec: &AppInstanceSpec, fetcher: &F) -> Result<Resolution, ReconcilerError>
where
    F: TemplateFetcher + ?Sized,
{
    let mut resolved = spec.clone();
    let mut chain: Vec<String> = Vec::new();
    let mut next = spec
        .base
        .as_deref()
        .filter(|b| !b.is_empty())
        .map(str::to_string);

    while let Some(name) = next {
        if chain.contains(&name) {
            chain.push(name);
            return Err(ReconcilerError::TemplateCycle { chain });
        }

        let template = fetcher
            .fetch_template(&name)
            .await?
            .ok_or_else(|| ReconcilerError::TemplateNotFound(name.clone()))?;

        let inherited = merge_spec(&mut resolved, &template.spec.to_instance_defaults());
        debug!(
            template = %name,
            inherited = ?inherited,
            "Merged template into spec"
        );

        next = template.spec.parent().map(str::to_string);
        chain.push(name);
    }

    Ok(Resolution {
        spec: resolved,
        chain,
    })
}
