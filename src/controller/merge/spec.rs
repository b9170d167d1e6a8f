//! Spec-level merge dispatch.
//!
//! [`MERGE_RULES`] lists every mergeable field of [`AppInstanceSpec`] with its policy.
//! `base` is not listed: the chain is walked by the resolver, never merged, and
//! `tailscaleName` is identity-specific and absent from templates.

use super::{
    fill_declared, fill_nested, fill_scalar, fill_text, first_non_empty, merge_keyed, FieldPolicy,
};
use crate::crd::AppInstanceSpec;

/// One entry of the merge dispatch table
#[derive(Debug, Clone, Copy)]
pub struct MergeRule {
    /// Field name as it appears on the wire
    pub field: &'static str,
    pub policy: FieldPolicy,
    /// Merge the field; returns whether anything was inherited
    pub apply: fn(&mut AppInstanceSpec, &AppInstanceSpec) -> bool,
}

macro_rules! rule {
    ($field:literal, $policy:ident, $merge:path, $member:ident) => {
        MergeRule {
            field: $field,
            policy: FieldPolicy::$policy,
            apply: |target, template| $merge(&mut target.$member, &template.$member),
        }
    };
}

pub static MERGE_RULES: &[MergeRule] = &[
    rule!("image", Nested, fill_nested, image),
    rule!("nodeSelector", Scalar, fill_scalar, node_selector),
    rule!("useNvidia", Scalar, fill_scalar, use_nvidia),
    rule!("replicas", Scalar, fill_scalar, replicas),
    rule!("resources", Scalar, fill_scalar, resources),
    rule!("envs", KeyedMap, merge_keyed, envs),
    rule!("secretStoreRef", Scalar, fill_text, secret_store_ref),
    rule!("sourcedEnvs", KeyedMap, merge_keyed, sourced_envs),
    rule!("serviceType", Scalar, fill_text, service_type),
    rule!("routes", KeyedMap, merge_keyed, routes),
    rule!("homepage", DeclaredOnly, fill_declared, homepage),
    rule!("volumes", KeyedMap, merge_keyed, volumes),
    rule!("backup", Nested, fill_nested, backup),
    rule!("selector", Scalar, fill_scalar, selector),
    rule!("livenessProbe", Scalar, fill_scalar, liveness_probe),
    rule!("readinessProbe", Scalar, fill_scalar, readiness_probe),
    rule!("startupProbe", Scalar, fill_scalar, startup_probe),
    rule!("command", FirstNonEmpty, first_non_empty, command),
    rule!("args", FirstNonEmpty, first_non_empty, args),
    rule!("configs", KeyedMap, merge_keyed, configs),
];

/// Merge `template` into `target`, returning the names of the fields that inherited something
pub fn merge_spec(target: &mut AppInstanceSpec, template: &AppInstanceSpec) -> Vec<&'static str> {
    MERGE_RULES
        .iter()
        .filter_map(|rule| (rule.apply)(target, template).then_some(rule.field))
        .collect()
}
