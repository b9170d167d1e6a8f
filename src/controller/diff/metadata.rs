//! Exact comparison of labels, annotations and owner references.
//!
//! Unlike the spec, metadata carries routing and ownership information that must
//! match precisely, so extra keys on the current side count as drift. The only
//! exception are annotations written by the API server or tooling.

use crate::constants::SYSTEM_ANNOTATION_PREFIXES;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

type StringMap = BTreeMap<String, String>;

fn differing_keys(expected: &StringMap, current: &StringMap) -> Vec<String> {
    expected
        .keys()
        .chain(current.keys())
        .filter(|key| expected.get(*key) != current.get(*key))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Label keys whose value differs (or that exist on one side only)
#[must_use]
pub fn label_drift(expected: Option<&StringMap>, current: Option<&StringMap>) -> Vec<String> {
    let empty = StringMap::new();
    differing_keys(expected.unwrap_or(&empty), current.unwrap_or(&empty))
}

/// Whether the annotation is written by the API server or tooling
#[must_use]
pub fn is_system_annotation(key: &str) -> bool {
    SYSTEM_ANNOTATION_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

/// Annotation keys that differ, ignoring system annotations on both sides
#[must_use]
pub fn annotation_drift(expected: Option<&StringMap>, current: Option<&StringMap>) -> Vec<String> {
    let user = |map: Option<&StringMap>| -> StringMap {
        map.into_iter()
            .flatten()
            .filter(|(key, _)| !is_system_annotation(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };
    differing_keys(&user(expected), &user(current))
}

/// Merge patch removing labels and non-system annotations that `current` carries
/// but `expected` does not declare
///
/// Server-side apply leaves keys owned by other field managers in place; this patch
/// removes them so the metadata ends up matching exactly.
#[must_use]
pub fn stale_metadata_patch(expected: &ObjectMeta, current: &ObjectMeta) -> Option<Value> {
    let stale = |expected: Option<&StringMap>, current: Option<&StringMap>, keep: fn(&str) -> bool| {
        current
            .into_iter()
            .flatten()
            .filter(|(key, _)| !keep(key) && !expected.is_some_and(|e| e.contains_key(*key)))
            .map(|(key, _)| (key.clone(), Value::Null))
            .collect::<Map<String, Value>>()
    };
    let labels = stale(expected.labels.as_ref(), current.labels.as_ref(), |_| false);
    let annotations = stale(
        expected.annotations.as_ref(),
        current.annotations.as_ref(),
        is_system_annotation,
    );
    if labels.is_empty() && annotations.is_empty() {
        return None;
    }

    let mut metadata = Map::new();
    if !labels.is_empty() {
        metadata.insert("labels".to_string(), Value::Object(labels));
    }
    if !annotations.is_empty() {
        metadata.insert("annotations".to_string(), Value::Object(annotations));
    }
    Some(serde_json::json!({ "metadata": metadata }))
}

/// Whether an expected owner reference is missing from the current object
#[must_use]
pub fn owner_drift(expected: Option<&Vec<OwnerReference>>, current: Option<&Vec<OwnerReference>>) -> bool {
    let current = current.map(Vec::as_slice).unwrap_or_default();
    expected.into_iter().flatten().any(|owner| {
        !current
            .iter()
            .any(|c| c.uid == owner.uid && c.kind == owner.kind)
    })
}
