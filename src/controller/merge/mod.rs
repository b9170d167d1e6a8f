//! # Template Merge
//!
//! Field-by-field merge of AppTemplate defaults into an AppInstance spec, and the
//! resolver that walks the `base` chain.
//!
//! A template only ever fills gaps: a value the instance (or a template closer to
//! it in the chain) already set is never overwritten. Each field follows one of the
//! policies in [`FieldPolicy`]:
//!
//! | policy | behaviour |
//! |---|---|
//! | scalar | keep the instance value if set, otherwise take the template's |
//! | nested | create from the template when absent, otherwise fill unset sub-fields |
//! | keyed map | union by key, shared keys merged recursively |
//! | declared only | fill unset sub-fields, never create the struct from the template |
//! | first non-empty | unkeyed lists, no element-wise merge |
//!
//! Maps are `BTreeMap`s, so keys are always merged in sorted order and the result is
//! independent of any iteration order.

mod fields;
mod resolution;
mod spec;

pub use resolution::{resolve, Resolution, TemplateFetcher};
pub use spec::{merge_spec, MergeRule, MERGE_RULES};

use std::collections::BTreeMap;

/// A value that can take its unset parts from a template value of the same type
pub trait Mergeable {
    /// Fill every unset part of `self` from `template`
    fn merge_from(&mut self, template: &Self);
}

/// How a spec field is merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    Scalar,
    Nested,
    KeyedMap,
    DeclaredOnly,
    FirstNonEmpty,
}

impl FieldPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldPolicy::Scalar => "scalar",
            FieldPolicy::Nested => "nested",
            FieldPolicy::KeyedMap => "keyed-map",
            FieldPolicy::DeclaredOnly => "declared-only",
            FieldPolicy::FirstNonEmpty => "first-non-empty",
        }
    }
}

/// Scalar policy: take the template value when unset
///
/// Returns whether the field was inherited.
pub fn fill_scalar<T: Clone>(target: &mut Option<T>, template: &Option<T>) -> bool {
    if target.is_none() && template.is_some() {
        target.clone_from(template);
        return true;
    }
    false
}

/// Scalar policy for text, where an empty string counts as unset
pub fn fill_text(target: &mut Option<String>, template: &Option<String>) -> bool {
    let unset = target.as_deref().is_none_or(str::is_empty);
    let available = template.as_deref().is_some_and(|t| !t.is_empty());
    if unset && available {
        target.clone_from(template);
        return true;
    }
    false
}

/// Nested policy: copy the whole struct when absent, otherwise merge sub-fields
pub fn fill_nested<T: Mergeable + Clone + PartialEq>(
    target: &mut Option<T>,
    template: &Option<T>,
) -> bool {
    match (target.as_mut(), template) {
        (None, Some(t)) => {
            *target = Some(t.clone());
            true
        }
        (Some(current), Some(t)) => {
            let before = current.clone();
            current.merge_from(t);
            *current != before
        }
        (_, None) => false,
    }
}

/// Declared-only policy: merge sub-fields only when the instance declares the struct
pub fn fill_declared<T: Mergeable + Clone + PartialEq>(
    target: &mut Option<T>,
    template: &Option<T>,
) -> bool {
    match (target.as_mut(), template) {
        (Some(current), Some(t)) => {
            let before = current.clone();
            current.merge_from(t);
            *current != before
        }
        _ => false,
    }
}

/// Keyed-map policy: union by key, merging values of shared keys
pub fn merge_keyed<V: Mergeable + Clone + PartialEq>(
    target: &mut Option<BTreeMap<String, V>>,
    template: &Option<BTreeMap<String, V>>,
) -> bool {
    let Some(template) = template.as_ref().filter(|t| !t.is_empty()) else {
        return false;
    };
    let target = target.get_or_insert_with(BTreeMap::new);
    let before = target.clone();
    target.merge_from(template);
    *target != before
}

/// First-non-empty policy for unkeyed lists
pub fn first_non_empty<T: Clone>(target: &mut Option<Vec<T>>, template: &Option<Vec<T>>) -> bool {
    let unset = target.as_ref().is_none_or(Vec::is_empty);
    let available = template.as_ref().is_some_and(|t| !t.is_empty());
    if unset && available {
        target.clone_from(template);
        return true;
    }
    false
}

impl<V: Mergeable + Clone> Mergeable for BTreeMap<String, V> {
    fn merge_from(&mut self, template: &Self) {
        for (key, value) in template {
            match self.get_mut(key) {
                Some(existing) => existing.merge_from(value),
                None => {
                    self.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

impl Mergeable for String {
    fn merge_from(&mut self, template: &Self) {
        if self.is_empty() {
            self.clone_from(template);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_scalar() {
        let mut target = None;
        assert!(fill_scalar(&mut target, &Some(3)));
        assert_eq!(target, Some(3));
        assert!(!fill_scalar(&mut target, &Some(5)));
        assert_eq!(target, Some(3));
        // zero is a value, not a gap
        let mut zero = Some(0);
        assert!(!fill_scalar(&mut zero, &Some(2)));
        assert_eq!(zero, Some(0));
    }

    #[test]
    fn test_fill_text_treats_empty_as_unset() {
        let mut target = Some(String::new());
        assert!(fill_text(&mut target, &Some("v2".into())));
        assert_eq!(target.as_deref(), Some("v2"));

        let mut target = None;
        assert!(!fill_text(&mut target, &Some(String::new())));
        assert_eq!(target, None);
    }

    #[test]
    fn test_first_non_empty() {
        let mut target: Option<Vec<String>> = Some(vec![]);
        assert!(first_non_empty(&mut target, &Some(vec!["run".into()])));
        assert_eq!(target, Some(vec!["run".to_string()]));

        let mut target = Some(vec!["serve".to_string()]);
        assert!(!first_non_empty(
            &mut target,
            &Some(vec!["run".into(), "--x".into()])
        ));
        assert_eq!(target, Some(vec!["serve".to_string()]));
    }

    #[test]
    fn test_string_map_keeps_non_empty_values() {
        let mut target = Some(BTreeMap::from([
            ("A".to_string(), "mine".to_string()),
            ("B".to_string(), String::new()),
        ]));
        let template = Some(BTreeMap::from([
            ("A".to_string(), "theirs".to_string()),
            ("B".to_string(), "filled".to_string()),
            ("C".to_string(), "new".to_string()),
        ]));
        assert!(merge_keyed(&mut target, &template));
        let target = target.unwrap();
        assert_eq!(target["A"], "mine");
        assert_eq!(target["B"], "filled");
        assert_eq!(target["C"], "new");
    }

    #[test]
    fn test_keyed_merge_without_template_keeps_none() {
        let mut target: Option<BTreeMap<String, String>> = None;
        assert!(!merge_keyed(&mut target, &None));
        assert!(!merge_keyed(&mut target, &Some(BTreeMap::new())));
        assert_eq!(target, None);
    }
}
