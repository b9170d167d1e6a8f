//! Human-readable reasons for writes.
//!
//! Reasons only feed logs; they never influence what gets written.

use super::derivative::{is_derivative_at, is_unset, Field};
use serde_json::Value;

/// Paths (`a/b/0/c`) at which `current` does not subsume `expected`
#[must_use]
pub fn changed_paths(expected: &Value, current: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect(expected, current, Field::Plain, String::new(), &mut paths);
    paths
}

fn collect(expected: &Value, current: &Value, field: Field, path: String, paths: &mut Vec<String>) {
    if is_derivative_at(expected, current, field) {
        return;
    }
    match (expected, current) {
        (Value::Object(expected), Value::Object(current)) => {
            for (key, value) in expected {
                let child = join(&path, key);
                match current.get(key) {
                    Some(current) => collect(value, current, field.child(key), child, paths),
                    None if !is_unset(value) => paths.push(child),
                    None => {}
                }
            }
        }
        (Value::Array(expected), Value::Array(current)) if expected.len() == current.len() => {
            for (index, (e, c)) in expected.iter().zip(current).enumerate() {
                collect(e, c, Field::Plain, join(&path, &index.to_string()), paths);
            }
        }
        _ => paths.push(if path.is_empty() { "/".to_string() } else { path }),
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}/{segment}")
    }
}

/// Reason string for a spec change
#[must_use]
pub fn spec_reason(paths: &[String]) -> String {
    format!("Spec changed, namely the paths: {}", paths.join(", "))
}

/// Reason string for a label change
#[must_use]
pub fn labels_reason(keys: &[String]) -> String {
    format!("Labels changed, namely the paths: {}", keys.join(", "))
}
