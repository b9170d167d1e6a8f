//! Derivative comparison of JSON documents.

use super::quantity::same_quantity;
use serde_json::Value;

/// Keys whose values are maps of resource quantities
const QUANTITY_MAPS: &[&str] = &["requests", "limits", "capacity"];
/// Keys whose values are single resource quantities
const QUANTITY_FIELDS: &[&str] = &["sizeLimit"];

/// How scalars at some position in a document compare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Field {
    Plain,
    QuantityMap,
    Quantity,
}

impl Field {
    /// Context of the value stored under `key` in an object at this position
    pub(super) fn child(self, key: &str) -> Self {
        match self {
            Self::QuantityMap => Self::Quantity,
            _ if QUANTITY_MAPS.contains(&key) => Self::QuantityMap,
            _ if QUANTITY_FIELDS.contains(&key) => Self::Quantity,
            _ => Self::Plain,
        }
    }
}

/// Whether a JSON value carries no information (`null`, `""`, `[]` or `{}`)
#[must_use]
pub fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Whether `current` already subsumes everything `expected` declares
///
/// Unset values in `expected` match anything. Objects are compared key by key, so
/// extra keys on the current side (cluster IPs, defaulted sub-fields) are tolerated.
/// Arrays must have the same length and be element-wise derivative, and scalars
/// must be equal. Resource quantities are equal when they denote the same amount.
#[must_use]
pub fn is_derivative(expected: &Value, current: &Value) -> bool {
    is_derivative_at(expected, current, Field::Plain)
}

pub(super) fn is_derivative_at(expected: &Value, current: &Value, field: Field) -> bool {
    if is_unset(expected) {
        return true;
    }
    match (expected, current) {
        (Value::Object(expected), Value::Object(current)) => {
            expected.iter().all(|(key, value)| match current.get(key) {
                Some(current) => is_derivative_at(value, current, field.child(key)),
                None => is_unset(value),
            })
        }
        (Value::Array(expected), Value::Array(current)) => {
            expected.len() == current.len()
                && expected
                    .iter()
                    .zip(current)
                    .all(|(e, c)| is_derivative_at(e, c, Field::Plain))
        }
        (Value::String(expected), Value::String(current)) if field == Field::Quantity => {
            same_quantity(expected, current)
        }
        (expected, current) => expected == current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_documents_are_derivative() {
        let doc = json!({"spec": {"replicas": 2, "ports": [{"port": 80}]}});
        assert!(is_derivative(&doc, &doc));
    }

    #[test]
    fn test_server_populated_fields_are_tolerated() {
        let expected = json!({"spec": {"type": "ClusterIP", "ports": [{"port": 80, "name": "web"}]}});
        let current = json!({"spec": {
            "type": "ClusterIP",
            "clusterIP": "10.0.0.12",
            "ipFamilies": ["IPv4"],
            "ports": [{"port": 80, "name": "web", "protocol": "TCP", "targetPort": 80}],
            "sessionAffinity": "None"
        }});
        assert!(is_derivative(&expected, &current));
    }

    #[test]
    fn test_changed_scalar_is_drift() {
        let expected = json!({"spec": {"replicas": 3}});
        let current = json!({"spec": {"replicas": 2, "paused": false}});
        assert!(!is_derivative(&expected, &current));
    }

    #[test]
    fn test_missing_key_is_drift() {
        let expected = json!({"data": {"a": "1", "b": "2"}});
        let current = json!({"data": {"a": "1"}});
        assert!(!is_derivative(&expected, &current));
    }

    #[test]
    fn test_unset_expected_values_match_anything() {
        let expected = json!({"spec": {"args": [], "selector": {}, "name": "", "x": null}});
        let current = json!({"spec": {"args": ["--flag"]}});
        assert!(is_derivative(&expected, &current));
    }

    #[test]
    fn test_array_length_must_match() {
        let expected = json!({"ports": [{"port": 80}]});
        let current = json!({"ports": [{"port": 80}, {"port": 443}]});
        assert!(!is_derivative(&expected, &current));
    }

    #[test]
    fn test_quantities_compare_by_amount() {
        let expected = json!({"spec": {
            "resources": {"requests": {"storage": "1024Mi"}},
            "containers": [{"resources": {"limits": {"cpu": "500m", "memory": "1Gi"}}}],
            "volumes": [{"emptyDir": {"sizeLimit": "2048Mi"}}]
        }});
        let current = json!({"spec": {
            "resources": {"requests": {"storage": "1Gi"}},
            "containers": [{"resources": {"limits": {"cpu": "0.5", "memory": "1Gi"}}}],
            "volumes": [{"emptyDir": {"sizeLimit": "2Gi"}}]
        }});
        assert!(is_derivative(&expected, &current));

        let grown = json!({"spec": {"resources": {"requests": {"storage": "2Gi"}}}});
        assert!(!is_derivative(&grown, &current));
    }

    #[test]
    fn test_quantity_rules_stay_under_resource_keys() {
        let expected = json!({"env": [{"name": "RATIO", "value": "500m"}]});
        let current = json!({"env": [{"name": "RATIO", "value": "0.5"}]});
        assert!(!is_derivative(&expected, &current));
    }

    #[test]
    fn test_type_mismatch_is_drift() {
        assert!(!is_derivative(&json!({"a": {"b": 1}}), &json!({"a": "b"})));
        assert!(!is_derivative(&json!(true), &json!(false)));
        assert!(!is_derivative(&json!("80"), &json!(80)));
    }
}
