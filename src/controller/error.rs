//! # Errors
//!
//! Error type shared by the reconciliation engine and its classification.
//!
//! | class | examples | handling |
//! |---|---|---|
//! | transient | API errors, conflicts, rate limits, missing template | Fibonacci backoff retry |
//! | immutable field | update rejected because a field is immutable | delete-then-create when allowed |
//! | configuration | secret declared without a store reference, template cycle, name owned by another instance | long fixed requeue |
//! | fatal | hashing / serialization failures | backoff retry, never swallowed |
//!
//! "Not found" is not an error: stores report it as an absent object.

use crate::controller::store::ResourceKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Object store error outside the Kubernetes API (transient)
    #[error("Store error on {kind} {name}: {message}")]
    Store {
        kind: ResourceKind,
        name: String,
        message: String,
    },

    /// Update rejected because it touches an immutable field
    #[error("Immutable field conflict on {kind} {name}: {message}")]
    ImmutableField {
        kind: ResourceKind,
        name: String,
        message: String,
    },

    /// The declared spec cannot be built; retrying will not help until it is edited
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Referenced AppTemplate does not exist (yet)
    #[error("AppTemplate {0} not found")]
    TemplateNotFound(String),

    /// A generated name is already taken by an object another AppInstance controls
    #[error("{kind} {name} is already controlled by AppInstance {owner}")]
    OwnershipConflict {
        kind: ResourceKind,
        name: String,
        owner: String,
    },

    /// The baseRef chain loops back onto itself
    #[error("AppTemplate inheritance cycle: {}", .chain.join(" -> "))]
    TemplateCycle { chain: Vec<String> },

    /// Hashing or serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error class driving retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    ImmutableField,
    Configuration,
    Fatal,
}

impl ErrorClass {
    /// Label value for metrics and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::ImmutableField => "immutable-field",
            ErrorClass::Configuration => "configuration",
            ErrorClass::Fatal => "fatal",
        }
    }
}

impl ReconcilerError {
    /// Build a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Classify the error for retry policy
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Kube(_) | Self::Store { .. } | Self::TemplateNotFound(_) => ErrorClass::Transient,
            Self::ImmutableField { .. } => ErrorClass::ImmutableField,
            Self::Configuration(_) | Self::TemplateCycle { .. } | Self::OwnershipConflict { .. } => {
                ErrorClass::Configuration
            }
            Self::Serialization(_) => ErrorClass::Fatal,
        }
    }

    /// Whether the error may resolve itself on a later attempt
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self.class(), ErrorClass::Configuration)
    }

    /// Whether the error is an immutable-field conflict
    #[must_use]
    pub fn is_immutable_field_conflict(&self) -> bool {
        matches!(self, Self::ImmutableField { .. })
    }

    /// Map a Kubernetes API error raised while writing `kind`/`name`
    ///
    /// 422 responses mentioning an immutable field become [`ReconcilerError::ImmutableField`].
    #[must_use]
    pub fn from_write(error: kube::Error, kind: ResourceKind, name: &str) -> Self {
        match &error {
            kube::Error::Api(response)
                if response.code == 422 && is_immutable_message(&response.message) =>
            {
                Self::ImmutableField {
                    kind,
                    name: name.to_string(),
                    message: response.message.clone(),
                }
            }
            _ => Self::Kube(error),
        }
    }
}

/// Whether an API error message reports an immutable field
#[must_use]
pub fn is_immutable_message(message: &str) -> bool {
    message.contains("field is immutable")
}

/// Whether a Kubernetes API error is a 404
#[must_use]
pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let store = ReconcilerError::Store {
            kind: ResourceKind::Service,
            name: "web".into(),
            message: "connection reset".into(),
        };
        assert_eq!(store.class(), ErrorClass::Transient);
        assert!(store.is_retryable());

        let immutable = ReconcilerError::ImmutableField {
            kind: ResourceKind::Deployment,
            name: "web".into(),
            message: "spec.selector: Invalid value: field is immutable".into(),
        };
        assert!(immutable.is_immutable_field_conflict());
        assert_eq!(immutable.class().as_str(), "immutable-field");

        let config = ReconcilerError::configuration("secretStoreRef is not set");
        assert_eq!(config.class(), ErrorClass::Configuration);
        assert!(!config.is_retryable());

        let cycle = ReconcilerError::TemplateCycle {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(cycle.class(), ErrorClass::Configuration);
        assert_eq!(
            cycle.to_string(),
            "AppTemplate inheritance cycle: a -> b -> a"
        );

        assert_eq!(
            ReconcilerError::TemplateNotFound("base".into()).class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_serialization_errors_are_fatal() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ReconcilerError::from(err);
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_immutable_message_detection() {
        assert!(is_immutable_message(
            r#"Deployment.apps "web" is invalid: spec.selector: Invalid value: {...}: field is immutable"#
        ));
        assert!(!is_immutable_message("the object has been modified"));
    }
}
