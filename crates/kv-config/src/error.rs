//! Error types for schema construction and stack collapse.

use lms_shared::{ErrorCode, ErrorEnvelope};
use thiserror::Error;

/// A raw value failed its value-type checker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for `{key}`: {reason}")]
pub struct InvalidFieldValue {
    /// Full dotted key of the field.
    pub key: String,
    /// Violated constraint.
    pub reason: String,
}

/// Failures raised by the kv-config engine.
///
/// Schema-construction variants indicate a defect in a schema declaration and
/// surface once at startup. Collapse and access variants are per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvConfigError {
    /// A schema references a type key that is not in the library.
    #[error("unknown value type `{type_key}`")]
    UnknownValueType {
        /// Requested type key.
        type_key: String,
    },
    /// A value type was registered twice.
    #[error("value type `{type_key}` is already registered")]
    DuplicateValueType {
        /// Conflicting type key.
        type_key: String,
    },
    /// A field key was declared twice in one schematics.
    #[error("{schematics}: key `{key}` is already declared")]
    DuplicateKey {
        /// Schematics name.
        schematics: String,
        /// Conflicting full key.
        key: String,
    },
    /// A field depends on itself.
    #[error("{schematics}: field `{key}` depends on itself")]
    CircularDependency {
        /// Schematics name.
        schematics: String,
        /// Offending full key.
        key: String,
    },
    /// A field depends on a key that is not declared before it.
    #[error("{schematics}: field `{key}` depends on undeclared field `{dependency}`")]
    UndeclaredDependency {
        /// Schematics name.
        schematics: String,
        /// Declaring field.
        key: String,
        /// Missing dependency.
        dependency: String,
    },
    /// Type parameters were rejected by the value type.
    #[error("{schematics}: invalid `{type_key}` parameters for `{key}`: {reason}")]
    InvalidTypeParams {
        /// Schematics name.
        schematics: String,
        /// Field key.
        key: String,
        /// Value type key.
        type_key: String,
        /// Parameter violation.
        reason: String,
    },
    /// A declared default fails its own checker.
    #[error("{schematics}: default for `{key}` is invalid: {reason}")]
    InvalidDefault {
        /// Schematics name.
        schematics: String,
        /// Field key.
        key: String,
        /// Checker failure.
        reason: String,
    },
    /// A layer supplied a value that failed validation during collapse.
    #[error("{error} (layer `{layer}`)")]
    FieldValidation {
        /// Layer that supplied the winning value.
        layer: String,
        /// Underlying checker failure.
        #[source]
        error: InvalidFieldValue,
    },
    /// Keys unknown to the schematics were found under the reject policy.
    #[error("{schematics}: unknown keys: {}", .keys.join(", "))]
    UnknownKeys {
        /// Schematics name.
        schematics: String,
        /// Unknown full keys, sorted.
        keys: Vec<String>,
    },
    /// A lookup named a field the schematics does not declare.
    #[error("{schematics}: no field `{key}`")]
    UnknownField {
        /// Schematics name.
        schematics: String,
        /// Requested key.
        key: String,
    },
    /// A resolved value could not be converted to the requested Rust type.
    #[error("field `{key}` cannot be read as the requested type: {reason}")]
    FieldTypeMismatch {
        /// Field key.
        key: String,
        /// Deserialization failure.
        reason: String,
    },
    /// Two schematics with different base keys were combined.
    #[error("cannot combine schematics with base keys `{left}` and `{right}`")]
    BaseKeyMismatch {
        /// Base key of the receiver.
        left: String,
        /// Base key of the argument.
        right: String,
    },
    /// A write through a virtual field could not be mapped to concrete fields.
    #[error("cannot write virtual field `{key}`: {reason}")]
    InvalidVirtualWrite {
        /// Virtual field key.
        key: String,
        /// Mapping failure.
        reason: String,
    },
    /// No schematics is registered for a domain and backend.
    #[error("no schematics registered for {domain} with backend {backend}")]
    UnsupportedTarget {
        /// Configuration domain.
        domain: String,
        /// Inference backend.
        backend: String,
    },
}

impl KvConfigError {
    /// Returns the checker failure when the error came from a rejected value.
    #[must_use]
    pub const fn invalid_field_value(&self) -> Option<&InvalidFieldValue> {
        match self {
            Self::FieldValidation { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns true for errors that indicate a defect in a schema declaration.
    #[must_use]
    pub const fn is_schema_defect(&self) -> bool {
        matches!(
            self,
            Self::UnknownValueType { .. }
                | Self::DuplicateValueType { .. }
                | Self::DuplicateKey { .. }
                | Self::CircularDependency { .. }
                | Self::UndeclaredDependency { .. }
                | Self::InvalidTypeParams { .. }
                | Self::InvalidDefault { .. }
                | Self::BaseKeyMismatch { .. }
        )
    }

    fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::UnknownValueType { .. } => "unknown_value_type",
            Self::DuplicateValueType { .. } => "duplicate_value_type",
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::CircularDependency { .. } => "circular_dependency",
            Self::UndeclaredDependency { .. } => "undeclared_dependency",
            Self::InvalidTypeParams { .. } => "invalid_type_params",
            Self::InvalidDefault { .. } => "invalid_default",
            Self::FieldValidation { .. } => "invalid_field_value",
            Self::UnknownKeys { .. } => "unknown_keys",
            Self::UnknownField { .. } => "unknown_field",
            Self::FieldTypeMismatch { .. } => "field_type_mismatch",
            Self::BaseKeyMismatch { .. } => "base_key_mismatch",
            Self::InvalidVirtualWrite { .. } => "invalid_virtual_write",
            Self::UnsupportedTarget { .. } => "unsupported_target",
        };
        ErrorCode::new("kv_config", code)
    }
}

impl From<KvConfigError> for ErrorEnvelope {
    fn from(error: KvConfigError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let mut envelope = if error.is_schema_defect() {
            Self::invariant(code, message)
        } else {
            Self::expected(code, message)
        };

        match error {
            KvConfigError::UnknownValueType { type_key }
            | KvConfigError::DuplicateValueType { type_key } => {
                envelope = envelope.with_metadata("typeKey", type_key);
            },
            KvConfigError::DuplicateKey { schematics, key }
            | KvConfigError::CircularDependency { schematics, key }
            | KvConfigError::UnknownField { schematics, key }
            | KvConfigError::InvalidDefault {
                schematics, key, ..
            } => {
                envelope = envelope
                    .with_metadata("schematics", schematics)
                    .with_metadata("key", key);
            },
            KvConfigError::UndeclaredDependency {
                schematics,
                key,
                dependency,
            } => {
                envelope = envelope
                    .with_metadata("schematics", schematics)
                    .with_metadata("key", key)
                    .with_metadata("dependency", dependency);
            },
            KvConfigError::InvalidTypeParams {
                schematics,
                key,
                type_key,
                ..
            } => {
                envelope = envelope
                    .with_metadata("schematics", schematics)
                    .with_metadata("key", key)
                    .with_metadata("typeKey", type_key);
            },
            KvConfigError::FieldValidation { layer, error } => {
                envelope = envelope
                    .with_metadata("layer", layer)
                    .with_metadata("key", error.key)
                    .with_metadata("reason", error.reason);
            },
            KvConfigError::UnknownKeys { schematics, keys } => {
                envelope = envelope
                    .with_metadata("schematics", schematics)
                    .with_metadata("keys", keys.join(","));
            },
            KvConfigError::FieldTypeMismatch { key, .. }
            | KvConfigError::InvalidVirtualWrite { key, .. } => {
                envelope = envelope.with_metadata("key", key);
            },
            KvConfigError::BaseKeyMismatch { left, right } => {
                envelope = envelope
                    .with_metadata("left", left)
                    .with_metadata("right", right);
            },
            KvConfigError::UnsupportedTarget { domain, backend } => {
                envelope = envelope
                    .with_metadata("domain", domain)
                    .with_metadata("backend", backend);
            },
        }

        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_shared::ErrorKind;

    #[test]
    fn field_validation_maps_to_request_rejection() {
        let error = KvConfigError::FieldValidation {
            layer: "request".to_string(),
            error: InvalidFieldValue {
                key: "llm.prediction.temperature".to_string(),
                reason: "must be at most 2".to_string(),
            },
        };
        assert_eq!(
            error.invalid_field_value().map(|inner| inner.key.as_str()),
            Some("llm.prediction.temperature")
        );

        let envelope = ErrorEnvelope::from(error);
        assert_eq!(envelope.kind, ErrorKind::Expected);
        assert_eq!(
            envelope.code,
            ErrorCode::new("kv_config", "invalid_field_value")
        );
        assert_eq!(
            envelope.metadata.get("layer").map(String::as_str),
            Some("request")
        );
        assert_eq!(
            envelope.metadata.get("key").map(String::as_str),
            Some("llm.prediction.temperature")
        );
    }

    #[test]
    fn schema_defects_map_to_invariants() {
        let error = KvConfigError::DuplicateKey {
            schematics: "llm prediction".to_string(),
            key: "llm.prediction.temperature".to_string(),
        };
        assert!(error.is_schema_defect());

        let envelope = ErrorEnvelope::from(error);
        assert_eq!(envelope.kind, ErrorKind::Invariant);
        assert_eq!(envelope.code, ErrorCode::new("kv_config", "duplicate_key"));
    }

    #[test]
    fn display_names_layer_and_key() {
        let error = KvConfigError::FieldValidation {
            layer: "request".to_string(),
            error: InvalidFieldValue {
                key: "temperature".to_string(),
                reason: "must be at most 2".to_string(),
            },
        };

        assert_eq!(
            error.to_string(),
            "invalid value for `temperature`: must be at most 2 (layer `request`)"
        );
    }
}
