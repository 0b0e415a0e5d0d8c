//! Value-type library: checkers, default factories, and (de)serialization
//! hooks keyed by a type key.
//!
//! A value type never sees a field key. It receives a raw JSON value and the
//! field's type parameters and either returns the normalized value or a
//! human-readable constraint violation. The schematics layer attaches the key.

use crate::error::KvConfigError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Validates a value against type parameters and returns the normalized value.
pub type CheckFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, String> + Send + Sync>;
/// Validates type parameters.
pub type ParamsCheckFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;
/// Produces a default value from type parameters.
pub type DefaultFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
/// Converts a normalized value into its wire representation.
pub type SerializeFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;
/// Upgrades a stored legacy representation; `None` when not recognized.
pub type DeserializeFn = Arc<dyn Fn(&Value, &Value) -> Option<Value> + Send + Sync>;

/// One registered value type.
#[derive(Clone)]
pub struct KvFieldValueType {
    checker: CheckFn,
    default_value: DefaultFn,
    params_checker: Option<ParamsCheckFn>,
    serialize: Option<SerializeFn>,
    deserialize: Option<DeserializeFn>,
}

impl KvFieldValueType {
    /// Create a value type from a checker and a default-value factory.
    pub fn new<C, D>(checker: C, default_value: D) -> Self
    where
        C: Fn(&Value, &Value) -> Result<Value, String> + Send + Sync + 'static,
        D: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self {
            checker: Arc::new(checker),
            default_value: Arc::new(default_value),
            params_checker: None,
            serialize: None,
            deserialize: None,
        }
    }

    /// Create a value type backed by serde types.
    ///
    /// The raw value is decoded into `T`, the parameters into `P` (`null`
    /// decodes to `P::default()`), then `validate` runs and the result is
    /// encoded back as the normalized value.
    pub fn typed<T, P, V, D>(validate: V, default_value: D) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        P: DeserializeOwned + Default + 'static,
        V: Fn(T, &P) -> Result<T, String> + Send + Sync + 'static,
        D: Fn(&P) -> T + Send + Sync + 'static,
    {
        Self::new(
            move |value, params| {
                let params = parse_params::<P>(params)?;
                let typed = decode_value::<T>(value)?;
                let checked = validate(typed, &params)?;
                serde_json::to_value(checked).map_err(|error| error.to_string())
            },
            move |params| {
                parse_params::<P>(params)
                    .ok()
                    .and_then(|params| serde_json::to_value(default_value(&params)).ok())
                    .unwrap_or(Value::Null)
            },
        )
        .with_params_checker(|params| parse_params::<P>(params).map(|_| ()))
    }

    /// Attach a type-parameter checker.
    #[must_use]
    pub fn with_params_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.params_checker = Some(Arc::new(checker));
        self
    }

    /// Attach a wire serializer.
    #[must_use]
    pub fn with_serializer<F>(mut self, serialize: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(serialize));
        self
    }

    /// Attach a legacy-representation deserializer.
    #[must_use]
    pub fn with_deserializer<F>(mut self, deserialize: F) -> Self
    where
        F: Fn(&Value, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(deserialize));
        self
    }

    /// Validate and normalize a value.
    pub fn check(&self, value: &Value, params: &Value) -> Result<Value, String> {
        (self.checker)(value, params)
    }

    /// Validate type parameters.
    pub fn check_params(&self, params: &Value) -> Result<(), String> {
        match &self.params_checker {
            Some(checker) => checker(params),
            None if params.is_null() || params.is_object() => Ok(()),
            None => Err("type parameters must be an object".to_string()),
        }
    }

    /// Default value for the given parameters.
    pub fn default_value(&self, params: &Value) -> Value {
        (self.default_value)(params)
    }

    /// Wire representation of a normalized value.
    pub fn serialize(&self, value: &Value, params: &Value) -> Value {
        self.serialize
            .as_ref()
            .map_or_else(|| value.clone(), |serialize| serialize(value, params))
    }

    /// Upgrade a stored value when the deserializer recognizes a legacy form.
    pub fn deserialize(&self, value: &Value, params: &Value) -> Option<Value> {
        self.deserialize
            .as_ref()
            .and_then(|deserialize| deserialize(value, params))
    }
}

impl fmt::Debug for KvFieldValueType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("KvFieldValueType")
            .field("has_params_checker", &self.params_checker.is_some())
            .field("has_serializer", &self.serialize.is_some())
            .field("has_deserializer", &self.deserialize.is_some())
            .finish_non_exhaustive()
    }
}

/// Registry of value types keyed by type key.
#[derive(Debug, Clone, Default)]
pub struct KvFieldValueTypeLibrary {
    types: BTreeMap<String, KvFieldValueType>,
}

impl KvFieldValueTypeLibrary {
    /// Create an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value type under a new key.
    pub fn register(
        mut self,
        type_key: impl Into<String>,
        value_type: KvFieldValueType,
    ) -> Result<Self, KvConfigError> {
        let type_key = type_key.into();
        if self.types.contains_key(&type_key) {
            return Err(KvConfigError::DuplicateValueType { type_key });
        }
        self.types.insert(type_key, value_type);
        Ok(self)
    }

    /// Look up a value type.
    pub fn get(&self, type_key: &str) -> Result<&KvFieldValueType, KvConfigError> {
        self.types
            .get(type_key)
            .ok_or_else(|| KvConfigError::UnknownValueType {
                type_key: type_key.to_string(),
            })
    }

    /// Returns true when the type key is registered.
    #[must_use]
    pub fn contains(&self, type_key: &str) -> bool {
        self.types.contains_key(type_key)
    }

    /// Registered type keys, sorted.
    pub fn type_keys(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

/// Decode type parameters, treating `null` as the parameter defaults.
pub fn parse_params<P: DeserializeOwned + Default>(params: &Value) -> Result<P, String> {
    if params.is_null() {
        return Ok(P::default());
    }
    serde_json::from_value(params.clone()).map_err(|error| error.to_string())
}

fn decode_value<T: DeserializeOwned>(value: &Value) -> Result<T, String> {
    serde_json::from_value(value.clone())
        .map_err(|error| format!("{error} (got {})", describe_kind(value)))
}

/// Short description of a JSON value's kind for error messages.
pub const fn describe_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
