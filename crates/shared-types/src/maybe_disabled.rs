//! Option values that are either set or explicitly switched off with `false`.

use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;

/// Marker that serializes as the JSON literal `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disabled;

impl Serialize for Disabled {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(false)
    }
}

impl<'de> Deserialize<'de> for Disabled {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if bool::deserialize(deserializer)? {
            Err(de::Error::invalid_value(Unexpected::Bool(true), &"false"))
        } else {
            Ok(Self)
        }
    }
}

impl JsonSchema for Disabled {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("Disabled")
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({ "const": false })
    }
}

/// A value, or `false` to switch the option off.
///
/// Used by option objects such as `maxTokens: 100 | false`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum MaybeDisabled<T> {
    /// The option is on with this value.
    Enabled(T),
    /// The option is off.
    Disabled(Disabled),
}

impl<T> MaybeDisabled<T> {
    /// Build the disabled variant.
    pub const fn disabled() -> Self {
        Self::Disabled(Disabled)
    }

    /// Returns the enabled value, if any.
    pub const fn enabled(&self) -> Option<&T> {
        match self {
            Self::Enabled(value) => Some(value),
            Self::Disabled(_) => None,
        }
    }

    /// Returns true when the option is on.
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}

impl<T> From<Option<T>> for MaybeDisabled<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Disabled(Disabled), Self::Enabled)
    }
}
