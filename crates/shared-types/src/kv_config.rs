//! Wire representation of kv-config layers and stacks.
//!
//! A [`KvConfig`] is one layer: a list of dotted-key fields with loosely typed
//! JSON values. A [`KvConfigStack`] orders layers from lowest to highest
//! precedence. Both mirror the documents exchanged with the inference service.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known layer names used by the client and the service.
///
/// Layer names are descriptive only; nothing enforces uniqueness.
pub mod layer_names {
    /// Built-in defaults shipped with the model.
    pub const MODEL_DEFAULT: &str = "modelDefault";
    /// Defaults the user saved for a model.
    pub const USER_MODEL_DEFAULT: &str = "userModelDefault";
    /// Defaults pushed by the service for the session.
    pub const SERVER_SESSION: &str = "serverSession";
    /// Settings of a loaded model instance.
    pub const INSTANCE: &str = "instance";
    /// Settings of a preset.
    pub const PRESET: &str = "preset";
    /// Settings persisted for a conversation.
    pub const CONVERSATION_SPECIFIC: &str = "conversationSpecific";
    /// Overrides passed through the API for a single call.
    pub const API_OVERRIDE: &str = "apiOverride";
    /// Overrides attached to an HTTP server request.
    pub const HTTP_SERVER_REQUEST_OVERRIDE: &str = "httpServerRequestOverride";
}

/// One dotted-key field of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvConfigField {
    /// Full dotted key (e.g. `llm.prediction.temperature`).
    pub key: String,
    /// Raw value, possibly legacy or untyped.
    pub value: Value,
}

impl KvConfigField {
    /// Create a field from a key and value.
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One configuration layer.
///
/// Equality ignores field order. When a key appears more than once the last
/// occurrence wins, both for lookups and for equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvConfig {
    /// Fields of the layer.
    pub fields: Vec<KvConfigField>,
}

impl KvConfig {
    /// Create an empty layer.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Create a layer from fields, keeping their order.
    #[must_use]
    pub const fn from_fields(fields: Vec<KvConfigField>) -> Self {
        Self { fields }
    }

    /// Look up the value stored for a full key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .rev()
            .find(|field| field.key == key)
            .map(|field| &field.value)
    }

    /// Returns true when the layer defines the key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|field| field.key == key)
    }

    /// Number of stored fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true when the layer has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over keys in stored order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.key.as_str())
    }

    /// Set a key, replacing an existing entry in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.fields.iter_mut().rev().find(|field| field.key == key) {
            existing.value = value;
        } else {
            self.fields.push(KvConfigField { key, value });
        }
    }

    fn as_lookup(&self) -> BTreeMap<&str, &Value> {
        self.fields
            .iter()
            .map(|field| (field.key.as_str(), &field.value))
            .collect()
    }
}

impl PartialEq for KvConfig {
    fn eq(&self, other: &Self) -> bool {
        self.as_lookup() == other.as_lookup()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for KvConfig {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut config = Self::new();
        for (key, value) in iter {
            config.set(key, value);
        }
        config
    }
}

/// One named layer of a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvConfigStackLayer {
    /// Descriptive layer identifier used in diagnostics.
    pub layer_name: String,
    /// Layer contents.
    pub config: KvConfig,
}

/// Ordered layers; later layers take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvConfigStack {
    /// Layers from lowest to highest precedence.
    pub layers: Vec<KvConfigStackLayer>,
}

impl KvConfigStack {
    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns true when the stack has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn equality_ignores_field_order() {
        let left = KvConfig::from_fields(vec![
            KvConfigField::new("a", 1),
            KvConfigField::new("b", "two"),
        ]);
        let right = KvConfig::from_fields(vec![
            KvConfigField::new("b", "two"),
            KvConfigField::new("a", 1),
        ]);

        assert_eq!(left, right);
    }

    #[test]
    fn later_duplicate_wins() {
        let config = KvConfig::from_fields(vec![
            KvConfigField::new("a", 1),
            KvConfigField::new("a", 2),
        ]);

        assert_eq!(config.get("a"), Some(&json!(2)));
        assert_eq!(config, KvConfig::from_iter([("a", json!(2))]));
    }

    #[test]
    fn set_replaces_in_place() {
        let mut config = KvConfig::from_iter([("a", json!(1)), ("b", json!(2))]);
        config.set("a", 3);

        assert_eq!(config.len(), 2);
        assert_eq!(config.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(config.get("a"), Some(&json!(3)));
    }

    #[test]
    fn stack_uses_camel_case_layer_names() -> Result<(), Box<dyn std::error::Error>> {
        let stack = KvConfigStack {
            layers: vec![KvConfigStackLayer {
                layer_name: layer_names::API_OVERRIDE.to_string(),
                config: KvConfig::from_iter([("llm.prediction.temperature", json!(0.5))]),
            }],
        };
        let encoded = serde_json::to_value(&stack)?;

        assert_eq!(
            encoded,
            json!({
                "layers": [{
                    "layerName": "apiOverride",
                    "config": { "fields": [{ "key": "llm.prediction.temperature", "value": 0.5 }] }
                }]
            })
        );
        let decoded: KvConfigStack = serde_json::from_value(encoded)?;
        assert_eq!(decoded, stack);
        Ok(())
    }

    proptest! {
        #[test]
        fn equality_is_symmetric_and_order_insensitive(
            entries in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..12)
        ) {
            let forward: KvConfig = entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let backward: KvConfig =
                entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();

            prop_assert_eq!(&forward, &forward);
            prop_assert_eq!(&forward, &backward);
            prop_assert_eq!(&backward, &forward);
        }
    }
}
