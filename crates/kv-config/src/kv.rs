//! Value-level operations on layers and stacks.
//!
//! Every operation returns a new value; inputs are never mutated.

use lms_shared_types::{KvConfig, KvConfigField, KvConfigStack, KvConfigStackLayer};
use serde_json::Value;
use std::collections::BTreeMap;

/// A layer with no fields.
pub const fn empty_kv_config() -> KvConfig {
    KvConfig::new()
}

/// A stack with no layers.
pub const fn empty_kv_config_stack() -> KvConfigStack {
    KvConfigStack { layers: Vec::new() }
}

/// A stack holding exactly one layer.
pub fn single_layer_kv_config_stack_of(
    layer_name: impl Into<String>,
    config: KvConfig,
) -> KvConfigStack {
    add_kv_config_to_stack(&empty_kv_config_stack(), layer_name, config)
}

/// Append a layer on top of the stack (highest precedence).
pub fn add_kv_config_to_stack(
    stack: &KvConfigStack,
    layer_name: impl Into<String>,
    config: KvConfig,
) -> KvConfigStack {
    let mut layers = stack.layers.clone();
    layers.push(KvConfigStackLayer {
        layer_name: layer_name.into(),
        config,
    });
    KvConfigStack { layers }
}

/// Layer contents as ordered `{key, value}` pairs.
pub fn kv_config_to_fields(config: &KvConfig) -> Vec<KvConfigField> {
    config.fields.clone()
}

/// Layer from ordered `{key, value}` pairs.
pub const fn make_kv_config_from_fields(fields: Vec<KvConfigField>) -> KvConfig {
    KvConfig::from_fields(fields)
}

/// Layer contents as a key to value map; the last occurrence of a key wins.
pub fn kv_config_to_map(config: &KvConfig) -> BTreeMap<String, Value> {
    config
        .fields
        .iter()
        .map(|field| (field.key.clone(), field.value.clone()))
        .collect()
}

/// Layer from a key to value map.
pub fn map_to_kv_config(map: BTreeMap<String, Value>) -> KvConfig {
    map.into_iter().collect()
}

/// Structural equality ignoring field order.
pub fn kv_config_equals(left: &KvConfig, right: &KvConfig) -> bool {
    left == right
}

/// Keep the fields for which `predicate(key, value)` holds.
pub fn filter_kv_config<P>(config: &KvConfig, mut predicate: P) -> KvConfig
where
    P: FnMut(&str, &Value) -> bool,
{
    KvConfig::from_fields(
        config
            .fields
            .iter()
            .filter(|field| predicate(&field.key, &field.value))
            .cloned()
            .collect(),
    )
}

/// Concatenate two stacks; every layer of `top` outranks every layer of `bottom`.
pub fn combine_kv_stack(bottom: &KvConfigStack, top: &KvConfigStack) -> KvConfigStack {
    KvConfigStack {
        layers: bottom.layers.iter().chain(&top.layers).cloned().collect(),
    }
}
