//! Stack collapse: last-write-wins merge, then per-field resolution.
//!
//! Resolution runs in declaration order:
//! - concrete fields take the winning raw value (deserialized and checked) or
//!   their default, then apply their effective-value derivation;
//! - virtual fields render from the resolved concrete fields.
//!
//! Raw values stored under virtual keys are never read.

use crate::error::KvConfigError;
use crate::kv::single_layer_kv_config_stack_of;
use crate::schema::{FieldSchema, KvConfigSchematics};
use lms_shared_types::{KvConfig, KvConfigStack};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Layer name used by [`KvConfigSchematics::parse`].
pub const PARSE_LAYER: &str = "parse";

static MISSING: Value = Value::Null;

/// Handling of layer keys the schematics does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownKeyPolicy {
    /// Drop them silently.
    #[default]
    Ignore,
    /// Log each one and record it on the result.
    Warn,
    /// Record them on the result.
    Collect,
    /// Fail the collapse.
    Reject,
}

impl UnknownKeyPolicy {
    /// Every policy, in declaration order.
    pub const ALL: [Self; 4] = [Self::Ignore, Self::Warn, Self::Collect, Self::Reject];

    /// Lowercase name of the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Warn => "warn",
            Self::Collect => "collect",
            Self::Reject => "reject",
        }
    }
}

/// Options for [`collapse_kv_stack_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollapseOptions {
    /// What to do with keys unknown to the schematics.
    pub unknown_keys: UnknownKeyPolicy,
}

impl CollapseOptions {
    /// Options with the given unknown-key policy.
    #[must_use]
    pub const fn with_unknown_keys(mut self, policy: UnknownKeyPolicy) -> Self {
        self.unknown_keys = policy;
        self
    }
}

/// Fully resolved configuration: one value per declared field.
#[derive(Debug, Clone)]
pub struct ParsedKvConfig {
    schematics: KvConfigSchematics,
    values: Vec<Value>,
    unknown_keys: Vec<String>,
}

impl ParsedKvConfig {
    /// The schematics the values were resolved against.
    pub const fn schematics(&self) -> &KvConfigSchematics {
        &self.schematics
    }

    /// Effective value of a field, by key relative to the base key.
    pub fn get(&self, key: &str) -> Result<&Value, KvConfigError> {
        self.schematics
            .position(&self.schematics.full_key(key))
            .and_then(|position| self.values.get(position))
            .ok_or_else(|| KvConfigError::UnknownField {
                schematics: self.schematics.name().to_string(),
                key: key.to_string(),
            })
    }

    /// Effective value of a field converted to a Rust type.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, KvConfigError> {
        let value = self.get(key)?;
        serde_json::from_value(value.clone()).map_err(|error| KvConfigError::FieldTypeMismatch {
            key: self.schematics.full_key(key),
            reason: error.to_string(),
        })
    }

    /// `(key, value)` pairs in declaration order; keys are relative to the
    /// base key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schematics
            .fields()
            .zip(&self.values)
            .map(|(field, value)| {
                (
                    self.schematics.short_key(field.key()).unwrap_or(field.key()),
                    value,
                )
            })
    }

    /// Full keys found in the stack but not declared, sorted. Only filled
    /// under the warn and collect policies.
    pub fn unknown_keys(&self) -> &[String] {
        &self.unknown_keys
    }

    /// Concrete effective values as a layer keyed by full key.
    pub fn to_kv_config(&self) -> KvConfig {
        self.concrete_values()
            .map(|(field, value)| (field.key().to_string(), value.clone()))
            .collect()
    }

    /// Concrete effective values in wire form (serialize hooks applied),
    /// keyed by full key.
    pub fn to_wire_map(&self) -> BTreeMap<String, Value> {
        self.concrete_values()
            .filter_map(|(field, value)| {
                field
                    .as_concrete()
                    .map(|concrete| (concrete.key().to_string(), concrete.serialize(value)))
            })
            .collect()
    }

    /// Every effective value (concrete and virtual) keyed by full key.
    pub fn to_effective_map(&self) -> BTreeMap<String, Value> {
        self.schematics
            .fields()
            .zip(&self.values)
            .map(|(field, value)| (field.key().to_string(), value.clone()))
            .collect()
    }

    fn concrete_values(&self) -> impl Iterator<Item = (&FieldSchema, &Value)> {
        self.schematics
            .fields()
            .zip(&self.values)
            .filter(|(field, _)| field.as_concrete().is_some())
    }
}

/// Schema-free merge: for each key in any layer, the value from the latest
/// layer that defines it. Keys keep the order of their first appearance.
pub fn collapse_kv_stack_raw(stack: &KvConfigStack) -> KvConfig {
    let mut collapsed = KvConfig::new();
    for layer in &stack.layers {
        for field in &layer.config.fields {
            collapsed.set(field.key.clone(), field.value.clone());
        }
    }
    collapsed
}

/// Collapse a stack against a schematics with default options.
pub fn collapse_kv_stack(
    stack: &KvConfigStack,
    schematics: &KvConfigSchematics,
) -> Result<ParsedKvConfig, KvConfigError> {
    collapse_kv_stack_with(stack, schematics, CollapseOptions::default())
}

/// Collapse a stack against a schematics.
pub fn collapse_kv_stack_with(
    stack: &KvConfigStack,
    schematics: &KvConfigSchematics,
    options: CollapseOptions,
) -> Result<ParsedKvConfig, KvConfigError> {
    let winners = winning_values(stack);
    let unknown_keys = apply_unknown_key_policy(schematics, &winners, options.unknown_keys)?;

    let mut resolved: BTreeMap<&str, Value> = BTreeMap::new();
    for field in schematics.concrete_fields() {
        let mut value = match winners.get(field.key()) {
            Some(winner) => field
                .check(winner.value)
                .map_err(|error| KvConfigError::FieldValidation {
                    layer: winner.layer.to_string(),
                    error,
                })?,
            None => field.default_value().clone(),
        };
        if let Some(effective) = field.effective() {
            let inputs = lookup_all(&resolved, effective.dependencies());
            value = effective.derive(&value, &inputs);
        }
        resolved.insert(field.key(), value);
    }

    let values = schematics
        .fields()
        .map(|field| match field {
            FieldSchema::Concrete(concrete) => resolved
                .get(concrete.key())
                .cloned()
                .unwrap_or_else(|| concrete.default_value().clone()),
            FieldSchema::Virtual(virtual_field) => {
                virtual_field.render(&lookup_all(&resolved, virtual_field.dependencies()))
            },
        })
        .collect::<Vec<_>>();

    debug!(
        schematics = schematics.name(),
        layers = stack.layers.len(),
        fields = values.len(),
        unknown_keys = unknown_keys.len(),
        "collapsed kv config stack"
    );

    Ok(ParsedKvConfig {
        schematics: schematics.clone(),
        values,
        unknown_keys,
    })
}

impl KvConfigSchematics {
    /// Resolve a single layer: checked values, defaults, and derivations.
    pub fn parse(&self, config: &KvConfig) -> Result<ParsedKvConfig, KvConfigError> {
        collapse_kv_stack(
            &single_layer_kv_config_stack_of(PARSE_LAYER, config.clone()),
            self,
        )
    }
}

struct Winner<'a> {
    value: &'a Value,
    layer: &'a str,
}

fn winning_values(stack: &KvConfigStack) -> BTreeMap<&str, Winner<'_>> {
    let mut winners = BTreeMap::new();
    for layer in &stack.layers {
        for field in &layer.config.fields {
            winners.insert(
                field.key.as_str(),
                Winner {
                    value: &field.value,
                    layer: layer.layer_name.as_str(),
                },
            );
        }
    }
    winners
}

fn lookup_all<'a>(resolved: &'a BTreeMap<&str, Value>, keys: &[String]) -> Vec<&'a Value> {
    keys.iter()
        .map(|key| resolved.get(key.as_str()).unwrap_or(&MISSING))
        .collect()
}

fn apply_unknown_key_policy(
    schematics: &KvConfigSchematics,
    winners: &BTreeMap<&str, Winner<'_>>,
    policy: UnknownKeyPolicy,
) -> Result<Vec<String>, KvConfigError> {
    if policy == UnknownKeyPolicy::Ignore {
        return Ok(Vec::new());
    }

    let unknown: Vec<(&str, &str)> = winners
        .iter()
        .filter(|(key, _)| schematics.field_by_full_key(key).is_none())
        .map(|(key, winner)| (*key, winner.layer))
        .collect();

    match policy {
        UnknownKeyPolicy::Reject if !unknown.is_empty() => Err(KvConfigError::UnknownKeys {
            schematics: schematics.name().to_string(),
            keys: unknown.iter().map(|(key, _)| (*key).to_string()).collect(),
        }),
        UnknownKeyPolicy::Warn => {
            for (key, layer) in &unknown {
                warn!(schematics = schematics.name(), key, layer, "unknown kv config key");
            }
            Ok(unknown.into_iter().map(|(key, _)| key.to_string()).collect())
        },
        UnknownKeyPolicy::Collect => {
            Ok(unknown.into_iter().map(|(key, _)| key.to_string()).collect())
        },
        UnknownKeyPolicy::Ignore | UnknownKeyPolicy::Reject => Ok(Vec::new()),
    }
}
