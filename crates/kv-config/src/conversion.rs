//! Conversions between the typed option objects and dotted-key layers.
//!
//! Each option property maps to one field key through a [`Shape`] that knows
//! how the value is stored: as is, as a `{checked, value}` checkbox, as an
//! object carrying an `enabled` flag, or as one member of an option object.
//! Conversions do not validate ranges; collapse does.

use crate::error::KvConfigError;
use lms_shared_types::{KvConfig, LlmLoadModelConfig, LlmPredictionConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone)]
enum Shape {
    /// Stored unchanged.
    Plain,
    /// `T | false` stored as `{checked, value}`; `false` keeps this value.
    Checkbox(Value),
    /// `object | false` stored with an `enabled` flag; `false` keeps this
    /// object.
    EnabledObject(Value),
    /// One member of an option object.
    Member(&'static str),
}

#[derive(Debug, Clone)]
struct FieldMapping {
    option: &'static str,
    key: &'static str,
    shape: Shape,
}

const fn mapping(option: &'static str, key: &'static str, shape: Shape) -> FieldMapping {
    FieldMapping { option, key, shape }
}

fn prediction_mappings() -> Vec<FieldMapping> {
    vec![
        mapping("maxTokens", "llm.prediction.maxPredictedTokens", Shape::Checkbox(json!(1000))),
        mapping("temperature", "llm.prediction.temperature", Shape::Plain),
        mapping("stopStrings", "llm.prediction.stopStrings", Shape::Plain),
        mapping("toolCallStopStrings", "llm.prediction.toolCallStopStrings", Shape::Plain),
        mapping("contextOverflowPolicy", "llm.prediction.contextOverflowPolicy", Shape::Plain),
        mapping("structured", "llm.prediction.structured", Shape::Plain),
        mapping("topKSampling", "llm.prediction.topKSampling", Shape::Plain),
        mapping("repeatPenalty", "llm.prediction.repeatPenalty", Shape::Checkbox(json!(1.1))),
        mapping("minPSampling", "llm.prediction.minPSampling", Shape::Checkbox(json!(0.05))),
        mapping("topPSampling", "llm.prediction.topPSampling", Shape::Checkbox(json!(0.95))),
        mapping("cpuThreads", "llm.prediction.llama.cpuThreads", Shape::Plain),
        mapping("reasoningParsing", "llm.prediction.reasoning.parsing", Shape::Plain),
    ]
}

fn load_mappings() -> Vec<FieldMapping> {
    vec![
        mapping("contextLength", "llm.load.contextLength", Shape::Plain),
        mapping("seed", "llm.load.seed", Shape::Checkbox(json!(-1))),
        mapping("numExperts", "llm.load.numExperts", Shape::Plain),
        mapping("evalBatchSize", "llm.load.llama.evalBatchSize", Shape::Plain),
        mapping("gpu", "llm.load.llama.acceleration.offloadRatio", Shape::Member("ratio")),
        mapping("flashAttention", "llm.load.llama.flashAttention", Shape::Plain),
        mapping("keepModelInMemory", "llm.load.llama.keepModelInMemory", Shape::Plain),
        mapping("tryMmap", "llm.load.llama.tryMmap", Shape::Plain),
        mapping(
            "ropeFrequencyBase",
            "llm.load.llama.ropeFrequencyBase",
            Shape::Checkbox(json!(0)),
        ),
        mapping(
            "ropeFrequencyScale",
            "llm.load.llama.ropeFrequencyScale",
            Shape::Checkbox(json!(0)),
        ),
        mapping(
            "llamaKCacheQuantizationType",
            "llm.load.llama.kCacheQuantizationType",
            Shape::Checkbox(json!("f16")),
        ),
        mapping(
            "llamaVCacheQuantizationType",
            "llm.load.llama.vCacheQuantizationType",
            Shape::Checkbox(json!("f16")),
        ),
        mapping(
            "mlxKvCacheQuantization",
            "llm.load.mlx.kvCacheQuantization",
            Shape::EnabledObject(json!({ "bits": 8, "groupSize": 64, "quantizedStart": 5000 })),
        ),
    ]
}

/// Prediction options as a layer of `llm.prediction.*` fields.
pub fn llm_prediction_config_to_kv_config(
    config: &LlmPredictionConfig,
) -> Result<KvConfig, KvConfigError> {
    options_to_kv_config(config, "llm.prediction", &prediction_mappings())
}

/// Prediction options read back from a layer; unrelated keys are ignored.
pub fn kv_config_to_llm_prediction_config(
    config: &KvConfig,
) -> Result<LlmPredictionConfig, KvConfigError> {
    kv_config_to_options(config, &prediction_mappings())
}

/// Load options as a layer of `llm.load.*` fields.
pub fn llm_load_model_config_to_kv_config(
    config: &LlmLoadModelConfig,
) -> Result<KvConfig, KvConfigError> {
    options_to_kv_config(config, "llm.load", &load_mappings())
}

/// Load options read back from a layer; unrelated keys are ignored.
pub fn kv_config_to_llm_load_model_config(
    config: &KvConfig,
) -> Result<LlmLoadModelConfig, KvConfigError> {
    kv_config_to_options(config, &load_mappings())
}

fn options_to_kv_config<T: Serialize>(
    options: &T,
    prefix: &str,
    mappings: &[FieldMapping],
) -> Result<KvConfig, KvConfigError> {
    let encoded = serde_json::to_value(options).map_err(|error| KvConfigError::FieldTypeMismatch {
        key: prefix.to_string(),
        reason: error.to_string(),
    })?;

    let mut config = KvConfig::new();
    for mapping in mappings {
        let Some(value) = encoded.get(mapping.option) else {
            continue;
        };
        if let Some(stored) = to_stored(&mapping.shape, value) {
            config.set(mapping.key, stored);
        }
    }
    Ok(config)
}

fn kv_config_to_options<T: DeserializeOwned>(
    config: &KvConfig,
    mappings: &[FieldMapping],
) -> Result<T, KvConfigError> {
    let mut object = Map::new();
    for mapping in mappings {
        let Some(stored) = config.get(mapping.key) else {
            continue;
        };
        let option = from_stored(&mapping.shape, stored);
        let single = single_entry(mapping.option, option.clone());
        serde_json::from_value::<T>(single).map_err(|error| KvConfigError::FieldTypeMismatch {
            key: mapping.key.to_string(),
            reason: error.to_string(),
        })?;
        object.insert(mapping.option.to_string(), option);
    }

    serde_json::from_value(Value::Object(object)).map_err(|error| KvConfigError::FieldTypeMismatch {
        key: mappings
            .first()
            .map(|mapping| mapping.key.to_string())
            .unwrap_or_default(),
        reason: error.to_string(),
    })
}

fn to_stored(shape: &Shape, value: &Value) -> Option<Value> {
    match shape {
        Shape::Plain => Some(value.clone()),
        Shape::Checkbox(disabled) => Some(match value {
            Value::Bool(false) => json!({ "checked": false, "value": disabled }),
            other => json!({ "checked": true, "value": other }),
        }),
        Shape::EnabledObject(disabled) => {
            let (enabled, source) = match value {
                Value::Bool(false) => (false, disabled),
                other => (true, other),
            };
            let mut object = source.as_object().cloned().unwrap_or_default();
            object.insert("enabled".to_string(), Value::Bool(enabled));
            Some(Value::Object(object))
        },
        Shape::Member(member) => value.get(*member).cloned(),
    }
}

fn from_stored(shape: &Shape, stored: &Value) -> Value {
    match shape {
        Shape::Plain => stored.clone(),
        Shape::Checkbox(_) => match stored {
            Value::Object(object) => match (object.get("checked"), object.get("value")) {
                (Some(Value::Bool(true)), Some(value)) => value.clone(),
                (Some(Value::Bool(false)), _) => Value::Bool(false),
                _ => stored.clone(),
            },
            legacy => legacy.clone(),
        },
        Shape::EnabledObject(_) => match stored {
            Value::Object(object) => match object.get("enabled") {
                Some(Value::Bool(false)) => Value::Bool(false),
                _ => {
                    let mut object = object.clone();
                    object.remove("enabled");
                    Value::Object(object)
                },
            },
            other => other.clone(),
        },
        Shape::Member(member) => single_entry(member, stored.clone()),
    }
}

fn single_entry(key: &str, value: Value) -> Value {
    Value::Object([(key.to_string(), value)].into_iter().collect())
}
