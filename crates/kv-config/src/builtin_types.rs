//! Built-in value types shared by every global schematics.

use crate::error::KvConfigError;
use crate::value_types::{
    KvFieldValueType, KvFieldValueTypeLibrary, describe_kind, parse_params,
};
use lms_shared_types::{
    GpuOffloadPreset, GpuOffloadRatio, LlmContextOverflowPolicy, LlmLlamaCacheQuantizationType,
    LlmReasoningParsing, LlmStructuredPredictionSetting, LlmStructuredPredictionType,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};

/// Type key of bounded numbers.
pub const NUMERIC: &str = "numeric";
/// Type key of bounded strings.
pub const STRING: &str = "string";
/// Type key of strings restricted to a list of options.
pub const SELECT: &str = "select";
/// Type key of booleans.
pub const BOOLEAN: &str = "boolean";
/// Type key of string lists.
pub const STRING_ARRAY: &str = "stringArray";
/// Type key of `{checked, value}` numbers.
pub const CHECKBOX_NUMERIC: &str = "checkboxNumeric";
/// Type key of number lists.
pub const NUMERIC_ARRAY: &str = "numericArray";
/// Type key of the context overflow policy.
pub const CONTEXT_OVERFLOW_POLICY: &str = "contextOverflowPolicy";
/// Type key of the structured output setting.
pub const LLAMA_STRUCTURED_OUTPUT: &str = "llamaStructuredOutput";
/// Type key of the GPU offload ratio.
pub const LLAMA_ACCELERATION_OFFLOAD_RATIO: &str = "llamaAccelerationOffloadRatio";
/// Type key of the llama.cpp K/V cache quantization setting.
pub const LLAMA_CACHE_QUANTIZATION_TYPE: &str = "llamaCacheQuantizationType";
/// Type key of the MLX KV cache quantization setting.
pub const MLX_KV_CACHE_QUANTIZATION_TYPE: &str = "mlxKvCacheQuantizationType";
/// Type key of reasoning block parsing.
pub const REASONING_PARSING: &str = "reasoningParsing";
/// Type key of the retrieval chunking method.
pub const RETRIEVAL_CHUNKING_METHOD: &str = "retrievalChunkingMethod";

static LIBRARY: LazyLock<Result<Arc<KvFieldValueTypeLibrary>, KvConfigError>> =
    LazyLock::new(|| build_value_types_library().map(Arc::new));

/// The process-wide library of built-in value types.
pub fn kv_value_types_library() -> Result<Arc<KvFieldValueTypeLibrary>, KvConfigError> {
    LIBRARY.as_ref().map(Arc::clone).map_err(Clone::clone)
}

/// Build a fresh library holding every built-in value type.
pub fn build_value_types_library() -> Result<KvFieldValueTypeLibrary, KvConfigError> {
    KvFieldValueTypeLibrary::new()
        .register(NUMERIC, numeric())?
        .register(STRING, string())?
        .register(SELECT, select())?
        .register(BOOLEAN, boolean())?
        .register(STRING_ARRAY, string_array())?
        .register(CHECKBOX_NUMERIC, checkbox_numeric())?
        .register(NUMERIC_ARRAY, numeric_array())?
        .register(CONTEXT_OVERFLOW_POLICY, context_overflow_policy())?
        .register(LLAMA_STRUCTURED_OUTPUT, llama_structured_output())?
        .register(LLAMA_ACCELERATION_OFFLOAD_RATIO, offload_ratio())?
        .register(LLAMA_CACHE_QUANTIZATION_TYPE, llama_cache_quantization())?
        .register(MLX_KV_CACHE_QUANTIZATION_TYPE, mlx_kv_cache_quantization())?
        .register(REASONING_PARSING, reasoning_parsing())?
        .register(RETRIEVAL_CHUNKING_METHOD, retrieval_chunking_method())
}

// =============================================================================
// NUMBERS
// =============================================================================

/// Parameters of numeric value types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct NumericParams {
    /// Inclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Require an integral value.
    pub int: bool,
}

/// Largest magnitude below which every integer has an exact `f64` form.
const MAX_EXACT_F64_INTEGER: f64 = 9_007_199_254_740_992.0;

impl NumericParams {
    fn check_value(&self, value: &Value) -> Result<Value, String> {
        if !value.is_number() {
            return Err(format!("expected a number, got {}", describe_kind(value)));
        }
        if self.int {
            let integer = integral_value(value)?;
            self.check_bounds(integer_as_f64(integer), &integer.to_string())?;
            return Ok(Value::from(integer));
        }
        let number = value
            .as_f64()
            .filter(|number| number.is_finite())
            .ok_or_else(|| "must be a finite number".to_string())?;
        self.check_bounds(number, &number.to_string())?;
        Ok(Value::from(number))
    }

    fn check_bounds(&self, number: f64, shown: &str) -> Result<(), String> {
        if let Some(min) = self.min
            && number < min
        {
            return Err(format!("must be at least {min} (got {shown})"));
        }
        if let Some(max) = self.max
            && number > max
        {
            return Err(format!("must be at most {max} (got {shown})"));
        }
        Ok(())
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "defaults come from declared bounds, which params checking keeps in range"
    )]
    fn number_value(&self, number: f64) -> Value {
        if self.int {
            Value::from(number.ceil() as i64)
        } else {
            Value::from(number)
        }
    }
    fn fallback(&self) -> f64 {
        let mut number = 0.0_f64;
        if let Some(min) = self.min {
            number = number.max(min);
        }
        if let Some(max) = self.max {
            number = number.min(max);
        }
        number
    }

    fn validate(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.min, self.max)
            && min > max
        {
            return Err(format!("min {min} is greater than max {max}"));
        }
        if self.int
            && [self.min, self.max]
                .into_iter()
                .flatten()
                .any(|bound| !bound.is_finite() || bound.abs() > MAX_EXACT_F64_INTEGER)
        {
            return Err("integer bounds must be exactly representable".to_string());
        }
        Ok(())
    }
}

fn integral_value(value: &Value) -> Result<i64, String> {
    if let Some(integer) = value.as_i64() {
        return Ok(integer);
    }
    if value.is_u64() {
        return Err(format!("must fit in a 64-bit signed integer (got {value})"));
    }
    let number = value
        .as_f64()
        .filter(|number| number.is_finite())
        .ok_or_else(|| "must be a finite number".to_string())?;
    if number.fract() != 0.0 {
        return Err(format!("must be an integer (got {number})"));
    }
    if number.abs() > MAX_EXACT_F64_INTEGER {
        return Err(format!("must be an exactly representable integer (got {number})"));
    }
    #[allow(
        clippy::cast_possible_truncation,
        reason = "whole numbers within 2^53 convert exactly"
    )]
    let integer = number as i64;
    Ok(integer)
}

#[allow(
    clippy::cast_precision_loss,
    reason = "bounds are compared as f64 like every other numeric field"
)]
fn integer_as_f64(integer: i64) -> f64 {
    integer as f64
}

fn check_numeric_params(params: &Value) -> Result<(), String> {
    parse_params::<NumericParams>(params)?.validate()
}

fn numeric() -> KvFieldValueType {
    KvFieldValueType::new(
        |value, params| {
            let params = parse_params::<NumericParams>(params)?;
            params.check_value(value)
        },
        |params| {
            let params = parse_params::<NumericParams>(params).unwrap_or_default();
            params.number_value(params.fallback())
        },
    )
    .with_params_checker(check_numeric_params)
}

fn numeric_array() -> KvFieldValueType {
    KvFieldValueType::new(
        |value, params| {
            let params = parse_params::<NumericParams>(params)?;
            let items = value
                .as_array()
                .ok_or_else(|| format!("expected an array, got {}", describe_kind(value)))?;
            items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    params
                        .check_value(item)
                        .map_err(|reason| format!("item {index}: {reason}"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        },
        |_| json!([]),
    )
    .with_params_checker(check_numeric_params)
}

/// Stored form of `checkboxNumeric` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckboxNumeric {
    checked: bool,
    value: serde_json::Number,
}

fn checkbox_numeric() -> KvFieldValueType {
    KvFieldValueType::new(
        |value, params| {
            let params = parse_params::<NumericParams>(params)?;
            let stored: CheckboxNumeric = serde_json::from_value(value.clone()).map_err(|error| {
                format!("expected {{checked, value}}: {error} (got {})", describe_kind(value))
            })?;
            let number = params
                .check_value(&Value::Number(stored.value))
                .map_err(|reason| format!("value {reason}"))?;
            Ok(json!({ "checked": stored.checked, "value": number }))
        },
        |params| {
            let params = parse_params::<NumericParams>(params).unwrap_or_default();
            json!({ "checked": false, "value": params.number_value(params.fallback()) })
        },
    )
    .with_params_checker(check_numeric_params)
    .with_deserializer(|value, params| {
        // Older layers stored the bare number, or `false` when switched off.
        let params = parse_params::<NumericParams>(params).ok()?;
        match value {
            Value::Number(_) => Some(json!({ "checked": true, "value": value })),
            Value::Bool(false) => Some(
                json!({ "checked": false, "value": params.number_value(params.fallback()) }),
            ),
            _ => None,
        }
    })
}

// =============================================================================
// STRINGS, SELECTS, BOOLEANS
// =============================================================================

/// Parameters of string value types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct StringParams {
    /// Minimum number of characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum number of characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

fn string() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: String, params: &StringParams| {
            let length = value.chars().count();
            if let Some(min) = params.min_length
                && length < min
            {
                return Err(format!("must have at least {min} characters"));
            }
            if let Some(max) = params.max_length
                && length > max
            {
                return Err(format!("must have at most {max} characters"));
            }
            Ok(value)
        },
        |_params: &StringParams| String::new(),
    )
}

/// Parameters of `select` value types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SelectParams {
    /// Allowed values.
    pub options: Vec<String>,
}

fn select() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: String, params: &SelectParams| {
            if params.options.contains(&value) {
                Ok(value)
            } else {
                Err(format!(
                    "must be one of [{}] (got `{value}`)",
                    params.options.join(", ")
                ))
            }
        },
        |params: &SelectParams| params.options.first().cloned().unwrap_or_default(),
    )
    .with_params_checker(|params| {
        let params = parse_params::<SelectParams>(params)?;
        if params.options.is_empty() {
            Err("options must not be empty".to_string())
        } else {
            Ok(())
        }
    })
}

/// Parameters of types that accept none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

fn boolean() -> KvFieldValueType {
    KvFieldValueType::typed(|value: bool, _: &NoParams| Ok(value), |_: &NoParams| false)
}

/// Parameters of `stringArray` value types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct StringArrayParams {
    /// Maximum number of items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_num_items: Option<usize>,
    /// Accept empty strings as items.
    pub allow_empty_strings: bool,
}

fn string_array() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: Vec<String>, params: &StringArrayParams| {
            if let Some(max) = params.max_num_items
                && value.len() > max
            {
                return Err(format!("must have at most {max} items"));
            }
            if !params.allow_empty_strings && value.iter().any(String::is_empty) {
                return Err("must not contain empty strings".to_string());
            }
            Ok(value)
        },
        |_params: &StringArrayParams| Vec::new(),
    )
}

fn context_overflow_policy() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: LlmContextOverflowPolicy, _: &NoParams| Ok(value),
        |_: &NoParams| LlmContextOverflowPolicy::TruncateMiddle,
    )
}

// =============================================================================
// ENGINE SETTINGS
// =============================================================================

fn llama_structured_output() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: LlmStructuredPredictionSetting, _: &NoParams| match value.kind {
            LlmStructuredPredictionType::None => Ok(LlmStructuredPredictionSetting::default()),
            LlmStructuredPredictionType::Json => match &value.json_schema {
                Some(Value::Object(_) | Value::Bool(_)) => Ok(value),
                _ => Err("json output requires a `jsonSchema` object".to_string()),
            },
            LlmStructuredPredictionType::Gbnf => match value.gbnf_grammar.as_deref() {
                Some(grammar) if !grammar.trim().is_empty() => Ok(value),
                _ => Err("gbnf output requires a non-empty `gbnfGrammar`".to_string()),
            },
        },
        |_: &NoParams| LlmStructuredPredictionSetting::default(),
    )
}

fn offload_ratio() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: GpuOffloadRatio, _: &NoParams| match value {
            GpuOffloadRatio::Ratio(ratio) if !(0.0..=1.0).contains(&ratio) => {
                Err(format!("ratio must be within [0, 1] (got {ratio})"))
            },
            other => Ok(other),
        },
        |_: &NoParams| GpuOffloadRatio::Preset(GpuOffloadPreset::Max),
    )
    .with_serializer(|value, _| match value {
        Value::String(preset) if preset == "max" => json!(1.0),
        Value::String(preset) if preset == "off" => json!(0.0),
        other => other.clone(),
    })
}

/// Stored form of `llamaCacheQuantizationType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckboxCacheType {
    checked: bool,
    value: LlmLlamaCacheQuantizationType,
}

fn llama_cache_quantization() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: CheckboxCacheType, _: &NoParams| Ok(value),
        |_: &NoParams| CheckboxCacheType {
            checked: false,
            value: LlmLlamaCacheQuantizationType::F16,
        },
    )
    .with_deserializer(|value, _| match value {
        Value::String(name) => LlmLlamaCacheQuantizationType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name.as_str())
            .map(|kind| json!({ "checked": true, "value": kind.as_str() })),
        Value::Bool(false) => Some(json!({
            "checked": false,
            "value": LlmLlamaCacheQuantizationType::F16.as_str(),
        })),
        _ => None,
    })
}

/// Stored form of `mlxKvCacheQuantizationType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MlxKvCacheQuantizationSetting {
    enabled: bool,
    bits: u8,
    group_size: u32,
    quantized_start: u32,
}

const MLX_KV_BITS: [u8; 5] = [2, 3, 4, 6, 8];
const MLX_KV_GROUP_SIZES: [u32; 3] = [32, 64, 128];

fn mlx_kv_cache_quantization() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: MlxKvCacheQuantizationSetting, _: &NoParams| {
            if !MLX_KV_BITS.contains(&value.bits) {
                return Err(format!("bits must be one of {MLX_KV_BITS:?}"));
            }
            if !MLX_KV_GROUP_SIZES.contains(&value.group_size) {
                return Err(format!("groupSize must be one of {MLX_KV_GROUP_SIZES:?}"));
            }
            Ok(value)
        },
        |_: &NoParams| MlxKvCacheQuantizationSetting {
            enabled: false,
            bits: 8,
            group_size: 64,
            quantized_start: 5_000,
        },
    )
}

fn reasoning_parsing() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: LlmReasoningParsing, _: &NoParams| {
            if value.enabled && (value.start_string.is_empty() || value.end_string.is_empty()) {
                Err("enabled parsing requires start and end strings".to_string())
            } else {
                Ok(value)
            }
        },
        |_: &NoParams| LlmReasoningParsing {
            enabled: true,
            start_string: "<think>".to_string(),
            end_string: "</think>".to_string(),
        },
    )
}

/// Stored form of `retrievalChunkingMethod` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", deny_unknown_fields)]
enum RetrievalChunkingMethod {
    #[serde(rename = "recursive-v1", rename_all = "camelCase")]
    RecursiveV1 { chunk_size: u32, chunk_overlap: u32 },
}

fn retrieval_chunking_method() -> KvFieldValueType {
    KvFieldValueType::typed(
        |value: RetrievalChunkingMethod, _: &NoParams| match value {
            RetrievalChunkingMethod::RecursiveV1 {
                chunk_size,
                chunk_overlap,
            } if chunk_size == 0 || chunk_overlap >= chunk_size => Err(format!(
                "chunkOverlap ({chunk_overlap}) must be below a positive chunkSize ({chunk_size})"
            )),
            other => Ok(other),
        },
        |_: &NoParams| RetrievalChunkingMethod::RecursiveV1 {
            chunk_size: 512,
            chunk_overlap: 100,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> Result<Arc<KvFieldValueTypeLibrary>, KvConfigError> {
        kv_value_types_library()
    }

    #[test]
    fn numeric_enforces_range_and_integers() -> Result<(), KvConfigError> {
        let library = library()?;
        let numeric = library.get(NUMERIC)?;
        let params = json!({ "min": 0, "max": 2 });

        assert_eq!(numeric.check(&json!(0.5), &params), Ok(json!(0.5)));
        assert!(numeric.check(&json!(5), &params).is_err());
        assert!(numeric.check(&json!("5"), &params).is_err());

        let int_params = json!({ "min": 1, "int": true });
        assert_eq!(numeric.check(&json!(512.0), &int_params), Ok(json!(512)));
        assert!(numeric.check(&json!(1.5), &int_params).is_err());
        assert_eq!(numeric.default_value(&int_params), json!(1));
        Ok(())
    }

    #[test]
    fn integer_fields_keep_large_values_exact_or_reject_them() -> Result<(), KvConfigError> {
        let library = library()?;
        let numeric = library.get(NUMERIC)?;
        let checkbox = library.get(CHECKBOX_NUMERIC)?;
        let int_params = json!({ "int": true });

        assert!(numeric.check(&json!(1e30), &int_params).is_err());
        assert!(numeric.check(&json!(1e300), &int_params).is_err());
        assert!(numeric.check(&json!(u64::MAX), &int_params).is_err());
        assert!(numeric.check(&json!(9_007_199_254_740_994.0), &int_params).is_err());
        assert_eq!(
            numeric.check(&json!(9_007_199_254_740_993_i64), &int_params),
            Ok(json!(9_007_199_254_740_993_i64))
        );
        assert_eq!(numeric.check(&json!(i64::MIN), &int_params), Ok(json!(i64::MIN)));

        assert!(
            checkbox
                .check(&json!({ "checked": true, "value": 1e30 }), &int_params)
                .is_err()
        );
        assert_eq!(
            checkbox.check(
                &json!({ "checked": true, "value": 9_007_199_254_740_993_i64 }),
                &int_params
            ),
            Ok(json!({ "checked": true, "value": 9_007_199_254_740_993_i64 }))
        );
        assert!(numeric.check_params(&json!({ "int": true, "max": 1e30 })).is_err());
        Ok(())
    }

    #[test]
    fn numeric_rejects_inverted_bounds() -> Result<(), KvConfigError> {
        let library = library()?;
        let numeric = library.get(NUMERIC)?;

        assert!(numeric.check_params(&json!({ "min": 3, "max": 1 })).is_err());
        assert!(numeric.check_params(&json!({ "minimum": 3 })).is_err());
        Ok(())
    }

    #[test]
    fn checkbox_numeric_upgrades_legacy_values() -> Result<(), KvConfigError> {
        let library = library()?;
        let checkbox = library.get(CHECKBOX_NUMERIC)?;
        let params = json!({ "min": 1, "int": true });

        assert_eq!(
            checkbox.deserialize(&json!(64), &params),
            Some(json!({ "checked": true, "value": 64 }))
        );
        assert_eq!(
            checkbox.deserialize(&json!(false), &params),
            Some(json!({ "checked": false, "value": 1 }))
        );
        assert_eq!(
            checkbox.check(&json!({ "checked": true, "value": 64.0 }), &params),
            Ok(json!({ "checked": true, "value": 64 }))
        );
        assert!(
            checkbox
                .check(&json!({ "checked": true, "value": 0 }), &params)
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn select_requires_options() -> Result<(), KvConfigError> {
        let library = library()?;
        let select = library.get(SELECT)?;
        let params = json!({ "options": ["a", "b"] });

        assert!(select.check_params(&json!({ "options": [] })).is_err());
        assert_eq!(select.check(&json!("b"), &params), Ok(json!("b")));
        assert!(select.check(&json!("c"), &params).is_err());
        assert_eq!(select.default_value(&params), json!("a"));
        Ok(())
    }

    #[test]
    fn string_array_rejects_empty_items() -> Result<(), KvConfigError> {
        let library = library()?;
        let strings = library.get(STRING_ARRAY)?;

        assert!(strings.check(&json!(["", "x"]), &Value::Null).is_err());
        assert_eq!(
            strings.check(&json!(["", "x"]), &json!({ "allowEmptyStrings": true })),
            Ok(json!(["", "x"]))
        );
        Ok(())
    }

    #[test]
    fn offload_ratio_serializes_presets_as_numbers() -> Result<(), KvConfigError> {
        let library = library()?;
        let ratio = library.get(LLAMA_ACCELERATION_OFFLOAD_RATIO)?;

        assert_eq!(ratio.check(&json!("max"), &Value::Null), Ok(json!("max")));
        assert!(ratio.check(&json!(1.5), &Value::Null).is_err());
        assert_eq!(ratio.serialize(&json!("max"), &Value::Null), json!(1.0));
        assert_eq!(ratio.serialize(&json!("off"), &Value::Null), json!(0.0));
        assert_eq!(ratio.serialize(&json!(0.25), &Value::Null), json!(0.25));
        Ok(())
    }

    #[test]
    fn structured_output_requires_payload() -> Result<(), KvConfigError> {
        let library = library()?;
        let structured = library.get(LLAMA_STRUCTURED_OUTPUT)?;

        assert!(
            structured
                .check(&json!({ "type": "json" }), &Value::Null)
                .is_err()
        );
        assert!(
            structured
                .check(&json!({ "type": "gbnf", "gbnfGrammar": "root ::= \"a\"" }), &Value::Null)
                .is_ok()
        );
        assert_eq!(
            structured.default_value(&Value::Null),
            json!({ "type": "none" })
        );
        Ok(())
    }

    #[test]
    fn cache_quantization_upgrades_bare_names() -> Result<(), KvConfigError> {
        let library = library()?;
        let cache = library.get(LLAMA_CACHE_QUANTIZATION_TYPE)?;

        assert_eq!(
            cache.deserialize(&json!("q8_0"), &Value::Null),
            Some(json!({ "checked": true, "value": "q8_0" }))
        );
        assert_eq!(cache.deserialize(&json!("q9"), &Value::Null), None);
        assert!(
            cache
                .check(&json!({ "checked": true, "value": "q9" }), &Value::Null)
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn mlx_quantization_limits_bits() -> Result<(), KvConfigError> {
        let library = library()?;
        let mlx = library.get(MLX_KV_CACHE_QUANTIZATION_TYPE)?;
        let mut value = mlx.default_value(&Value::Null);

        assert!(mlx.check(&value, &Value::Null).is_ok());
        value["bits"] = json!(5);
        assert!(mlx.check(&value, &Value::Null).is_err());
        Ok(())
    }

    #[test]
    fn chunking_overlap_must_be_below_size() -> Result<(), KvConfigError> {
        let library = library()?;
        let chunking = library.get(RETRIEVAL_CHUNKING_METHOD)?;

        assert_eq!(
            chunking.default_value(&Value::Null),
            json!({ "type": "recursive-v1", "chunkSize": 512, "chunkOverlap": 100 })
        );
        assert!(
            chunking
                .check(
                    &json!({ "type": "recursive-v1", "chunkSize": 10, "chunkOverlap": 10 }),
                    &Value::Null
                )
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn every_default_passes_its_checker() -> Result<(), KvConfigError> {
        let library = library()?;
        let select_params = json!({ "options": ["x"] });

        for type_key in library.type_keys() {
            let params = if type_key == SELECT {
                &select_params
            } else {
                &Value::Null
            };
            let value_type = library.get(type_key)?;
            let default = value_type.default_value(params);
            assert!(
                value_type.check(&default, params).is_ok(),
                "default of {type_key} failed its checker"
            );
        }
        Ok(())
    }
}
