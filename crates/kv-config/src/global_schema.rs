//! Process-wide schematics for every configuration domain.
//!
//! Each namespace is declared once as a fragment (a function that adds fields
//! to a builder scope). Domain schematics are composed from the shared
//! fragment plus one backend fragment; the global schematics holds every
//! fragment under its domain prefix. All of them are built on first access
//! and shared afterwards.

use crate::builtin_types::{
    BOOLEAN, CHECKBOX_NUMERIC, CONTEXT_OVERFLOW_POLICY, LLAMA_ACCELERATION_OFFLOAD_RATIO,
    LLAMA_CACHE_QUANTIZATION_TYPE, LLAMA_STRUCTURED_OUTPUT, MLX_KV_CACHE_QUANTIZATION_TYPE,
    NUMERIC, REASONING_PARSING, RETRIEVAL_CHUNKING_METHOD, STRING_ARRAY, kv_value_types_library,
};
use crate::error::KvConfigError;
use crate::schema::{FieldOptions, KvConfigSchematics, KvConfigSchematicsBuilder};
use crate::value_types::KvFieldValueTypeLibrary;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Key prefix of LLM prediction fields.
pub const LLM_PREDICTION_PREFIX: &str = "llm.prediction";
/// Key prefix of LLM load fields.
pub const LLM_LOAD_PREFIX: &str = "llm.load";
/// Key prefix of embedding load fields.
pub const EMBEDDING_LOAD_PREFIX: &str = "embedding.load";
/// Key prefix of retrieval fields.
pub const RETRIEVAL_PREFIX: &str = "retrieval";

const DEFAULT_MAX_PREDICTED_TOKENS: i64 = 1_000;

type Builder = KvConfigSchematicsBuilder;
type Fragment = fn(Builder) -> Result<Builder, KvConfigError>;

// =============================================================================
// FRAGMENTS
// =============================================================================

fn shared_prediction(builder: Builder) -> Result<Builder, KvConfigError> {
    builder
        .field("temperature", NUMERIC, json!({ "min": 0, "max": 2 }), json!(0.8))?
        .field(
            "contextOverflowPolicy",
            CONTEXT_OVERFLOW_POLICY,
            Value::Null,
            json!("truncateMiddle"),
        )?
        .field(
            "maxPredictedTokens",
            CHECKBOX_NUMERIC,
            json!({ "min": 1, "int": true }),
            json!({ "checked": false, "value": DEFAULT_MAX_PREDICTED_TOKENS }),
        )?
        .field("stopStrings", STRING_ARRAY, Value::Null, json!([]))?
        .field("toolCallStopStrings", STRING_ARRAY, Value::Null, json!([]))?
        .field("structured", LLAMA_STRUCTURED_OUTPUT, Value::Null, json!({ "type": "none" }))?
        .field(
            "topKSampling",
            NUMERIC,
            json!({ "min": -1, "max": 500, "int": true }),
            json!(40),
        )?
        .field(
            "repeatPenalty",
            CHECKBOX_NUMERIC,
            json!({ "min": 0 }),
            json!({ "checked": true, "value": 1.1 }),
        )?
        .field(
            "minPSampling",
            CHECKBOX_NUMERIC,
            json!({ "min": 0, "max": 1 }),
            json!({ "checked": true, "value": 0.05 }),
        )?
        .field(
            "topPSampling",
            CHECKBOX_NUMERIC,
            json!({ "min": 0, "max": 1 }),
            json!({ "checked": true, "value": 0.95 }),
        )?
        .field(
            "reasoning.parsing",
            REASONING_PARSING,
            Value::Null,
            json!({ "enabled": true, "startString": "<think>", "endString": "</think>" }),
        )?
        .virtual_field("isGreedy", &["temperature"], |values| {
            json!(values.first().and_then(|value| value.as_f64()) == Some(0.0))
        })?
        .writable_virtual_field(
            "maxTokens",
            &["maxPredictedTokens"],
            |values| render_checkbox_as_legacy(values.first().copied()),
            |value| match value {
                Value::Number(_) => Ok(vec![json!({ "checked": true, "value": value })]),
                Value::Bool(false) => Ok(vec![json!({
                    "checked": false,
                    "value": DEFAULT_MAX_PREDICTED_TOKENS,
                })]),
                _ => Err("expected a number or `false`".to_string()),
            },
        )
}

fn llama_prediction(builder: Builder) -> Result<Builder, KvConfigError> {
    builder.scope("llama", |builder| {
        builder.field("cpuThreads", NUMERIC, json!({ "min": 1, "int": true }), json!(4))
    })
}

fn shared_load(builder: Builder) -> Result<Builder, KvConfigError> {
    builder
        .field("contextLength", NUMERIC, json!({ "min": 1, "int": true }), json!(4096))?
        .field(
            "seed",
            CHECKBOX_NUMERIC,
            json!({ "int": true }),
            json!({ "checked": false, "value": -1 }),
        )
}

fn llama_load(builder: Builder) -> Result<Builder, KvConfigError> {
    builder.scope("llama", |builder| {
        llama_engine_fields(builder)?
            .field("flashAttention", BOOLEAN, Value::Null, json!(false))?
            .field(
                "kCacheQuantizationType",
                LLAMA_CACHE_QUANTIZATION_TYPE,
                Value::Null,
                json!({ "checked": false, "value": "f16" }),
            )?
            .field(
                "vCacheQuantizationType",
                LLAMA_CACHE_QUANTIZATION_TYPE,
                Value::Null,
                json!({ "checked": false, "value": "f16" }),
            )
    })
}

fn llama_moe_load(builder: Builder) -> Result<Builder, KvConfigError> {
    builder.field("numExperts", NUMERIC, json!({ "min": 0, "int": true }), json!(0))
}

fn mlx_load(builder: Builder) -> Result<Builder, KvConfigError> {
    builder.scope("mlx", |builder| {
        builder.field(
            "kvCacheQuantization",
            MLX_KV_CACHE_QUANTIZATION_TYPE,
            Value::Null,
            json!({ "enabled": false, "bits": 8, "groupSize": 64, "quantizedStart": 5000 }),
        )
    })
}

fn embedding_shared_load(builder: Builder) -> Result<Builder, KvConfigError> {
    builder
        .field("contextLength", NUMERIC, json!({ "min": 1, "int": true }), json!(2048))?
        .field(
            "seed",
            CHECKBOX_NUMERIC,
            json!({ "int": true }),
            json!({ "checked": false, "value": -1 }),
        )
}

fn embedding_llama_load(builder: Builder) -> Result<Builder, KvConfigError> {
    builder.scope("llama", llama_engine_fields)
}

/// Fields every llama.cpp model load understands, LLM or embedding.
fn llama_engine_fields(builder: Builder) -> Result<Builder, KvConfigError> {
    builder
        .field_with(
            "evalBatchSize",
            NUMERIC,
            json!({ "min": 1, "int": true }),
            json!(512),
            FieldOptions::new().effective(&["contextLength"], clamp_to_first_input),
        )?
        .field(
            "acceleration.offloadRatio",
            LLAMA_ACCELERATION_OFFLOAD_RATIO,
            Value::Null,
            json!("max"),
        )?
        .field("keepModelInMemory", BOOLEAN, Value::Null, json!(true))?
        .field("tryMmap", BOOLEAN, Value::Null, json!(true))?
        .field(
            "ropeFrequencyBase",
            CHECKBOX_NUMERIC,
            json!({ "min": 0 }),
            json!({ "checked": false, "value": 0 }),
        )?
        .field(
            "ropeFrequencyScale",
            CHECKBOX_NUMERIC,
            json!({ "min": 0 }),
            json!({ "checked": false, "value": 0 }),
        )
}

fn retrieval(builder: Builder) -> Result<Builder, KvConfigError> {
    builder
        .field(
            "chunkingMethod",
            RETRIEVAL_CHUNKING_METHOD,
            Value::Null,
            json!({ "type": "recursive-v1", "chunkSize": 512, "chunkOverlap": 100 }),
        )?
        .field("limit", NUMERIC, json!({ "min": 1, "int": true }), json!(3))?
        .field("affinityThreshold", NUMERIC, json!({ "min": 0, "max": 1 }), json!(0.5))
}

fn clamp_to_first_input(value: &Value, inputs: &[&Value]) -> Value {
    match (value.as_i64(), inputs.first().and_then(|input| input.as_i64())) {
        (Some(value), Some(limit)) => json!(value.min(limit)),
        _ => value.clone(),
    }
}

fn render_checkbox_as_legacy(value: Option<&Value>) -> Value {
    let checked = value
        .and_then(|value| value.get("checked"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    match value.and_then(|value| value.get("value")) {
        Some(inner) if checked => inner.clone(),
        _ => Value::Bool(false),
    }
}

// =============================================================================
// COMPOSITION
// =============================================================================

/// Every prebuilt schematics.
#[derive(Debug, Clone)]
struct GlobalSchematics {
    global: KvConfigSchematics,
    llm_prediction: KvConfigSchematics,
    llm_shared_prediction: KvConfigSchematics,
    llm_llama_prediction: KvConfigSchematics,
    llm_mlx_prediction: KvConfigSchematics,
    llm_onnx_prediction: KvConfigSchematics,
    llm_mistralrs_prediction: KvConfigSchematics,
    llm_load: KvConfigSchematics,
    llm_shared_load: KvConfigSchematics,
    llm_llama_load: KvConfigSchematics,
    llm_llama_moe_load: KvConfigSchematics,
    llm_mlx_load: KvConfigSchematics,
    llm_onnx_load: KvConfigSchematics,
    llm_mistralrs_load: KvConfigSchematics,
    embedding_load: KvConfigSchematics,
    embedding_shared_load: KvConfigSchematics,
    embedding_llama_load: KvConfigSchematics,
    retrieval: KvConfigSchematics,
    empty: KvConfigSchematics,
}

const PREDICTION_FRAGMENTS: [Fragment; 2] = [shared_prediction, llama_prediction];
const LOAD_FRAGMENTS: [Fragment; 4] = [shared_load, llama_load, llama_moe_load, mlx_load];
const EMBEDDING_LOAD_FRAGMENTS: [Fragment; 2] = [embedding_shared_load, embedding_llama_load];

fn compose(
    library: &Arc<KvFieldValueTypeLibrary>,
    name: &str,
    prefix: &str,
    fragments: &[Fragment],
) -> Result<KvConfigSchematics, KvConfigError> {
    KvConfigSchematicsBuilder::new(name, Arc::clone(library))
        .scope(prefix, |builder| apply_fragments(builder, fragments))?
        .build()
        .scoped(prefix)
}

fn apply_fragments(builder: Builder, fragments: &[Fragment]) -> Result<Builder, KvConfigError> {
    fragments
        .iter()
        .try_fold(builder, |builder, fragment| fragment(builder))
}

impl GlobalSchematics {
    fn build() -> Result<Self, KvConfigError> {
        let library = kv_value_types_library()?;
        let lib = &library;

        let global = KvConfigSchematicsBuilder::new("global", Arc::clone(lib))
            .scope(LLM_PREDICTION_PREFIX, |builder| {
                apply_fragments(builder, &PREDICTION_FRAGMENTS)
            })?
            .scope(LLM_LOAD_PREFIX, |builder| apply_fragments(builder, &LOAD_FRAGMENTS))?
            .scope(EMBEDDING_LOAD_PREFIX, |builder| {
                apply_fragments(builder, &EMBEDDING_LOAD_FRAGMENTS)
            })?
            .scope(RETRIEVAL_PREFIX, retrieval)?
            .build();

        let schematics = Self {
            llm_prediction: compose(
                lib,
                "llm prediction",
                LLM_PREDICTION_PREFIX,
                &PREDICTION_FRAGMENTS,
            )?,
            llm_shared_prediction: compose(
                lib,
                "llm shared prediction",
                LLM_PREDICTION_PREFIX,
                &[shared_prediction],
            )?,
            llm_llama_prediction: compose(
                lib,
                "llm llama prediction",
                LLM_PREDICTION_PREFIX,
                &[shared_prediction, llama_prediction],
            )?,
            llm_mlx_prediction: compose(
                lib,
                "llm mlx prediction",
                LLM_PREDICTION_PREFIX,
                &[shared_prediction],
            )?,
            llm_onnx_prediction: compose(
                lib,
                "llm onnx prediction",
                LLM_PREDICTION_PREFIX,
                &[shared_prediction],
            )?,
            llm_mistralrs_prediction: compose(
                lib,
                "llm mistral.rs prediction",
                LLM_PREDICTION_PREFIX,
                &[shared_prediction],
            )?,
            llm_load: compose(lib, "llm load", LLM_LOAD_PREFIX, &LOAD_FRAGMENTS)?,
            llm_shared_load: compose(lib, "llm shared load", LLM_LOAD_PREFIX, &[shared_load])?,
            llm_llama_load: compose(
                lib,
                "llm llama load",
                LLM_LOAD_PREFIX,
                &[shared_load, llama_load],
            )?,
            llm_llama_moe_load: compose(
                lib,
                "llm llama moe load",
                LLM_LOAD_PREFIX,
                &[shared_load, llama_load, llama_moe_load],
            )?,
            llm_mlx_load: compose(lib, "llm mlx load", LLM_LOAD_PREFIX, &[shared_load, mlx_load])?,
            llm_onnx_load: compose(lib, "llm onnx load", LLM_LOAD_PREFIX, &[shared_load])?,
            llm_mistralrs_load: compose(
                lib,
                "llm mistral.rs load",
                LLM_LOAD_PREFIX,
                &[shared_load],
            )?,
            embedding_load: compose(
                lib,
                "embedding load",
                EMBEDDING_LOAD_PREFIX,
                &EMBEDDING_LOAD_FRAGMENTS,
            )?,
            embedding_shared_load: compose(
                lib,
                "embedding shared load",
                EMBEDDING_LOAD_PREFIX,
                &[embedding_shared_load],
            )?,
            embedding_llama_load: compose(
                lib,
                "embedding llama load",
                EMBEDDING_LOAD_PREFIX,
                &EMBEDDING_LOAD_FRAGMENTS,
            )?,
            retrieval: compose(lib, "retrieval", RETRIEVAL_PREFIX, &[retrieval])?,
            empty: KvConfigSchematicsBuilder::new("empty", Arc::clone(lib)).build(),
            global,
        };

        debug!(
            fields = schematics.global.len(),
            value_types = library.type_keys().count(),
            "built global kv config schematics"
        );
        Ok(schematics)
    }
}

static GLOBAL: LazyLock<Result<GlobalSchematics, KvConfigError>> =
    LazyLock::new(GlobalSchematics::build);

fn select(
    pick: fn(&GlobalSchematics) -> &KvConfigSchematics,
) -> Result<KvConfigSchematics, KvConfigError> {
    GLOBAL.as_ref().map(|global| pick(global).clone()).map_err(Clone::clone)
}

// =============================================================================
// ACCESSORS
// =============================================================================

/// Every field of every domain, keyed by full key.
pub fn global_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.global)
}

/// LLM prediction fields of every backend.
pub fn llm_prediction_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_prediction)
}

/// LLM prediction fields understood by every backend.
pub fn llm_shared_prediction_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_shared_prediction)
}

/// LLM prediction fields for llama.cpp.
pub fn llm_llama_prediction_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_llama_prediction)
}

/// LLM prediction fields for MLX.
pub fn llm_mlx_prediction_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_mlx_prediction)
}

/// LLM prediction fields for ONNX.
pub fn llm_onnx_prediction_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_onnx_prediction)
}

/// LLM prediction fields for mistral.rs.
pub fn llm_mistralrs_prediction_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_mistralrs_prediction)
}

/// LLM load fields of every backend.
pub fn llm_load_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_load)
}

/// LLM load fields understood by every backend.
pub fn llm_shared_load_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_shared_load)
}

/// LLM load fields for llama.cpp.
pub fn llm_llama_load_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_llama_load)
}

/// LLM load fields for llama.cpp mixture-of-experts models.
pub fn llm_llama_moe_load_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_llama_moe_load)
}

/// LLM load fields for MLX.
pub fn llm_mlx_load_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_mlx_load)
}

/// LLM load fields for ONNX.
pub fn llm_onnx_load_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_onnx_load)
}

/// LLM load fields for mistral.rs.
pub fn llm_mistralrs_load_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.llm_mistralrs_load)
}

/// Embedding load fields of every backend.
pub fn embedding_load_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.embedding_load)
}

/// Embedding load fields understood by every backend.
pub fn embedding_shared_load_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.embedding_shared_load)
}

/// Embedding load fields for llama.cpp.
pub fn embedding_llama_load_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.embedding_llama_load)
}

/// Retrieval fields.
pub fn retrieval_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.retrieval)
}

/// A schematics with no fields.
pub fn empty_config_schematics() -> Result<KvConfigSchematics, KvConfigError> {
    select(|global| &global.empty)
}
