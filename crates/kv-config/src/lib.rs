//! # lms-kv-config
//!
//! Layered key-value configuration: a library of value types, schematics
//! declaring typed fields under dotted keys, and the collapse of a stack of
//! partial layers into one fully resolved configuration.
//!
//! Process-wide schematics for LLM load, LLM prediction, embedding load, and
//! retrieval are built once on first use and looked up by domain and backend
//! through [`SchematicsRegistry`]. This crate depends on `shared` and
//! `shared-types` only.

/// Built-in value types and the process-wide library.
pub mod builtin_types;
/// Stack collapse and resolved configurations.
pub mod collapse;
/// Conversions between typed option structs and layers.
pub mod conversion;
/// Error types for schema construction and collapse.
pub mod error;
/// Process-wide schematics per domain and backend.
pub mod global_schema;
/// Layer and stack operations that need no schematics.
pub mod kv;
/// Layer loading from JSON and TOML documents.
pub mod load;
/// Domain/backend lookup.
pub mod registry;
/// Field schemas, schematics, and their builders.
pub mod schema;
/// Value types and the value-type library.
pub mod value_types;

pub use builtin_types::{build_value_types_library, kv_value_types_library};
pub use collapse::{
    CollapseOptions, PARSE_LAYER, ParsedKvConfig, UnknownKeyPolicy, collapse_kv_stack,
    collapse_kv_stack_raw, collapse_kv_stack_with,
};
pub use conversion::{
    kv_config_to_llm_load_model_config, kv_config_to_llm_prediction_config,
    llm_load_model_config_to_kv_config, llm_prediction_config_to_kv_config,
};
pub use error::{InvalidFieldValue, KvConfigError};
pub use global_schema::{
    embedding_llama_load_config_schematics, embedding_load_schematics,
    embedding_shared_load_config_schematics, empty_config_schematics, global_config_schematics,
    llm_llama_load_config_schematics, llm_llama_moe_load_config_schematics,
    llm_llama_prediction_config_schematics, llm_load_schematics,
    llm_mistralrs_load_config_schematics, llm_mistralrs_prediction_config_schematics,
    llm_mlx_load_config_schematics, llm_mlx_prediction_config_schematics,
    llm_onnx_load_config_schematics, llm_onnx_prediction_config_schematics,
    llm_prediction_config_schematics, llm_shared_load_config_schematics,
    llm_shared_prediction_config_schematics, retrieval_schematics,
};
pub use kv::{
    add_kv_config_to_stack, combine_kv_stack, empty_kv_config, empty_kv_config_stack,
    filter_kv_config, kv_config_equals, kv_config_to_fields, kv_config_to_map,
    make_kv_config_from_fields, map_to_kv_config, single_layer_kv_config_stack_of,
};
pub use load::{
    kv_config_from_document, kv_config_from_json, kv_config_from_toml, kv_config_stack_from_json,
    load_kv_config_from_path, load_kv_config_stack_from_paths, to_pretty_json,
};
pub use registry::{ConfigDomain, InferenceBackend, SchematicsRegistry};
pub use schema::{
    ConcreteFieldSchema, FieldOptions, FieldSchema, KvConfigBuilder, KvConfigSchematics,
    KvConfigSchematicsBuilder, VirtualFieldSchema,
};
pub use value_types::{KvFieldValueType, KvFieldValueTypeLibrary};

pub use lms_shared_types::{KvConfig, KvConfigField, KvConfigStack, KvConfigStackLayer};

/// Returns the kv-config crate version.
#[must_use]
pub const fn kv_config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
