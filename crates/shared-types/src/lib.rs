//! # lms-shared-types
//!
//! Wire types shared between the kv-config engine and its callers:
//!
//! - **Layers and stacks** - `KvConfig`, `KvConfigStack`, layer names
//! - **Prediction options** - `LlmPredictionConfig` and its enums
//! - **Load options** - `LlmLoadModelConfig`, GPU and cache settings
//!
//! ## Dependency Rules
//!
//! - Depends only on the `shared` crate
//! - Pure data with `serde` support; no schema logic

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub use lms_shared::shared_crate_version;

pub mod kv_config;
pub mod llm_load_config;
pub mod llm_prediction_config;
pub mod maybe_disabled;

pub use kv_config::{KvConfig, KvConfigField, KvConfigStack, KvConfigStackLayer, layer_names};
pub use llm_load_config::{
    GpuOffloadPreset, GpuOffloadRatio, GpuSetting, LlmLlamaCacheQuantizationType,
    LlmLoadModelConfig, MlxKvCacheQuantization,
};
pub use llm_prediction_config::{
    LlmContextOverflowPolicy, LlmPredictionConfig, LlmReasoningParsing,
    LlmStructuredPredictionSetting, LlmStructuredPredictionType, llm_prediction_config_schema,
    parse_llm_prediction_config_json,
};
pub use maybe_disabled::{Disabled, MaybeDisabled};

/// Returns the shared-types crate version.
#[must_use]
pub const fn shared_types_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
