//! High-level prediction options accepted from callers.
//!
//! These objects are the ergonomic form of the `llm.prediction.*` key
//! namespace. Conversion to and from dotted-key layers lives in the
//! kv-config crate.

use crate::MaybeDisabled;
use lms_shared::{ErrorCode, ErrorEnvelope};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to do when the conversation outgrows the context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LlmContextOverflowPolicy {
    /// Stop generating once the context is full.
    StopAtLimit,
    /// Drop messages from the middle of the history.
    TruncateMiddle,
    /// Keep a rolling window of the most recent tokens.
    RollingWindow,
}

impl LlmContextOverflowPolicy {
    /// Every policy, in declaration order.
    pub const ALL: [Self; 3] = [Self::StopAtLimit, Self::TruncateMiddle, Self::RollingWindow];

    /// Wire string for the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StopAtLimit => "stopAtLimit",
            Self::TruncateMiddle => "truncateMiddle",
            Self::RollingWindow => "rollingWindow",
        }
    }
}

/// Kind of structured (constrained) output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LlmStructuredPredictionType {
    /// Free-form output.
    #[default]
    None,
    /// Output constrained by a JSON schema.
    Json,
    /// Output constrained by a GBNF grammar.
    Gbnf,
}

/// Structured output setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmStructuredPredictionSetting {
    /// Constraint kind.
    #[serde(rename = "type")]
    pub kind: LlmStructuredPredictionType,
    /// JSON schema when `kind` is `json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
    /// Grammar source when `kind` is `gbnf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gbnf_grammar: Option<String>,
}

/// How reasoning blocks are separated from the visible answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmReasoningParsing {
    /// Whether reasoning parsing is active.
    pub enabled: bool,
    /// Marker opening a reasoning block.
    pub start_string: String,
    /// Marker closing a reasoning block.
    pub end_string: String,
}

/// Prediction options; every field is optional and unset fields fall through
/// to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmPredictionConfig {
    /// Maximum number of generated tokens, or `false` for no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<MaybeDisabled<u32>>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Strings that stop generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_strings: Option<Vec<String>>,
    /// Strings that stop generation after a tool call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_stop_strings: Option<Vec<String>>,
    /// Context overflow handling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_overflow_policy: Option<LlmContextOverflowPolicy>,
    /// Structured output constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<LlmStructuredPredictionSetting>,
    /// Top-k sampling (`-1` disables).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k_sampling: Option<i64>,
    /// Repeat penalty, or `false` to disable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<MaybeDisabled<f64>>,
    /// Min-p sampling, or `false` to disable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_p_sampling: Option<MaybeDisabled<f64>>,
    /// Top-p sampling, or `false` to disable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p_sampling: Option<MaybeDisabled<f64>>,
    /// CPU threads used by the llama.cpp engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_threads: Option<u32>,
    /// Reasoning block parsing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_parsing: Option<LlmReasoningParsing>,
}

/// Parse prediction options from JSON.
pub fn parse_llm_prediction_config_json(input: &str) -> Result<LlmPredictionConfig, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("shared_types", "invalid_json"),
            format!("invalid prediction config JSON: {error}"),
        )
        .with_metadata("type", "LlmPredictionConfig")
    })
}

/// JSON schema of [`LlmPredictionConfig`].
#[must_use]
pub fn llm_prediction_config_schema() -> schemars::Schema {
    schemars::schema_for!(LlmPredictionConfig)
}
