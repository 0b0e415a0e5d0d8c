//! High-level model load options accepted from callers.

use crate::MaybeDisabled;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Named GPU offload presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GpuOffloadPreset {
    /// Offload as many layers as fit.
    Max,
    /// Run entirely on the CPU.
    Off,
}

/// Share of the model offloaded to the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum GpuOffloadRatio {
    /// Fraction in `[0, 1]`.
    Ratio(f64),
    /// Named preset.
    Preset(GpuOffloadPreset),
}

/// GPU placement settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GpuSetting {
    /// Offload ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<GpuOffloadRatio>,
}

/// Quantization types for the llama.cpp K/V cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LlmLlamaCacheQuantizationType {
    /// 32-bit float.
    #[serde(rename = "f32")]
    F32,
    /// 16-bit float.
    #[serde(rename = "f16")]
    F16,
    /// 8-bit, block type 0.
    #[serde(rename = "q8_0")]
    Q80,
    /// 4-bit, block type 0.
    #[serde(rename = "q4_0")]
    Q40,
    /// 4-bit, block type 1.
    #[serde(rename = "q4_1")]
    Q41,
    /// 4-bit non-linear.
    #[serde(rename = "iq4_nl")]
    Iq4Nl,
    /// 5-bit, block type 0.
    #[serde(rename = "q5_0")]
    Q50,
    /// 5-bit, block type 1.
    #[serde(rename = "q5_1")]
    Q51,
}

impl LlmLlamaCacheQuantizationType {
    /// Every cache type, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::F32,
        Self::F16,
        Self::Q80,
        Self::Q40,
        Self::Q41,
        Self::Iq4Nl,
        Self::Q50,
        Self::Q51,
    ];

    /// Wire string for the cache type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::Q80 => "q8_0",
            Self::Q40 => "q4_0",
            Self::Q41 => "q4_1",
            Self::Iq4Nl => "iq4_nl",
            Self::Q50 => "q5_0",
            Self::Q51 => "q5_1",
        }
    }
}

/// MLX KV cache quantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MlxKvCacheQuantization {
    /// Bits per element (2, 3, 4, 6 or 8).
    pub bits: u8,
    /// Quantization group size (32, 64 or 128).
    pub group_size: u32,
    /// Token index where quantization starts.
    pub quantized_start: u32,
}

/// Load options; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmLoadModelConfig {
    /// Requested context length in tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
    /// Random seed, or `false` for a random one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<MaybeDisabled<i64>>,
    /// Number of experts for mixture-of-experts models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_experts: Option<u32>,
    /// Prompt evaluation batch size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_batch_size: Option<u32>,
    /// GPU placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuSetting>,
    /// Enable flash attention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_attention: Option<bool>,
    /// Keep weights resident in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_model_in_memory: Option<bool>,
    /// Memory-map the model file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub try_mmap: Option<bool>,
    /// RoPE frequency base, or `false` for the model value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rope_frequency_base: Option<MaybeDisabled<f64>>,
    /// RoPE frequency scale, or `false` for the model value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rope_frequency_scale: Option<MaybeDisabled<f64>>,
    /// K cache quantization, or `false` for the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llama_k_cache_quantization_type: Option<MaybeDisabled<LlmLlamaCacheQuantizationType>>,
    /// V cache quantization, or `false` for the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llama_v_cache_quantization_type: Option<MaybeDisabled<LlmLlamaCacheQuantizationType>>,
    /// MLX KV cache quantization, or `false` to disable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mlx_kv_cache_quantization: Option<MaybeDisabled<MlxKvCacheQuantization>>,
}
