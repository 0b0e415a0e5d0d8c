//! Lookup of the schematics for a configuration domain and inference backend.

use crate::error::KvConfigError;
use crate::global_schema::{
    embedding_llama_load_config_schematics, embedding_shared_load_config_schematics,
    llm_llama_load_config_schematics, llm_llama_moe_load_config_schematics,
    llm_llama_prediction_config_schematics, llm_mistralrs_load_config_schematics,
    llm_mistralrs_prediction_config_schematics, llm_mlx_load_config_schematics,
    llm_mlx_prediction_config_schematics, llm_onnx_load_config_schematics,
    llm_onnx_prediction_config_schematics, llm_shared_load_config_schematics,
    llm_shared_prediction_config_schematics, retrieval_schematics,
};
use crate::schema::KvConfigSchematics;
use std::fmt;
use std::str::FromStr;

/// Configuration namespaces a request can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigDomain {
    /// `llm.load.*`
    LlmLoad,
    /// `llm.prediction.*`
    LlmPrediction,
    /// `embedding.load.*`
    EmbeddingLoad,
    /// `retrieval.*`
    Retrieval,
}

impl ConfigDomain {
    /// Every domain, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::LlmLoad,
        Self::LlmPrediction,
        Self::EmbeddingLoad,
        Self::Retrieval,
    ];

    /// Kebab-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LlmLoad => "llm-load",
            Self::LlmPrediction => "llm-prediction",
            Self::EmbeddingLoad => "embedding-load",
            Self::Retrieval => "retrieval",
        }
    }
}

/// Engines that execute models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InferenceBackend {
    /// llama.cpp
    Llama,
    /// llama.cpp with a mixture-of-experts model
    LlamaMoe,
    /// Apple MLX
    Mlx,
    /// ONNX Runtime
    Onnx,
    /// mistral.rs
    MistralRs,
}

impl InferenceBackend {
    /// Every backend, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Llama,
        Self::LlamaMoe,
        Self::Mlx,
        Self::Onnx,
        Self::MistralRs,
    ];

    /// Kebab-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Llama => "llama",
            Self::LlamaMoe => "llama-moe",
            Self::Mlx => "mlx",
            Self::Onnx => "onnx",
            Self::MistralRs => "mistralrs",
        }
    }
}

macro_rules! impl_name_traits {
    ($type:ty, $label:literal) => {
        impl fmt::Display for $type {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(self.as_str())
            }
        }

        impl FromStr for $type {
            type Err = String;

            fn from_str(input: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|candidate| candidate.as_str() == input)
                    .ok_or_else(|| {
                        let names: Vec<&str> =
                            Self::ALL.iter().map(|value| value.as_str()).collect();
                        format!(
                            "unknown {} `{input}` (expected one of: {})",
                            $label,
                            names.join(", ")
                        )
                    })
            }
        }
    };
}

impl_name_traits!(ConfigDomain, "domain");
impl_name_traits!(InferenceBackend, "backend");

/// Resolves domain and backend identifiers to prebuilt schematics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchematicsRegistry;

impl SchematicsRegistry {
    /// The registry over the process-wide schematics.
    #[must_use]
    pub const fn global() -> Self {
        Self
    }

    /// Schematics for a domain on a backend.
    ///
    /// Retrieval does not depend on the backend. Embedding load is only
    /// defined for llama.cpp.
    pub fn lookup(
        self,
        domain: ConfigDomain,
        backend: InferenceBackend,
    ) -> Result<KvConfigSchematics, KvConfigError> {
        use ConfigDomain as D;
        use InferenceBackend as B;

        match (domain, backend) {
            (D::LlmPrediction, B::Llama | B::LlamaMoe) => llm_llama_prediction_config_schematics(),
            (D::LlmPrediction, B::Mlx) => llm_mlx_prediction_config_schematics(),
            (D::LlmPrediction, B::Onnx) => llm_onnx_prediction_config_schematics(),
            (D::LlmPrediction, B::MistralRs) => llm_mistralrs_prediction_config_schematics(),
            (D::LlmLoad, B::Llama) => llm_llama_load_config_schematics(),
            (D::LlmLoad, B::LlamaMoe) => llm_llama_moe_load_config_schematics(),
            (D::LlmLoad, B::Mlx) => llm_mlx_load_config_schematics(),
            (D::LlmLoad, B::Onnx) => llm_onnx_load_config_schematics(),
            (D::LlmLoad, B::MistralRs) => llm_mistralrs_load_config_schematics(),
            (D::EmbeddingLoad, B::Llama) => embedding_llama_load_config_schematics(),
            (D::EmbeddingLoad, B::LlamaMoe | B::Mlx | B::Onnx | B::MistralRs) => {
                Err(KvConfigError::UnsupportedTarget {
                    domain: domain.to_string(),
                    backend: backend.to_string(),
                })
            },
            (D::Retrieval, _) => retrieval_schematics(),
        }
    }

    /// Schematics with only the fields every backend understands.
    pub fn lookup_shared(self, domain: ConfigDomain) -> Result<KvConfigSchematics, KvConfigError> {
        match domain {
            ConfigDomain::LlmPrediction => llm_shared_prediction_config_schematics(),
            ConfigDomain::LlmLoad => llm_shared_load_config_schematics(),
            ConfigDomain::EmbeddingLoad => embedding_shared_load_config_schematics(),
            ConfigDomain::Retrieval => retrieval_schematics(),
        }
    }
}
