//! Integration tests for the wire documents exchanged with the service.

use lms_shared_types::{
    GpuOffloadPreset, GpuOffloadRatio, KvConfig, KvConfigStack, LlmLoadModelConfig,
    MaybeDisabled, layer_names, llm_prediction_config_schema,
};
use serde_json::json;
use std::error::Error;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn stack_document_uses_camel_case_layer_names() -> TestResult {
    let stack: KvConfigStack = serde_json::from_value(json!({
        "layers": [
            {
                "layerName": layer_names::INSTANCE,
                "config": { "fields": [{ "key": "llm.load.contextLength", "value": 2048 }] }
            },
            {
                "layerName": layer_names::API_OVERRIDE,
                "config": { "fields": [] }
            }
        ]
    }))?;

    assert_eq!(stack.len(), 2);
    let first = stack.layers.first().ok_or("missing first layer")?;
    assert_eq!(first.config.get("llm.load.contextLength"), Some(&json!(2048)));

    let encoded = serde_json::to_value(&stack)?;
    assert_eq!(encoded["layers"][1]["layerName"], json!("apiOverride"));
    Ok(())
}

#[test]
fn duplicate_keys_resolve_to_the_last_occurrence() -> TestResult {
    let layer: KvConfig = serde_json::from_value(json!({
        "fields": [
            { "key": "a", "value": 1 },
            { "key": "b", "value": 2 },
            { "key": "a", "value": 3 }
        ]
    }))?;
    let expected: KvConfig = [("b", json!(2)), ("a", json!(3))].into_iter().collect();

    assert_eq!(layer.get("a"), Some(&json!(3)));
    assert_eq!(layer, expected);
    Ok(())
}

#[test]
fn load_options_accept_presets_and_disabled_values() -> TestResult {
    let config: LlmLoadModelConfig = serde_json::from_value(json!({
        "contextLength": 4096,
        "seed": false,
        "gpu": { "ratio": "max" },
        "mlxKvCacheQuantization": { "bits": 4, "groupSize": 64, "quantizedStart": 0 }
    }))?;

    assert_eq!(config.context_length, Some(4096));
    assert_eq!(config.seed, Some(MaybeDisabled::disabled()));
    assert_eq!(
        config.gpu.and_then(|gpu| gpu.ratio),
        Some(GpuOffloadRatio::Preset(GpuOffloadPreset::Max))
    );
    assert_eq!(
        config
            .mlx_kv_cache_quantization
            .as_ref()
            .and_then(MaybeDisabled::enabled)
            .map(|quantization| quantization.bits),
        Some(4)
    );
    Ok(())
}

#[test]
fn prediction_schema_describes_camel_case_fields() -> TestResult {
    let schema = serde_json::to_value(llm_prediction_config_schema())?;
    let properties = schema
        .get("properties")
        .and_then(|value| value.as_object())
        .ok_or("schema has no properties")?;

    assert!(properties.contains_key("maxTokens"));
    assert!(properties.contains_key("contextOverflowPolicy"));
    assert!(!properties.contains_key("max_tokens"));
    Ok(())
}
