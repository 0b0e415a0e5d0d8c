//! Integration tests collapsing layer fixtures against the global schematics.

use lms_kv_config::{
    CollapseOptions, ConfigDomain, InferenceBackend, KvConfigError, KvConfigStack,
    SchematicsRegistry, UnknownKeyPolicy, collapse_kv_stack, collapse_kv_stack_raw,
    collapse_kv_stack_with, global_config_schematics, kv_config_stack_from_json,
    load_kv_config_stack_from_paths,
};
use lms_shared::{ErrorCode, ErrorEnvelope, ErrorKind};
use serde_json::json;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

type TestResult = Result<(), Box<dyn Error>>;

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

fn load_layers(names: &[&str]) -> Result<KvConfigStack, Box<dyn Error>> {
    let paths: Vec<PathBuf> = names
        .iter()
        .map(|name| fixture(&format!("layers/{name}")))
        .collect();
    Ok(load_kv_config_stack_from_paths(
        &paths,
        &global_config_schematics()?,
    )?)
}

#[test]
fn later_layers_override_earlier_ones() -> TestResult {
    let stack = load_layers(&["defaults.json", "model.toml", "request.json"])?;
    let names: Vec<&str> = stack
        .layers
        .iter()
        .map(|layer| layer.layer_name.as_str())
        .collect();
    assert_eq!(names, vec!["defaults", "model", "request"]);

    let schematics = SchematicsRegistry::global()
        .lookup(ConfigDomain::LlmPrediction, InferenceBackend::Llama)?;
    let parsed = collapse_kv_stack(&stack, &schematics)?;

    assert_eq!(parsed.get("temperature")?, &json!(0.0));
    assert_eq!(parsed.get("isGreedy")?, &json!(true));
    assert_eq!(parsed.get("maxTokens")?, &json!(256));
    assert_eq!(parsed.get("topKSampling")?, &json!(20));
    assert_eq!(parsed.get_as::<Vec<String>>("stopStrings")?, vec!["</s>".to_string()]);
    assert_eq!(parsed.get("repeatPenalty")?["checked"], json!(false));
    assert_eq!(parsed.get("llama.cpuThreads")?, &json!(4));
    Ok(())
}

#[test]
fn batch_size_is_clamped_to_resolved_context_length() -> TestResult {
    let registry = SchematicsRegistry::global();
    let schematics = registry.lookup(ConfigDomain::LlmLoad, InferenceBackend::Llama)?;

    let defaults_only = collapse_kv_stack(&load_layers(&["defaults.json"])?, &schematics)?;
    assert_eq!(defaults_only.get("contextLength")?, &json!(8192));
    assert_eq!(defaults_only.get("llama.evalBatchSize")?, &json!(1024));
    assert_eq!(defaults_only.get("llama.acceleration.offloadRatio")?, &json!(0.5));

    let with_model =
        collapse_kv_stack(&load_layers(&["defaults.json", "model.toml"])?, &schematics)?;
    assert_eq!(with_model.get("contextLength")?, &json!(512));
    assert_eq!(with_model.get("llama.evalBatchSize")?, &json!(512));
    Ok(())
}

#[test]
fn out_of_range_value_names_layer_and_key() -> TestResult {
    let stack = load_layers(&["defaults.json", "invalid-temperature.json"])?;
    let schematics = SchematicsRegistry::global().lookup_shared(ConfigDomain::LlmPrediction)?;

    match collapse_kv_stack(&stack, &schematics) {
        Err(KvConfigError::FieldValidation { layer, error }) => {
            assert_eq!(layer, "invalid-temperature");
            assert_eq!(error.key, "llm.prediction.temperature");
        },
        other => return Err(format!("expected a field validation error, got {other:?}").into()),
    }

    let raw = collapse_kv_stack_raw(&stack);
    assert_eq!(raw.get("llm.prediction.temperature"), Some(&json!(5)));
    Ok(())
}

#[test]
fn validation_errors_become_request_rejections() -> TestResult {
    let stack = load_layers(&["invalid-temperature.json"])?;
    let schematics = SchematicsRegistry::global().lookup_shared(ConfigDomain::LlmPrediction)?;

    let envelope = collapse_kv_stack(&stack, &schematics)
        .err()
        .map(ErrorEnvelope::from)
        .ok_or("collapse should fail")?;
    assert_eq!(envelope.kind, ErrorKind::Expected);
    assert_eq!(envelope.code, ErrorCode::new("kv_config", "invalid_field_value"));
    assert_eq!(
        envelope.metadata.get("layer").map(String::as_str),
        Some("invalid-temperature")
    );
    Ok(())
}

#[test]
fn integer_fields_reject_values_they_cannot_hold() -> TestResult {
    let schematics = SchematicsRegistry::global().lookup_shared(ConfigDomain::LlmLoad)?;
    let collapse = |key: &str, value: serde_json::Value| {
        let stack: KvConfigStack = serde_json::from_value(json!({
            "layers": [{
                "layerName": "request",
                "config": { "fields": [{ "key": key, "value": value }] }
            }]
        }))?;
        Ok::<_, Box<dyn Error>>(collapse_kv_stack(&stack, &schematics))
    };

    assert!(collapse("llm.load.contextLength", json!(1e300))?.is_err());
    assert!(collapse("llm.load.seed", json!({ "checked": true, "value": 1e30 }))?.is_err());

    let exact = collapse(
        "llm.load.seed",
        json!({ "checked": true, "value": 9_007_199_254_740_993_i64 }),
    )??;
    assert_eq!(exact.get("seed")?["value"], json!(9_007_199_254_740_993_i64));
    Ok(())
}

#[test]
fn unknown_keys_follow_the_policy() -> TestResult {
    let stack = load_layers(&["defaults.json", "request.json"])?;
    let schematics = SchematicsRegistry::global().lookup_shared(ConfigDomain::LlmPrediction)?;

    let ignored = collapse_kv_stack(&stack, &schematics)?;
    assert!(ignored.unknown_keys().is_empty());

    let collected = collapse_kv_stack_with(
        &stack,
        &schematics,
        CollapseOptions::default().with_unknown_keys(UnknownKeyPolicy::Collect),
    )?;
    assert!(collected.unknown_keys().iter().any(|key| key == "vendor.extra"));
    assert!(collected.unknown_keys().iter().any(|key| key == "llm.load.contextLength"));

    let rejected = collapse_kv_stack_with(
        &stack,
        &schematics,
        CollapseOptions::default().with_unknown_keys(UnknownKeyPolicy::Reject),
    );
    assert!(matches!(
        rejected,
        Err(KvConfigError::UnknownKeys { ref keys, .. })
            if keys.iter().any(|key| key == "vendor.extra")
    ));
    Ok(())
}

#[test]
fn wire_stack_collapses_for_any_backend() -> TestResult {
    let stack = kv_config_stack_from_json(&fs::read_to_string(fixture("stack.json"))?)?;
    let registry = SchematicsRegistry::global();

    for backend in InferenceBackend::ALL {
        let schematics = registry.lookup(ConfigDomain::Retrieval, backend)?;
        let parsed = collapse_kv_stack(&stack, &schematics)?;
        assert_eq!(parsed.get("limit")?, &json!(8));
        assert_eq!(parsed.get("affinityThreshold")?, &json!(0.2));
        assert_eq!(parsed.get("chunkingMethod")?["chunkSize"], json!(256));
    }
    Ok(())
}

#[test]
fn effective_map_uses_full_keys() -> TestResult {
    let stack = load_layers(&["model.toml"])?;
    let schematics = SchematicsRegistry::global().lookup_shared(ConfigDomain::LlmPrediction)?;
    let effective = collapse_kv_stack(&stack, &schematics)?.to_effective_map();

    assert_eq!(effective.get("llm.prediction.isGreedy"), Some(&json!(true)));
    assert_eq!(effective.get("llm.prediction.maxTokens"), Some(&json!(256)));
    assert!(!effective.contains_key("llm.load.contextLength"));
    assert_eq!(effective.len(), schematics.len());
    Ok(())
}
