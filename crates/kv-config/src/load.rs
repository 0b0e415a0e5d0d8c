//! Reading layers and stacks from JSON and TOML documents.
//!
//! Layers come in three shapes:
//! - the wire form `{"fields": [{"key", "value"}]}`;
//! - a flat object of dotted keys;
//! - a nested document, flattened into dotted keys. Flattening stops at any
//!   path a schematics declares, so structured values stay intact.
//!
//! Failures surface as `ErrorEnvelope`s with stable codes.

use crate::schema::{KvConfigSchematics, join_key};
use lms_shared::{ErrorClass, ErrorCode, ErrorEnvelope, ResultExt};
use lms_shared_types::{KvConfig, KvConfigStack};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Json,
    Toml,
}

/// Parse a layer from JSON: the wire form or a flat object of dotted keys.
///
/// A document is read as the wire form only when its single `fields` entry
/// is an array of `{key, value}` objects. Any other `fields` value is an
/// ordinary key.
pub fn kv_config_from_json(input: &str) -> Result<KvConfig, ErrorEnvelope> {
    let document = parse_json(input, "layer")?;
    if is_wire_layer(&document) {
        return wire_layer(document);
    }
    match document {
        Value::Object(object) => Ok(object.into_iter().collect()),
        other => Err(not_an_object(&other)),
    }
}

/// Flatten a nested document into a layer.
pub fn kv_config_from_document(
    document: &Value,
    schematics: &KvConfigSchematics,
) -> Result<KvConfig, ErrorEnvelope> {
    let Value::Object(object) = document else {
        return Err(not_an_object(document));
    };
    let mut config = KvConfig::new();
    flatten_into(&mut config, "", object, schematics);
    Ok(config)
}

/// Parse a nested TOML document into a layer.
pub fn kv_config_from_toml(
    input: &str,
    schematics: &KvConfigSchematics,
) -> Result<KvConfig, ErrorEnvelope> {
    let document: Value = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("kv_config", "invalid_toml"),
            format!("invalid layer TOML: {error}"),
        )
        .with_metadata("source", "layer")
    })?;
    kv_config_from_document(&document, schematics)
}

/// Parse a stack from its wire form `{"layers": [{"layerName", "config"}]}`.
pub fn kv_config_stack_from_json(input: &str) -> Result<KvConfigStack, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("kv_config", "invalid_json"),
            format!("invalid stack JSON: {error}"),
        )
        .with_metadata("source", "stack")
    })
}

/// Load a layer from a `.json` or `.toml` file.
///
/// JSON files may use any layer shape; TOML files are nested documents.
pub fn load_kv_config_from_path(
    path: &Path,
    schematics: &KvConfigSchematics,
) -> Result<KvConfig, ErrorEnvelope> {
    let format = detect_document_format(path)?;
    let text = read_layer_file(path)?;
    let layer = match format {
        DocumentFormat::Json => {
            let document = parse_json(&text, "layer")?;
            if is_wire_layer(&document) {
                wire_layer(document)
            } else {
                kv_config_from_document(&document, schematics)
            }
        },
        DocumentFormat::Toml => kv_config_from_toml(&text, schematics),
    };
    layer.with_error_metadata("path", path.to_string_lossy())
}

/// Load one layer per file, in order; each layer is named after its file stem.
pub fn load_kv_config_stack_from_paths<P: AsRef<Path>>(
    paths: &[P],
    schematics: &KvConfigSchematics,
) -> Result<KvConfigStack, ErrorEnvelope> {
    let mut stack = crate::kv::empty_kv_config_stack();
    for path in paths {
        let path = path.as_ref();
        let layer = load_kv_config_from_path(path, schematics)?;
        let layer_name = path
            .file_stem()
            .map_or_else(|| path.to_string_lossy(), |stem| stem.to_string_lossy());
        stack = crate::kv::add_kv_config_to_stack(&stack, layer_name, layer);
    }
    Ok(stack)
}

/// Serialize as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(value).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize JSON: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

fn parse_json(input: &str, source: &str) -> Result<Value, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("kv_config", "invalid_json"),
            format!("invalid {source} JSON: {error}"),
        )
        .with_metadata("source", source.to_string())
    })
}

fn is_wire_layer(document: &Value) -> bool {
    let Some(object) = document.as_object().filter(|object| object.len() == 1) else {
        return false;
    };
    object
        .get("fields")
        .and_then(Value::as_array)
        .is_some_and(|fields| fields.iter().all(is_wire_field))
}

fn is_wire_field(field: &Value) -> bool {
    field.as_object().is_some_and(|entry| {
        entry.len() == 2
            && entry.get("key").is_some_and(Value::is_string)
            && entry.contains_key("value")
    })
}

fn wire_layer(document: Value) -> Result<KvConfig, ErrorEnvelope> {
    serde_json::from_value(document).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("kv_config", "invalid_json"),
            format!("invalid layer fields: {error}"),
        )
        .with_metadata("source", "layer")
    })
}

fn not_an_object(document: &Value) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("kv_config", "invalid_document"),
        format!(
            "layer documents must be objects, got {}",
            crate::value_types::describe_kind(document)
        ),
    )
}

fn flatten_into(
    config: &mut KvConfig,
    prefix: &str,
    object: &Map<String, Value>,
    schematics: &KvConfigSchematics,
) {
    for (segment, value) in object {
        let key = join_key(prefix, segment);
        match value {
            Value::Object(nested)
                if !nested.is_empty() && schematics.field_by_full_key(&key).is_none() =>
            {
                flatten_into(config, &key, nested, schematics);
            },
            leaf => config.set(key, leaf.clone()),
        }
    }
}

fn read_layer_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("kv_config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("kv_config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("kv_config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read layer file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

fn detect_document_format(path: &Path) -> Result<DocumentFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(DocumentFormat::Json),
        Some("toml") => Ok(DocumentFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("kv_config", "unsupported_format"),
            "unsupported layer format; use .json or .toml",
        )
        .with_metadata("extension", other.to_string())
        .with_metadata("path", path.to_string_lossy().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_schema::global_config_schematics;
    use serde_json::json;
    use std::error::Error;

    type TestResult = Result<(), Box<dyn Error>>;

    #[test]
    fn json_accepts_wire_and_flat_layers() -> TestResult {
        let wire = kv_config_from_json(
            r#"{"fields":[{"key":"llm.prediction.temperature","value":0.5}]}"#,
        )?;
        let flat = kv_config_from_json(r#"{"llm.prediction.temperature":0.5}"#)?;

        assert_eq!(wire, flat);
        assert!(kv_config_from_json("[1]").is_err());
        Ok(())
    }

    #[test]
    fn fields_key_is_wire_form_only_with_key_value_entries() -> TestResult {
        let plain = kv_config_from_json(r#"{"fields":["title","body"]}"#)?;
        assert_eq!(plain.get("fields"), Some(&json!(["title", "body"])));

        let empty = kv_config_from_json(r#"{"fields":[]}"#)?;
        assert!(empty.is_empty());

        let schematics = global_config_schematics()?;
        let nested = json!({ "fields": [{ "name": "a" }] });
        assert!(!is_wire_layer(&nested));
        let config = kv_config_from_document(&nested, &schematics)?;
        assert_eq!(config.get("fields"), Some(&json!([{ "name": "a" }])));
        Ok(())
    }

    #[test]
    fn nested_documents_stop_at_declared_fields() -> TestResult {
        let schematics = global_config_schematics()?;
        let document = json!({
            "llm": {
                "prediction": {
                    "temperature": 0.2,
                    "maxPredictedTokens": { "checked": true, "value": 64 },
                    "reasoning": {
                        "parsing": { "enabled": false, "startString": "", "endString": "" }
                    }
                }
            },
            "vendor": { "flag": true }
        });

        let config = kv_config_from_document(&document, &schematics)?;
        assert_eq!(
            config.get("llm.prediction.maxPredictedTokens"),
            Some(&json!({ "checked": true, "value": 64 }))
        );
        assert!(config.contains_key("llm.prediction.reasoning.parsing"));
        assert_eq!(config.get("vendor.flag"), Some(&json!(true)));
        assert_eq!(config.len(), 4);
        Ok(())
    }

    #[test]
    fn toml_layers_flatten_like_json() -> TestResult {
        let schematics = global_config_schematics()?;
        let config = kv_config_from_toml(
            "[llm.load]\ncontextLength = 2048\n\n[llm.load.llama]\nevalBatchSize = 256\n",
            &schematics,
        )?;

        assert_eq!(config.get("llm.load.contextLength"), Some(&json!(2048)));
        assert_eq!(config.get("llm.load.llama.evalBatchSize"), Some(&json!(256)));

        let error = kv_config_from_toml("[llm", &schematics).err();
        assert_eq!(
            error.map(|error| error.code),
            Some(ErrorCode::new("kv_config", "invalid_toml"))
        );
        Ok(())
    }

    #[test]
    fn stack_wire_form_parses() -> TestResult {
        let stack = kv_config_stack_from_json(
            r#"{"layers":[{"layerName":"instance","config":{"fields":[{"key":"a","value":1}]}}]}"#,
        )?;
        assert_eq!(stack.len(), 1);
        assert_eq!(
            stack.layers.first().map(|layer| layer.layer_name.as_str()),
            Some("instance")
        );
        Ok(())
    }

    #[test]
    fn file_errors_carry_codes() -> TestResult {
        let schematics = global_config_schematics()?;

        let missing =
            load_kv_config_from_path(Path::new("/definitely/not/here.json"), &schematics).err();
        assert_eq!(
            missing.as_ref().map(|error| error.code.clone()),
            Some(ErrorCode::new("kv_config", "config_file_not_found"))
        );
        assert!(missing.is_some_and(|error| error.metadata.contains_key("path")));

        let unsupported = load_kv_config_from_path(Path::new("layer.yaml"), &schematics).err();
        assert_eq!(
            unsupported.map(|error| error.code),
            Some(ErrorCode::new("kv_config", "unsupported_format"))
        );
        Ok(())
    }

    #[test]
    fn pretty_json_ends_with_newline() -> TestResult {
        let output = to_pretty_json(&json!({ "b": 1, "a": 2 }))?;
        assert!(output.ends_with("}\n"));
        assert!(output.find("\"a\"") < output.find("\"b\""));
        Ok(())
    }
}
