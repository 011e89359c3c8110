//! Checking configuration values against a [`Schema`].
//!
//! ```
//! use hemmer_provider_dcos::schema::{Attribute, Schema};
//! use hemmer_provider_dcos::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("max_launch_delay", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"name": "backup", "max_launch_delay": 3600})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "backup", "max_launch_delay": "1h"}));
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("max_launch_delay"));
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema};

/// Validate `value` against `schema`; an empty result means valid.
///
/// - required attributes must be present and non-null
/// - computed-only attributes are not checked
/// - values must match the declared type
/// - nested blocks are checked recursively, including item counts
/// - non-null keys the schema does not declare are rejected
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// [`validate`] as a `Result`.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Whether `value` satisfies `schema`.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        other => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(other)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        },
    };

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (key, val) in obj {
        if val.is_null() || block.attributes.contains_key(key) || block.blocks.contains_key(key) {
            continue;
        }
        let key_path = join_path(path, key);
        diagnostics.push(
            Diagnostic::error(format!("Unsupported argument '{}'", key_path))
                .with_detail("An argument with this name is not expected here")
                .with_attribute(key_path),
        );
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_type(attr_type: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let ok = match attr_type {
        AttributeType::String => value.is_string(),
        AttributeType::Int64 => is_int64(value),
        AttributeType::Float64 => value.is_number(),
        AttributeType::Bool => value.is_boolean(),
        AttributeType::List(element) | AttributeType::Set(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element, item, &format!("{}.{}", path, i), diagnostics);
                }
                true
            },
            None => false,
        },
        AttributeType::Map(element) => match value.as_object() {
            Some(entries) => {
                for (key, item) in entries {
                    validate_type(element, item, &join_path(path, key), diagnostics);
                }
                true
            },
            None => false,
        },
        AttributeType::Object(fields) => match value.as_object() {
            Some(obj) => {
                validate_object(fields, obj, path, diagnostics);
                true
            },
            None => false,
        },
        AttributeType::Dynamic => true,
    };

    if !ok {
        diagnostics.push(
            Diagnostic::error(format!("Invalid type for attribute '{}'", path))
                .with_detail(format!(
                    "Expected {}, got {}",
                    type_name(attr_type),
                    value_type_name(value)
                ))
                .with_attribute(path),
        );
    }
}

fn validate_object(
    fields: &BTreeMap<String, AttributeType>,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, field_type) in fields {
        if let Some(value) = obj.get(name).filter(|v| !v.is_null()) {
            validate_type(field_type, value, &join_path(path, name), diagnostics);
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let value = match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
            return;
        },
        Some(v) => v,
    };

    match (nested.nesting_mode, value) {
        (BlockNestingMode::Single, v) => validate_block(&nested.block, v, path, diagnostics),
        (BlockNestingMode::List | BlockNestingMode::Set, Value::Array(items)) => {
            check_item_count(nested, items.len(), path, diagnostics);
            for (i, item) in items.iter().enumerate() {
                validate_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
            }
        },
        (BlockNestingMode::Map, Value::Object(items)) => {
            check_item_count(nested, items.len(), path, diagnostics);
            for (key, item) in items {
                validate_block(&nested.block, item, &join_path(path, key), diagnostics);
            }
        },
        (mode, v) => {
            let expected = if mode == BlockNestingMode::Map { "map" } else { "list" };
            diagnostics.push(
                Diagnostic::error(format!("Expected {} for block '{}'", expected, path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

fn check_item_count(nested: &NestedBlock, len: usize, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }
    // max_items == 0 means unlimited
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_name(attr_type: &AttributeType) -> &'static str {
    match attr_type {
        AttributeType::String => "string",
        AttributeType::Int64 => "int64",
        AttributeType::Float64 => "float64",
        AttributeType::Bool => "bool",
        AttributeType::List(_) => "list",
        AttributeType::Set(_) => "set",
        AttributeType::Map(_) => "map",
        AttributeType::Object(_) => "object",
        AttributeType::Dynamic => "any",
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() => true,
        Value::Number(n) => n
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock, Schema};
    use serde_json::json;

    fn job_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("cpus", Attribute::optional_float64())
            .with_attribute("max_launch_delay", Attribute::optional_int64())
            .with_attribute("args", Attribute::optional_string_list())
            .with_attribute("labels", Attribute::optional_string_map())
            .with_block(
                "docker",
                NestedBlock::single(Block::new().with_attribute("image", Attribute::required_string())),
            )
            .with_block(
                "volumes",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("container_path", Attribute::required_string())
                        .with_attribute("mode", Attribute::required_string()),
                )
                .with_max_items(2),
            )
    }

    #[test]
    fn test_valid_job() {
        let config = json!({
            "name": "backup",
            "cpus": 1,
            "max_launch_delay": 3600,
            "args": ["--full"],
            "labels": {"team": "storage"},
            "docker": {"image": "alpine:3"},
            "volumes": [{"container_path": "/data", "mode": "RW"}]
        });
        assert!(is_valid(&job_schema(), &config));
    }

    #[test]
    fn test_missing_required_attribute() {
        let diagnostics = validate(&job_schema(), &json!({"cpus": 0.5}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required attribute 'name'"));
    }

    #[test]
    fn test_null_optional_is_accepted() {
        assert!(is_valid(&job_schema(), &json!({"name": "backup", "cpus": null})));
    }

    #[test]
    fn test_computed_attribute_is_not_checked() {
        assert!(is_valid(&job_schema(), &json!({"name": "backup", "id": 42})));
    }

    #[test]
    fn test_type_errors_carry_paths() {
        let diagnostics = validate(
            &job_schema(),
            &json!({
                "name": "backup",
                "max_launch_delay": 1.5,
                "args": ["--full", 3],
                "labels": {"team": false}
            }),
        );
        let mut paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.clone())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["args.1", "labels.team", "max_launch_delay"]);
    }

    #[test]
    fn test_whole_floats_count_as_int64() {
        assert!(is_valid(&job_schema(), &json!({"name": "backup", "max_launch_delay": 60.0})));
    }

    #[test]
    fn test_nested_blocks() {
        let diagnostics = validate(
            &job_schema(),
            &json!({"name": "backup", "docker": {}, "volumes": [{"container_path": "/data"}]}),
        );
        let paths: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.as_deref()).collect();
        assert!(paths.contains(&"docker.image"));
        assert!(paths.contains(&"volumes.0.mode"));
    }

    #[test]
    fn test_block_item_limits() {
        let volume = json!({"container_path": "/data", "mode": "RO"});
        let diagnostics = validate(
            &job_schema(),
            &json!({"name": "backup", "volumes": [volume.clone(), volume.clone(), volume]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 2"));

        let schema = Schema::v0().with_block(
            "section",
            NestedBlock::list(Block::new().with_attribute("path", Attribute::required_string()))
                .with_min_items(1),
        );
        assert!(!is_valid(&schema, &json!({})));
        assert!(!is_valid(&schema, &json!({"section": {"path": "service"}})));
    }

    #[test]
    fn test_unknown_argument() {
        let diagnostics = validate(&job_schema(), &json!({"name": "backup", "instances": 3}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("instances"));
    }

    #[test]
    fn test_root_must_be_object() {
        let diagnostics = validate(&job_schema(), &json!("backup"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_validate_result() {
        assert!(validate_result(&job_schema(), &json!({"name": "backup"})).is_ok());
        assert_eq!(validate_result(&job_schema(), &json!({})).unwrap_err().len(), 1);
    }
}
