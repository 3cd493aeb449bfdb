//! Schema validation helpers.
//!
//! This module validates a typed [`Value`] tree against a [`Schema`]. It is
//! the only place where block item counts are enforced; plan modification
//! never checks them.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_framework::schema::{Attribute, Schema};
//! use hemmer_provider_framework::types::Value;
//! use hemmer_provider_framework::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("count", Attribute::optional_int64());
//!
//! let value = Value::from_json(&schema.object_type(), &json!({"count": 42})).unwrap();
//! let diagnostics = validate(&schema, &value);
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].summary, "Missing required attribute 'name'");
//! ```

use crate::diag::{Diagnostic, Diagnostics};
use crate::path::Path;
use crate::schema::{
    Attribute, AttributeKind, Block, BlockNestingMode, NestedBlock, NestingMode, Schema,
};
use crate::types::{AttributeType, Value};
use std::collections::BTreeMap;

/// Validate a value tree against a schema.
///
/// Returns diagnostics for every problem found. An empty list means the
/// value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be non-null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Unknown values are never validated
/// - Known values must match the declared attribute type
/// - List and set blocks must respect `min_items` and `max_items`
/// - A single block with `min_items >= 1` must not be null
pub fn validate(schema: &Schema, value: &Value) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    validate_block(&schema.block, value, &Path::empty(), &mut diagnostics);
    diagnostics
}

/// Validate a value tree, returning `Ok` if valid or `Err` with diagnostics.
///
/// Warnings alone do not fail validation.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Diagnostics> {
    let diagnostics = validate(schema, value);
    if diagnostics.has_error() {
        Err(diagnostics)
    } else {
        Ok(())
    }
}

/// Check if a value tree is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    !validate(schema, value).has_error()
}

/// Convert a JSON document with the schema's type, then validate it.
///
/// A document that does not convert at all yields a single error.
pub fn validate_json(schema: &Schema, json: &serde_json::Value) -> Diagnostics {
    match Value::from_json(&schema.object_type(), json) {
        Ok(value) => validate(schema, &value),
        Err(err) => Diagnostic::error("Invalid configuration document")
            .with_detail(err.message())
            .into(),
    }
}

fn validate_block(block: &Block, value: &Value, path: &Path, diagnostics: &mut Diagnostics) {
    let attributes = match value {
        Value::Object { attributes, .. } => attributes,
        Value::Null(_) | Value::Unknown(_) => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value.kind_name()))
                    .with_attribute_if_not_empty(path),
            );
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = path.at_name(name);
        let attr_value = attributes
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Null(attr.attribute_type()));
        validate_attribute(attr, &attr_value, &attr_path, diagnostics);
    }

    for (name, nested) in &block.blocks {
        let block_path = path.at_name(name);
        let block_value = attributes
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Null(nested.attribute_type()));
        validate_nested_block(nested, &block_value, &block_path, diagnostics);
    }
}

fn validate_attribute(attr: &Attribute, value: &Value, path: &Path, diagnostics: &mut Diagnostics) {
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        Value::Null(_) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required but was not provided")
                        .with_attribute(path.clone()),
                );
            }
        },
        Value::Unknown(_) => {},
        _ => match &attr.kind {
            AttributeKind::Type(ty) => validate_value_type(ty, value, path, diagnostics),
            AttributeKind::Nested(nested) => {
                let elements: Vec<(Path, &Value)> = match (nested.nesting_mode, value) {
                    (NestingMode::Single, Value::Object { .. }) => vec![(path.clone(), value)],
                    (NestingMode::List, Value::List { elements, .. }) => elements
                        .iter()
                        .enumerate()
                        .map(|(index, element)| (path.at_list_index(index), element))
                        .collect(),
                    (NestingMode::Set, Value::Set { elements, .. }) => elements
                        .iter()
                        .map(|element| (path.at_set_value(element.clone()), element))
                        .collect(),
                    (NestingMode::Map, Value::Map { elements, .. }) => elements
                        .iter()
                        .map(|(key, element)| (path.at_map_key(key.clone()), element))
                        .collect(),
                    _ => {
                        diagnostics.push(type_error(path, &attr.attribute_type(), value));
                        return;
                    },
                };
                for (element_path, element) in elements {
                    validate_nested_object(&nested.attributes, element, &element_path, diagnostics);
                }
            },
        },
    }
}

fn validate_nested_object(
    attributes: &BTreeMap<String, Attribute>,
    value: &Value,
    path: &Path,
    diagnostics: &mut Diagnostics,
) {
    let values = match value {
        Value::Object { attributes, .. } => attributes,
        Value::Null(_) | Value::Unknown(_) => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value.kind_name()))
                    .with_attribute(path.clone()),
            );
            return;
        },
    };

    for (name, attr) in attributes {
        let attr_value = values
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Null(attr.attribute_type()));
        validate_attribute(attr, &attr_value, &path.at_name(name), diagnostics);
    }
}

fn validate_value_type(
    expected: &AttributeType,
    value: &Value,
    path: &Path,
    diagnostics: &mut Diagnostics,
) {
    match (expected, value) {
        (_, Value::Null(_) | Value::Unknown(_)) => {},
        (AttributeType::Dynamic, _) => {},
        (AttributeType::String, Value::String(_)) => {},
        (AttributeType::Int64, Value::Int64(_)) => {},
        (AttributeType::Int64, Value::Float64(f)) if is_int64(*f) => {},
        (AttributeType::Float64, Value::Float64(_) | Value::Int64(_)) => {},
        (AttributeType::Bool, Value::Bool(_)) => {},
        (AttributeType::List(elem), Value::List { elements, .. }) => {
            for (index, element) in elements.iter().enumerate() {
                validate_value_type(elem, element, &path.at_list_index(index), diagnostics);
            }
        },
        (AttributeType::Set(elem), Value::Set { elements, .. }) => {
            for element in elements {
                let element_path = path.at_set_value(element.clone());
                validate_value_type(elem, element, &element_path, diagnostics);
            }
        },
        (AttributeType::Map(elem), Value::Map { elements, .. }) => {
            for (key, element) in elements {
                validate_value_type(elem, element, &path.at_map_key(key.clone()), diagnostics);
            }
        },
        (AttributeType::Object(types), Value::Object { attributes, .. }) => {
            validate_object_type(types, attributes, path, diagnostics);
        },
        _ => diagnostics.push(type_error(path, expected, value)),
    }
}

fn validate_object_type(
    types: &BTreeMap<String, AttributeType>,
    attributes: &BTreeMap<String, Value>,
    path: &Path,
    diagnostics: &mut Diagnostics,
) {
    for (name, ty) in types {
        if let Some(value) = attributes.get(name) {
            validate_value_type(ty, value, &path.at_name(name), diagnostics);
        }
    }

    for name in attributes.keys().filter(|name| !types.contains_key(*name)) {
        diagnostics.push(
            Diagnostic::error(format!("Unexpected attribute '{}'", name))
                .with_detail(format!("The object type at {} has no attribute {:?}", path, name))
                .with_attribute(path.at_name(name)),
        );
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: &Value,
    path: &Path,
    diagnostics: &mut Diagnostics,
) {
    if value.is_unknown() {
        return;
    }

    match nested.nesting_mode {
        BlockNestingMode::Single => validate_single_block(nested, value, path, diagnostics),
        BlockNestingMode::List | BlockNestingMode::Set => {
            validate_collection_block(nested, value, path, diagnostics)
        },
    }
}

fn validate_single_block(
    nested: &NestedBlock,
    value: &Value,
    path: &Path,
    diagnostics: &mut Diagnostics,
) {
    if value.is_null() {
        if nested.min_items >= 1 {
            diagnostics.push(
                Diagnostic::error("Missing Configuration for Required Block")
                    .with_detail(format!(
                        "Must have a configuration value for the {} block.",
                        path
                    ))
                    .with_attribute(path.clone()),
            );
        }
        return;
    }

    validate_block(&nested.block, value, path, diagnostics);
}

fn validate_collection_block(
    nested: &NestedBlock,
    value: &Value,
    path: &Path,
    diagnostics: &mut Diagnostics,
) {
    let elements: Vec<(Path, &Value)> = match (nested.nesting_mode, value) {
        (_, Value::Null(_)) => Vec::new(),
        (BlockNestingMode::List, Value::List { elements, .. }) => elements
            .iter()
            .enumerate()
            .map(|(index, element)| (path.at_list_index(index), element))
            .collect(),
        (BlockNestingMode::Set, Value::Set { elements, .. }) => elements
            .iter()
            .map(|element| (path.at_set_value(element.clone()), element))
            .collect(),
        _ => {
            diagnostics.push(type_error(path, &nested.attribute_type(), value));
            return;
        },
    };

    let count = elements.len();
    if nested.min_items > 0 && count < nested.min_items as usize {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, count
            ))
            .with_attribute(path.clone()),
        );
    }
    if nested.max_items > 0 && count > nested.max_items as usize {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, count
            ))
            .with_attribute(path.clone()),
        );
    }

    for (element_path, element) in elements {
        validate_block(&nested.block, element, &element_path, diagnostics);
    }
}

fn is_int64(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
}

fn type_error(path: &Path, expected: &AttributeType, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, got.kind_name()))
        .with_attribute(path.clone())
}

trait DiagnosticExt {
    fn with_attribute_if_not_empty(self, path: &Path) -> Self;
}

impl DiagnosticExt for Diagnostic {
    fn with_attribute_if_not_empty(self, path: &Path) -> Self {
        if path.is_empty() {
            self
        } else {
            self.with_attribute(path.clone())
        }
    }
}
