//! Schema-backed value trees.
//!
//! [`Data`] pairs a raw [`Value`] with the [`Schema`] that describes it. The
//! plan modification walk reads configuration, state, and plan values through
//! [`Data::value_at_path`] and writes the plan back with
//! [`Data::set_at_path`].

use std::fmt;
use std::sync::Arc;

use crate::diag::Diagnostic;
use crate::error::ProviderError;
use crate::path::{Path, PathStep};
use crate::schema::Schema;
use crate::types::{AttributeType, Value};

/// Which tree a [`Data`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDescription {
    /// Resource configuration.
    Configuration,
    /// Proposed or planned new state.
    Plan,
    /// Prior state.
    State,
    /// Provider metadata configuration.
    ProviderMeta,
}

impl DataDescription {
    /// Title case name, used in diagnostic summaries.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration",
            Self::Plan => "Plan",
            Self::State => "State",
            Self::ProviderMeta => "Provider Meta",
        }
    }
}

impl fmt::Display for DataDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Plan => write!(f, "plan"),
            Self::State => write!(f, "state"),
            Self::ProviderMeta => write!(f, "provider meta"),
        }
    }
}

/// A value tree together with its schema.
#[derive(Debug, Clone)]
pub struct Data {
    /// Which tree this is.
    pub description: DataDescription,
    /// The schema describing `raw`.
    pub schema: Arc<Schema>,
    /// The whole value tree.
    pub raw: Value,
}

impl Data {
    /// Wrap a value tree.
    pub fn new(description: DataDescription, schema: Arc<Schema>, raw: Value) -> Self {
        Self {
            description,
            schema,
            raw,
        }
    }

    /// A null tree of the schema's object type.
    pub fn null(description: DataDescription, schema: Arc<Schema>) -> Self {
        let raw = Value::Null(schema.object_type());
        Self::new(description, schema, raw)
    }

    /// Build a tree from a JSON document shaped like the schema.
    pub fn from_json(
        description: DataDescription,
        schema: Arc<Schema>,
        json: &serde_json::Value,
    ) -> Result<Self, ProviderError> {
        let raw = Value::from_json(&schema.object_type(), json)?;
        Ok(Self::new(description, schema, raw))
    }

    /// Build a tree from JSON bytes, as an RPC adapter receives them.
    pub fn from_slice(
        description: DataDescription,
        schema: Arc<Schema>,
        bytes: &[u8],
    ) -> Result<Self, ProviderError> {
        let json: serde_json::Value = serde_json::from_slice(bytes)?;
        Self::from_json(description, schema, &json)
    }

    /// Encode the tree as JSON bytes. Unknown values encode as `null`.
    pub fn to_vec(&self) -> Result<Vec<u8>, ProviderError> {
        Ok(serde_json::to_vec(&self.raw.to_json())?)
    }

    /// Whether the whole tree is null.
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Read the value at a path.
    ///
    /// The path must be valid for the schema. When the tree does not reach
    /// the path (a null parent, a missing element or attribute) the result
    /// is a null of the path's type; an unknown parent yields an unknown.
    pub fn value_at_path(&self, path: &Path) -> Result<Value, ProviderError> {
        let ty = self.schema.type_at_path(path)?;

        let mut current = &self.raw;
        for step in path.steps() {
            let next = match (current, step) {
                (Value::Null(_), _) => return Ok(Value::Null(ty)),
                (Value::Unknown(_), _) => return Ok(Value::Unknown(ty)),
                (Value::Object { attributes, .. }, PathStep::AttributeName(name)) => {
                    attributes.get(name)
                },
                (Value::List { elements, .. }, PathStep::ElementKeyInt(index)) => {
                    elements.get(*index)
                },
                (Value::Set { elements, .. }, PathStep::ElementKeyValue(value)) => {
                    elements.iter().find(|element| *element == value)
                },
                (Value::Map { elements, .. }, PathStep::ElementKeyString(key)) => {
                    elements.get(key)
                },
                (value, step) => return Err(step_mismatch(path, step, value)),
            };
            match next {
                Some(value) => current = value,
                None => return Ok(Value::Null(ty)),
            }
        }

        Ok(current.clone())
    }

    /// Write a value at a path.
    ///
    /// Null objects along the way are replaced with objects of null
    /// attributes. Writing a value equal to the current one leaves the tree
    /// untouched. The write fails when:
    ///
    /// - the value's type does not fit the schema type at the path
    /// - the path runs below an unknown value, a missing list index, or a
    ///   missing set element
    /// - a rewritten set element would equal another element of its set
    pub fn set_at_path(&mut self, path: &Path, value: Value) -> Result<(), ProviderError> {
        if self.value_at_path(path)? == value {
            return Ok(());
        }

        let ty = self.schema.type_at_path(path)?;
        let found = value.ty();
        if !ty.accepts(&found) {
            return Err(ProviderError::type_mismatch(ty, found.to_string()));
        }

        set_in(&mut self.raw, path, path.steps(), value)
    }

    /// The diagnostic for a failed [`Data::value_at_path`].
    pub fn read_error(&self, path: &Path, err: &ProviderError) -> Diagnostic {
        Diagnostic::error(format!("{} Read Error", self.description.title()))
            .with_detail(format!(
                "An unexpected error was encountered trying to read an attribute from the {}. \
                 This is always an error in the provider. Please report the following to the \
                 provider developer:\n\n{}",
                self.description, err
            ))
            .with_attribute(path.clone())
    }

    /// The diagnostic for a failed [`Data::set_at_path`].
    pub fn write_error(&self, path: &Path, err: &ProviderError) -> Diagnostic {
        Diagnostic::error(format!("{} Write Error", self.description.title()))
            .with_detail(format!(
                "An unexpected error was encountered trying to write an attribute to the {}. \
                 This is always an error in the provider. Please report the following to the \
                 provider developer:\n\n{}",
                self.description, err
            ))
            .with_attribute(path.clone())
    }
}

fn step_mismatch(path: &Path, step: &PathStep, value: &Value) -> ProviderError {
    ProviderError::invalid_path(
        path,
        format!("step {} cannot be applied to a {} value", step, value.kind_name()),
    )
}

fn set_in(
    target: &mut Value,
    path: &Path,
    steps: &[PathStep],
    value: Value,
) -> Result<(), ProviderError> {
    let Some((step, rest)) = steps.split_first() else {
        *target = value;
        return Ok(());
    };

    if let Value::Null(AttributeType::Object(attribute_types)) = &*target {
        let materialised = Value::object(attribute_types.clone(), Vec::<(String, Value)>::new());
        *target = materialised;
    }

    let child = match (target, step) {
        (
            Value::Object {
                attribute_types,
                attributes,
            },
            PathStep::AttributeName(name),
        ) => {
            let ty = attribute_types
                .get(name)
                .ok_or_else(|| {
                    ProviderError::invalid_path(path, format!("object has no attribute {}", name))
                })?;
            attributes
                .entry(name.clone())
                .or_insert_with(|| Value::Null(ty.clone()))
        },
        (Value::List { elements, .. }, PathStep::ElementKeyInt(index)) => {
            let len = elements.len();
            elements.get_mut(*index).ok_or_else(|| {
                ProviderError::invalid_path(
                    path,
                    format!("list has {} elements, index {} does not exist", len, index),
                )
            })?
        },
        (Value::Set { elements, .. }, PathStep::ElementKeyValue(element)) => {
            let index = elements
                .iter()
                .position(|candidate| candidate == element)
                .ok_or_else(|| ProviderError::invalid_path(path, "set has no such element"))?;

            // Rewrite a copy so a collision leaves the set untouched.
            let mut rewritten = elements[index].clone();
            set_in(&mut rewritten, path, rest, value)?;
            let collides = elements
                .iter()
                .enumerate()
                .any(|(other, candidate)| other != index && *candidate == rewritten);
            if collides {
                return Err(ProviderError::invalid_path(
                    path,
                    format!("set already contains the element {}", rewritten),
                ));
            }
            elements[index] = rewritten;
            return Ok(());
        },
        (
            Value::Map {
                element_type,
                elements,
            },
            PathStep::ElementKeyString(key),
        ) => elements
            .entry(key.clone())
            .or_insert_with(|| Value::Null(element_type.clone())),
        (other, step) => return Err(step_mismatch(path, step, other)),
    };

    set_in(child, path, rest, value)
}
