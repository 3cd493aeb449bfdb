//! Typed values for configuration, state, and plan data.
//!
//! A [`Value`] is a recursively structured tree. Every node is either null,
//! unknown (not yet determined at plan time), or known. Null and unknown
//! nodes carry their [`AttributeType`] so that an absent collection keeps its
//! element type.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::path::PathStep;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A 64-bit floating point number.
    Float64,
    /// A boolean value.
    Bool,
    /// A list of values of a single type.
    List(Box<AttributeType>),
    /// A set of unique values of a single type.
    Set(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
    /// An object with a fixed set of attributes.
    Object(BTreeMap<String, AttributeType>),
    /// A dynamic type that can hold any value (use sparingly).
    Dynamic,
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: AttributeType) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }

    /// Create an object type.
    pub fn object<K: Into<String>>(
        attributes: impl IntoIterator<Item = (K, AttributeType)>,
    ) -> Self {
        Self::Object(
            attributes
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    /// The element type of a list, set, or map type.
    pub fn element_type(&self) -> Option<&AttributeType> {
        match self {
            Self::List(element) | Self::Set(element) | Self::Map(element) => Some(element),
            _ => None,
        }
    }

    /// The type reached by applying one path step, if the step applies.
    pub fn step_type(&self, step: &PathStep) -> Option<&AttributeType> {
        match (self, step) {
            (Self::Object(attributes), PathStep::AttributeName(name)) => attributes.get(name),
            (Self::List(element), PathStep::ElementKeyInt(_))
            | (Self::Set(element), PathStep::ElementKeyValue(_))
            | (Self::Map(element), PathStep::ElementKeyString(_)) => Some(element),
            (Self::Dynamic, _) => Some(self),
            _ => None,
        }
    }

    /// Whether a value of type `other` may be stored where `self` is
    /// declared. `Dynamic` on either side matches anything at that level.
    pub fn accepts(&self, other: &AttributeType) -> bool {
        match (self, other) {
            (Self::Dynamic, _) | (_, Self::Dynamic) => true,
            (Self::List(declared), Self::List(found))
            | (Self::Set(declared), Self::Set(found))
            | (Self::Map(declared), Self::Map(found)) => declared.accepts(found),
            (Self::Object(declared), Self::Object(found)) => {
                declared.len() == found.len()
                    && declared
                        .iter()
                        .all(|(name, ty)| found.get(name).is_some_and(|found| ty.accepts(found)))
            },
            (declared, found) => declared == found,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Int64 => write!(f, "int64"),
            Self::Float64 => write!(f, "float64"),
            Self::Bool => write!(f, "bool"),
            Self::List(element) => write!(f, "list of {}", element),
            Self::Set(element) => write!(f, "set of {}", element),
            Self::Map(element) => write!(f, "map of {}", element),
            Self::Object(_) => write!(f, "object"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A typed value tree.
#[derive(Debug, Clone)]
pub enum Value {
    /// An absent value of the given type.
    Null(AttributeType),
    /// A value that will only be known after apply.
    Unknown(AttributeType),
    /// A known string.
    String(String),
    /// A known 64-bit integer.
    Int64(i64),
    /// A known 64-bit float.
    Float64(f64),
    /// A known boolean.
    Bool(bool),
    /// A known list.
    List {
        /// Type of every element.
        element_type: AttributeType,
        /// The elements, in order.
        elements: Vec<Value>,
    },
    /// A known set. Membership is by value.
    Set {
        /// Type of every element.
        element_type: AttributeType,
        /// The elements. Order carries no meaning.
        elements: Vec<Value>,
    },
    /// A known map.
    Map {
        /// Type of every element.
        element_type: AttributeType,
        /// The elements by key.
        elements: BTreeMap<String, Value>,
    },
    /// A known object.
    Object {
        /// Declared attribute types.
        attribute_types: BTreeMap<String, AttributeType>,
        /// Attribute values. A missing entry is a null of its declared type.
        attributes: BTreeMap<String, Value>,
    },
}

impl Value {
    /// Create a known string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Create a known list value.
    pub fn list(element_type: AttributeType, elements: Vec<Value>) -> Self {
        Self::List {
            element_type,
            elements,
        }
    }

    /// Create a known set value, dropping duplicate elements.
    pub fn set(element_type: AttributeType, elements: Vec<Value>) -> Self {
        let mut unique: Vec<Value> = Vec::with_capacity(elements.len());
        for element in elements {
            if !unique.contains(&element) {
                unique.push(element);
            }
        }
        Self::Set {
            element_type,
            elements: unique,
        }
    }

    /// Create a known map value.
    pub fn map<K: Into<String>>(
        element_type: AttributeType,
        elements: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        Self::Map {
            element_type,
            elements: elements.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Create a known object value. Attributes not supplied are set to null.
    pub fn object<K: Into<String>>(
        attribute_types: BTreeMap<String, AttributeType>,
        attributes: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        let mut attributes: BTreeMap<String, Value> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();
        for (name, ty) in &attribute_types {
            attributes
                .entry(name.clone())
                .or_insert_with(|| Value::Null(ty.clone()));
        }
        Self::Object {
            attribute_types,
            attributes,
        }
    }

    /// The type of this value.
    pub fn ty(&self) -> AttributeType {
        match self {
            Self::Null(ty) | Self::Unknown(ty) => ty.clone(),
            Self::String(_) => AttributeType::String,
            Self::Int64(_) => AttributeType::Int64,
            Self::Float64(_) => AttributeType::Float64,
            Self::Bool(_) => AttributeType::Bool,
            Self::List { element_type, .. } => AttributeType::list(element_type.clone()),
            Self::Set { element_type, .. } => AttributeType::set(element_type.clone()),
            Self::Map { element_type, .. } => AttributeType::map(element_type.clone()),
            Self::Object {
                attribute_types, ..
            } => AttributeType::Object(attribute_types.clone()),
        }
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Whether the value is unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Whether the value is neither null nor unknown.
    pub fn is_known(&self) -> bool {
        !self.is_null() && !self.is_unknown()
    }

    /// Name of the runtime shape of this value.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null(_) => "null",
            Self::Unknown(_) => "unknown",
            Self::String(_) => "string",
            Self::Int64(_) => "int64",
            Self::Float64(_) => "float64",
            Self::Bool(_) => "bool",
            Self::List { .. } => "list",
            Self::Set { .. } => "set",
            Self::Map { .. } => "map",
            Self::Object { .. } => "object",
        }
    }

    /// Look up an attribute of an object value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object { attributes, .. } => attributes.get(name),
            _ => None,
        }
    }

    /// Convert a JSON document into a value of the given type.
    ///
    /// JSON `null` becomes [`Value::Null`]. Integral floats such as `42.0`
    /// are accepted for `Int64`.
    pub fn from_json(ty: &AttributeType, json: &serde_json::Value) -> Result<Value, ProviderError> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Ok(Value::Null(ty.clone()));
        }

        let mismatch = || ProviderError::type_mismatch(ty, json_type_name(json));

        match ty {
            AttributeType::String => json
                .as_str()
                .map(Value::string)
                .ok_or_else(mismatch),
            AttributeType::Int64 => json_as_i64(json).map(Value::Int64).ok_or_else(mismatch),
            AttributeType::Float64 => json.as_f64().map(Value::Float64).ok_or_else(mismatch),
            AttributeType::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            AttributeType::List(element) | AttributeType::Set(element) => {
                let items = json.as_array().ok_or_else(mismatch)?;
                let elements = items
                    .iter()
                    .map(|item| Value::from_json(element, item))
                    .collect::<Result<Vec<_>, _>>()?;
                if matches!(ty, AttributeType::Set(_)) {
                    Ok(Value::set((**element).clone(), elements))
                } else {
                    Ok(Value::list((**element).clone(), elements))
                }
            },
            AttributeType::Map(element) => {
                let entries = json.as_object().ok_or_else(mismatch)?;
                let elements = entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), Value::from_json(element, item)?)))
                    .collect::<Result<BTreeMap<_, _>, ProviderError>>()?;
                Ok(Value::Map {
                    element_type: (**element).clone(),
                    elements,
                })
            },
            AttributeType::Object(attribute_types) => {
                let entries = json.as_object().ok_or_else(mismatch)?;
                if let Some(extra) = entries.keys().find(|k| !attribute_types.contains_key(*k)) {
                    return Err(ProviderError::type_mismatch(
                        ty,
                        format!("object with unexpected attribute \"{}\"", extra),
                    ));
                }
                let mut attributes = BTreeMap::new();
                for (name, attr_ty) in attribute_types {
                    let value = match entries.get(name) {
                        Some(item) => Value::from_json(attr_ty, item)?,
                        None => Value::Null(attr_ty.clone()),
                    };
                    attributes.insert(name.clone(), value);
                }
                Ok(Value::Object {
                    attribute_types: attribute_types.clone(),
                    attributes,
                })
            },
            AttributeType::Dynamic => Ok(match json {
                Json::String(s) => Value::string(s.clone()),
                Json::Bool(b) => Value::Bool(*b),
                Json::Number(n) => match n.as_i64() {
                    Some(i) => Value::Int64(i),
                    None => Value::Float64(n.as_f64().unwrap_or_default()),
                },
                Json::Array(items) => Value::list(
                    AttributeType::Dynamic,
                    items
                        .iter()
                        .map(|item| Value::from_json(ty, item))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                Json::Object(entries) => Value::Map {
                    element_type: AttributeType::Dynamic,
                    elements: entries
                        .iter()
                        .map(|(key, item)| Ok((key.clone(), Value::from_json(ty, item)?)))
                        .collect::<Result<BTreeMap<_, _>, ProviderError>>()?,
                },
                Json::Null => Value::Null(AttributeType::Dynamic),
            }),
        }
    }

    /// Convert the value into a JSON document.
    ///
    /// Unknown values have no JSON form and are rendered as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null(_) | Self::Unknown(_) => Json::Null,
            Self::String(s) => Json::String(s.clone()),
            Self::Int64(i) => Json::from(*i),
            Self::Float64(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Bool(b) => Json::Bool(*b),
            Self::List { elements, .. } | Self::Set { elements, .. } => {
                Json::Array(elements.iter().map(Value::to_json).collect())
            },
            Self::Map { elements, .. } => Json::Object(
                elements
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Object {
                attribute_types,
                attributes,
            } => Json::Object(
                attribute_types
                    .keys()
                    .map(|name| {
                        let json = attributes.get(name).map(Value::to_json).unwrap_or(Json::Null);
                        (name.clone(), json)
                    })
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null(a), Self::Null(b)) | (Self::Unknown(a), Self::Unknown(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (
                Self::List {
                    element_type: ta,
                    elements: a,
                },
                Self::List {
                    element_type: tb,
                    elements: b,
                },
            ) => ta == tb && a == b,
            (
                Self::Set {
                    element_type: ta,
                    elements: a,
                },
                Self::Set {
                    element_type: tb,
                    elements: b,
                },
            ) => ta == tb && a.len() == b.len() && a.iter().all(|v| b.contains(v)),
            (
                Self::Map {
                    element_type: ta,
                    elements: a,
                },
                Self::Map {
                    element_type: tb,
                    elements: b,
                },
            ) => ta == tb && a == b,
            (
                Self::Object {
                    attribute_types: ta,
                    attributes: a,
                },
                Self::Object {
                    attribute_types: tb,
                    attributes: b,
                },
            ) => {
                ta == tb
                    && ta
                        .iter()
                        .all(|(name, ty)| attribute_eq(a.get(name), b.get(name), ty))
            },
            _ => false,
        }
    }
}

fn attribute_eq(a: Option<&Value>, b: Option<&Value>, ty: &AttributeType) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (Some(v), None) | (None, Some(v)) => matches!(v, Value::Null(t) if t == ty),
        (None, None) => true,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(_) => write!(f, "null"),
            Self::Unknown(_) => write!(f, "<unknown>"),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Int64(i) => write!(f, "{}", i),
            Self::Float64(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::List { elements, .. } | Self::Set { elements, .. } => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            },
            Self::Map { elements, .. } => {
                write!(f, "{{")?;
                for (i, (key, element)) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, element)?;
                }
                write!(f, "}}")
            },
            Self::Object {
                attribute_types,
                attributes,
            } => {
                write!(f, "{{")?;
                for (i, name) in attribute_types.keys().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match attributes.get(name) {
                        Some(value) => write!(f, "{}: {}", name, value)?,
                        None => write!(f, "{}: null", name)?,
                    }
                }
                write!(f, "}}")
            },
        }
    }
}

fn json_as_i64(json: &serde_json::Value) -> Option<i64> {
    if let Some(i) = json.as_i64() {
        return Some(i);
    }
    // 42.0 is an acceptable int64
    json.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
}

/// Get a human-readable name for a JSON value's type.
pub(crate) fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
