//! Schema types for describing resource structure.
//!
//! A [`Schema`] is a tree of [`Attribute`]s and [`NestedBlock`]s. Schemas are
//! built once by provider code and stay immutable while a plan is computed.
//! Attributes and blocks are stored in `BTreeMap`s so every walk over a
//! schema visits names in sorted order.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ProviderError;
use crate::path::{Path, PathStep};
use crate::planmodifier::{PlanModifier, PlanModifiers};
use crate::types::AttributeType;

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider.
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute (read-only, set by provider).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// How the object of a nested attribute is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    /// Exactly one object.
    Single,
    /// An ordered list of objects.
    List,
    /// A set of objects.
    Set,
    /// A map of objects keyed by string.
    Map,
}

/// The attributes of a nested attribute's object, and how it repeats.
#[derive(Debug, Clone, Serialize)]
pub struct NestedAttributes {
    /// How the object is repeated.
    pub nesting_mode: NestingMode,
    /// The attributes of each object.
    pub attributes: BTreeMap<String, Attribute>,
}

impl NestedAttributes {
    /// Create nested attributes with the given nesting mode.
    pub fn new(nesting_mode: NestingMode) -> Self {
        Self {
            nesting_mode,
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute to the nested object.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// The object type shared by every element.
    pub fn object_type(&self) -> AttributeType {
        AttributeType::Object(
            self.attributes
                .iter()
                .map(|(name, attr)| (name.clone(), attr.attribute_type()))
                .collect(),
        )
    }
}

/// What an attribute holds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// A value of a fixed type with no schema below it.
    Type(AttributeType),
    /// Objects described by nested attributes.
    Nested(NestedAttributes),
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    /// What the attribute holds.
    #[serde(flatten)]
    pub kind: AttributeKind,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Plan modifiers, run in order.
    #[serde(skip)]
    pub plan_modifiers: PlanModifiers,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            kind: AttributeKind::Type(attr_type),
            flags,
            description: None,
            plan_modifiers: PlanModifiers::new(),
        }
    }

    /// Create an attribute with nested attributes.
    pub fn nested(nested: NestedAttributes, flags: AttributeFlags) -> Self {
        Self {
            kind: AttributeKind::Nested(nested),
            flags,
            description: None,
            plan_modifiers: PlanModifiers::new(),
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Create a required int64 attribute.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// Create an optional int64 attribute.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// Create a computed int64 attribute.
    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    /// Create a required bool attribute.
    pub fn required_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::required())
    }

    /// Create an optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Create a computed bool attribute.
    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Also mark the attribute as computed.
    pub fn computed(mut self) -> Self {
        self.flags.computed = true;
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Append a plan modifier.
    pub fn with_plan_modifier(mut self, modifier: impl PlanModifier + 'static) -> Self {
        self.plan_modifiers.push(modifier);
        self
    }

    /// The nested attributes, if any.
    pub fn nested_attributes(&self) -> Option<&NestedAttributes> {
        match &self.kind {
            AttributeKind::Nested(nested) => Some(nested),
            AttributeKind::Type(_) => None,
        }
    }

    /// The value type of this attribute.
    pub fn attribute_type(&self) -> AttributeType {
        match &self.kind {
            AttributeKind::Type(ty) => ty.clone(),
            AttributeKind::Nested(nested) => {
                let object = nested.object_type();
                match nested.nesting_mode {
                    NestingMode::Single => object,
                    NestingMode::List => AttributeType::list(object),
                    NestingMode::Set => AttributeType::set(object),
                    NestingMode::Map => AttributeType::map(object),
                }
            },
        }
    }
}

/// The nesting mode for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// A single nested block (at most one).
    #[default]
    Single,
    /// A list of nested blocks (zero or more, ordered).
    List,
    /// A set of nested blocks (zero or more, unordered, unique).
    Set,
}

/// A group of attributes and nested blocks.
///
/// Blocks are used for complex nested structures that have their own
/// set of attributes (e.g., `ingress` blocks in a security group).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Block {
    /// The attributes within this block.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    /// Nested blocks within this block.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<String, NestedBlock>,
    /// Human-readable description of the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to this block.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to this block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for this block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The object type of one instance of this block.
    pub fn object_type(&self) -> AttributeType {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.attribute_type()));
        let blocks = self
            .blocks
            .iter()
            .map(|(name, block)| (name.clone(), block.attribute_type()));
        AttributeType::Object(attributes.chain(blocks).collect())
    }
}

/// A nested block with its nesting mode and constraints.
#[derive(Debug, Clone, Serialize)]
pub struct NestedBlock {
    /// The block definition.
    #[serde(flatten)]
    pub block: Block,
    /// How the block is nested (single, list, set).
    pub nesting_mode: BlockNestingMode,
    /// Minimum number of blocks required.
    pub min_items: u32,
    /// Maximum number of blocks allowed (0 = unlimited).
    pub max_items: u32,
    /// Plan modifiers for the block as a whole, run in order.
    #[serde(skip)]
    pub plan_modifiers: PlanModifiers,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode, max_items: u32) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items,
            plan_modifiers: PlanModifiers::new(),
        }
    }

    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Single, 1)
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List, 0)
    }

    /// Create a set of nested blocks.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Set, 0)
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of blocks allowed.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// Append a plan modifier.
    pub fn with_plan_modifier(mut self, modifier: impl PlanModifier + 'static) -> Self {
        self.plan_modifiers.push(modifier);
        self
    }

    /// The value type of this block.
    pub fn attribute_type(&self) -> AttributeType {
        let object = self.block.object_type();
        match self.nesting_mode {
            BlockNestingMode::Single => object,
            BlockNestingMode::List => AttributeType::list(object),
            BlockNestingMode::Set => AttributeType::set(object),
        }
    }
}

/// Schema for a resource.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    pub version: u64,
    /// The root block containing all attributes and nested blocks.
    #[serde(flatten)]
    pub block: Block,
}

/// Where a path walk currently stands in the schema.
enum Cursor<'a> {
    Block(&'a Block),
    NestedBlock(&'a NestedBlock),
    Attribute(&'a Attribute),
    NestedObject(&'a NestedAttributes),
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to the schema.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// The object type of the whole resource.
    pub fn object_type(&self) -> AttributeType {
        self.block.object_type()
    }

    /// The value type at a path.
    pub fn type_at_path(&self, path: &Path) -> Result<AttributeType, ProviderError> {
        let mut ty = self.object_type();
        for step in path.steps() {
            ty = ty
                .step_type(step)
                .cloned()
                .ok_or_else(|| {
                    ProviderError::invalid_path(path, format!("{} does not apply to {}", step, ty))
                })?;
        }
        Ok(ty)
    }

    /// Find the attribute a path points at.
    ///
    /// Fails with [`ProviderError::PathIsBlock`] when the path ends on a block
    /// and with [`ProviderError::PathInsideAtomicAttribute`] when it descends
    /// into an attribute that has no nested attributes.
    pub fn attribute_at_path(&self, path: &Path) -> Result<&Attribute, ProviderError> {
        let invalid = |reason: &str| ProviderError::invalid_path(path, reason);

        let mut cursor = Cursor::Block(&self.block);
        for step in path.steps() {
            cursor = match (cursor, step) {
                (Cursor::Block(block), PathStep::AttributeName(name)) => {
                    if let Some(attr) = block.attributes.get(name) {
                        Cursor::Attribute(attr)
                    } else if let Some(nested) = block.blocks.get(name) {
                        Cursor::NestedBlock(nested)
                    } else {
                        return Err(invalid("no attribute or block with this name"));
                    }
                },
                (Cursor::NestedBlock(nested), step) => match (nested.nesting_mode, step) {
                    (BlockNestingMode::Single, PathStep::AttributeName(name)) => {
                        if let Some(attr) = nested.block.attributes.get(name) {
                            Cursor::Attribute(attr)
                        } else if let Some(child) = nested.block.blocks.get(name) {
                            Cursor::NestedBlock(child)
                        } else {
                            return Err(invalid("no attribute or block with this name"));
                        }
                    },
                    (BlockNestingMode::List, PathStep::ElementKeyInt(_))
                    | (BlockNestingMode::Set, PathStep::ElementKeyValue(_)) => {
                        Cursor::Block(&nested.block)
                    },
                    _ => return Err(invalid("step does not match the block nesting mode")),
                },
                (Cursor::Attribute(attr), step) => {
                    let Some(nested) = attr.nested_attributes() else {
                        return Err(ProviderError::PathInsideAtomicAttribute(path.to_string()));
                    };
                    match (nested.nesting_mode, step) {
                        (NestingMode::Single, PathStep::AttributeName(name)) => nested
                            .attributes
                            .get(name)
                            .map(Cursor::Attribute)
                            .ok_or_else(|| invalid("no nested attribute with this name"))?,
                        (NestingMode::List, PathStep::ElementKeyInt(_))
                        | (NestingMode::Set, PathStep::ElementKeyValue(_))
                        | (NestingMode::Map, PathStep::ElementKeyString(_)) => {
                            Cursor::NestedObject(nested)
                        },
                        _ => return Err(invalid("step does not match the attribute nesting mode")),
                    }
                },
                (Cursor::NestedObject(nested), PathStep::AttributeName(name)) => nested
                    .attributes
                    .get(name)
                    .map(Cursor::Attribute)
                    .ok_or_else(|| invalid("no nested attribute with this name"))?,
                (Cursor::Block(_), _) | (Cursor::NestedObject(_), _) => {
                    return Err(invalid("element step applied to an object"))
                },
            };
        }

        match cursor {
            Cursor::Attribute(attr) => Ok(attr),
            Cursor::Block(_) | Cursor::NestedBlock(_) => {
                Err(ProviderError::PathIsBlock(path.to_string()))
            },
            Cursor::NestedObject(_) => Err(invalid("path ends on a nested attribute object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planmodifier::RequiresReplace;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "rules",
                Attribute::nested(
                    NestedAttributes::new(NestingMode::List)
                        .with_attribute("port", Attribute::required_int64())
                        .with_attribute("cidr", Attribute::optional_string()),
                    AttributeFlags::optional(),
                ),
            )
            .with_block(
                "disk",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("size", Attribute::required_int64())
                        .with_block(
                            "encryption",
                            NestedBlock::single(
                                Block::new().with_attribute("key", Attribute::optional_string()),
                            ),
                        ),
                ),
            )
    }

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.optional);
        assert!(!required.computed);

        let optional_computed = AttributeFlags::optional_computed();
        assert!(!optional_computed.required);
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);

        let sensitive = AttributeFlags::required().sensitive();
        assert!(sensitive.sensitive);
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::optional_string()
            .computed()
            .with_description("A test attribute")
            .with_plan_modifier(RequiresReplace);

        assert_eq!(attr.attribute_type(), AttributeType::String);
        assert!(attr.flags.optional);
        assert!(attr.flags.computed);
        assert_eq!(attr.description, Some("A test attribute".to_string()));
        assert_eq!(attr.plan_modifiers.len(), 1);
    }

    #[test]
    fn test_object_type_includes_blocks() {
        let ty = schema().object_type();
        let AttributeType::Object(attrs) = ty else {
            panic!("expected object type");
        };
        assert_eq!(attrs.len(), 4);
        assert_eq!(
            attrs["rules"],
            AttributeType::list(AttributeType::object([
                ("cidr", AttributeType::String),
                ("port", AttributeType::Int64),
            ]))
        );
        assert_eq!(
            attrs["disk"],
            AttributeType::list(AttributeType::object([
                (
                    "encryption",
                    AttributeType::object([("key", AttributeType::String)])
                ),
                ("size", AttributeType::Int64),
            ]))
        );
    }

    #[test]
    fn test_attribute_at_path() {
        let schema = schema();

        let attr = schema
            .attribute_at_path(&Path::root("rules").at_list_index(3).at_name("port"))
            .unwrap();
        assert_eq!(attr.attribute_type(), AttributeType::Int64);

        let attr = schema
            .attribute_at_path(
                &Path::root("disk")
                    .at_list_index(0)
                    .at_name("encryption")
                    .at_name("key"),
            )
            .unwrap();
        assert!(attr.flags.optional);
    }

    #[test]
    fn test_attribute_at_path_errors() {
        let schema = schema();

        let err = schema
            .attribute_at_path(&Path::root("disk").at_list_index(0))
            .unwrap_err();
        assert!(matches!(err, ProviderError::PathIsBlock(_)));

        let err = schema
            .attribute_at_path(&Path::root("name").at_name("inner"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::PathInsideAtomicAttribute(_)));

        let err = schema.attribute_at_path(&Path::root("missing")).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidPath { .. }));

        let err = schema
            .attribute_at_path(&Path::root("rules").at_map_key("a"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidPath { .. }));
    }

    #[test]
    fn test_type_at_path() {
        let schema = schema();
        assert_eq!(
            schema
                .type_at_path(&Path::root("disk").at_list_index(0).at_name("size"))
                .unwrap(),
            AttributeType::Int64
        );
        assert!(schema.type_at_path(&Path::root("name").at_list_index(0)).is_err());
    }

    #[test]
    fn test_nested_block_modes() {
        let single = NestedBlock::single(Block::new());
        assert_eq!(single.nesting_mode, BlockNestingMode::Single);
        assert_eq!(single.max_items, 1);

        let list = NestedBlock::list(Block::new())
            .with_min_items(1)
            .with_max_items(5);
        assert_eq!(list.nesting_mode, BlockNestingMode::List);
        assert_eq!(list.min_items, 1);
        assert_eq!(list.max_items, 5);
    }

    #[test]
    fn test_schema_serializes_without_modifiers() {
        let schema = Schema::v0().with_attribute(
            "name",
            Attribute::required_string().with_plan_modifier(RequiresReplace),
        );
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["version"], 0);
        assert_eq!(json["attributes"]["name"]["type"], "string");
        assert_eq!(json["attributes"]["name"]["required"], true);
        assert!(json["attributes"]["name"].get("plan_modifiers").is_none());
    }
}
