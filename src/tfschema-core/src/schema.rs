//! Local representation of provider schemas.
//!
//! Plugins describe their configuration surface as a tree of blocks. Each
//! block has named attributes and named nested block types. Attribute types
//! arrive as JSON-encoded type constraints (`"string"`, `["list","string"]`,
//! `["object",{"a":"number"}]`, ...) and are decoded into [`Type`].

use crate::diagnostics::Diagnostics;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// A block of attributes and nested blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Block {
    pub attributes: BTreeMap<String, Attribute>,
    pub block_types: BTreeMap<String, NestedBlock>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

/// A single attribute definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    /// Declared type. `None` when the attribute is described by `nested_type` instead.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub attr_type: Option<Type>,
    /// Nested attribute object (protocol 6 only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested_type: Option<NestedAttributes>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

impl Attribute {
    /// The type a value of this attribute has, including the implied type of nested attributes.
    pub fn effective_type(&self) -> Type {
        match (&self.attr_type, &self.nested_type) {
            (Some(ty), _) => ty.clone(),
            (None, Some(nested)) => nested.implied_type(),
            (None, None) => Type::Dynamic,
        }
    }
}

/// Attributes nested inside an attribute (protocol 6 `Schema.Object`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedAttributes {
    pub nesting: NestingMode,
    pub attributes: BTreeMap<String, Attribute>,
}

impl NestedAttributes {
    pub fn implied_type(&self) -> Type {
        let object = Type::Object(
            self.attributes
                .iter()
                .map(|(name, attr)| (name.clone(), attr.effective_type()))
                .collect(),
        );
        match self.nesting {
            NestingMode::List => Type::List(Box::new(object)),
            NestingMode::Set => Type::Set(Box::new(object)),
            NestingMode::Map => Type::Map(Box::new(object)),
            NestingMode::Single | NestingMode::Group | NestingMode::Invalid => object,
        }
    }
}

/// A nested block type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedBlock {
    pub nesting: NestingMode,
    pub min_items: i64,
    pub max_items: i64,
    #[serde(flatten)]
    pub block: Block,
}

/// How a nested block or nested attribute object repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NestingMode {
    #[default]
    #[serde(rename = "NestingInvalid")]
    Invalid,
    #[serde(rename = "NestingSingle")]
    Single,
    #[serde(rename = "NestingGroup")]
    Group,
    #[serde(rename = "NestingList")]
    List,
    #[serde(rename = "NestingSet")]
    Set,
    #[serde(rename = "NestingMap")]
    Map,
}

impl fmt::Display for NestingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NestingMode::Invalid => "NestingInvalid",
            NestingMode::Single => "NestingSingle",
            NestingMode::Group => "NestingGroup",
            NestingMode::List => "NestingList",
            NestingMode::Set => "NestingSet",
            NestingMode::Map => "NestingMap",
        };
        f.write_str(name)
    }
}

/// An attribute type constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    String,
    Number,
    Bool,
    /// Any type, decided at runtime.
    Dynamic,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Object(BTreeMap<String, Type>),
    Tuple(Vec<Type>),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid type constraint {input}: {reason}")]
pub struct TypeError {
    pub input: String,
    pub reason: String,
}

impl Type {
    /// Decode a JSON type constraint as sent over the plugin protocol.
    pub fn from_json(raw: &[u8]) -> Result<Self, TypeError> {
        let value: Value = serde_json::from_slice(raw).map_err(|err| TypeError {
            input: String::from_utf8_lossy(raw).into_owned(),
            reason: err.to_string(),
        })?;
        Self::from_value(&value)
    }

    fn from_value(value: &Value) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError {
            input: value.to_string(),
            reason: reason.to_string(),
        };

        match value {
            Value::String(name) => match name.as_str() {
                "string" => Ok(Type::String),
                "number" => Ok(Type::Number),
                "bool" => Ok(Type::Bool),
                "dynamic" => Ok(Type::Dynamic),
                _ => Err(invalid("unknown primitive type")),
            },
            Value::Array(parts) => {
                let (kind, rest) = parts
                    .split_first()
                    .ok_or_else(|| invalid("empty type array"))?;
                let kind = kind.as_str().ok_or_else(|| invalid("type kind is not a string"))?;
                match (kind, rest) {
                    ("list", [element]) => Ok(Type::List(Box::new(Self::from_value(element)?))),
                    ("set", [element]) => Ok(Type::Set(Box::new(Self::from_value(element)?))),
                    ("map", [element]) => Ok(Type::Map(Box::new(Self::from_value(element)?))),
                    // The optional third element lists optional attribute names; it does not
                    // change the shape of the object.
                    ("object", [Value::Object(fields)] | [Value::Object(fields), _]) => fields
                        .iter()
                        .map(|(name, ty)| Ok((name.clone(), Self::from_value(ty)?)))
                        .collect::<Result<BTreeMap<_, _>, _>>()
                        .map(Type::Object),
                    ("tuple", [Value::Array(elements)]) => elements
                        .iter()
                        .map(Self::from_value)
                        .collect::<Result<Vec<_>, _>>()
                        .map(Type::Tuple),
                    _ => Err(invalid("unsupported type kind or arity")),
                }
            }
            _ => Err(invalid("expected a string or an array")),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::String => f.write_str("string"),
            Type::Number => f.write_str("number"),
            Type::Bool => f.write_str("bool"),
            Type::Dynamic => f.write_str("any"),
            Type::List(element) => write!(f, "list({element})"),
            Type::Set(element) => write!(f, "set({element})"),
            Type::Map(element) => write!(f, "map({element})"),
            Type::Object(fields) => {
                f.write_str("object({")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}={ty}")?;
                }
                f.write_str("})")
            }
            Type::Tuple(elements) => {
                f.write_str("tuple([")?;
                for (i, ty) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                f.write_str("])")
            }
        }
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A versioned schema as returned for the provider, a resource type or a data source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
}

/// Everything a single "get provider schema" call returns.
///
/// The resource and data source maps carry no ordering; callers that list
/// names must sort them.
#[derive(Debug, Clone, Default)]
pub struct GetProviderSchemaResponse {
    pub provider: Schema,
    pub provider_meta: Option<Schema>,
    pub resource_types: HashMap<String, Schema>,
    pub data_sources: HashMap<String, Schema>,
    pub diagnostics: Diagnostics,
}
