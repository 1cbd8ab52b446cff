//! Serializable catalog documents
//!
//! These are the plain data shapes exchanged with a compiler and written to
//! the cache. The codec itself is chosen by the caller.

use crate::graph::Edge;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A compiled catalog as exchanged on the wire and in the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Node the catalog was compiled for.
    pub name: String,
    /// Compiler-assigned version (usually the compile timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Classes applied to the node.
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceDocument>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// One resource declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDocument {
    #[serde(rename = "type")]
    pub type_name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exported: bool,
    #[serde(default, rename = "virtual", skip_serializing_if = "is_false")]
    pub is_virtual: bool,
    #[serde(default)]
    pub parameters: IndexMap<String, AttributeValue>,
}

impl ResourceDocument {
    /// Attribute values in the shape the registry expects.
    pub fn attributes(&self) -> IndexMap<String, Vec<Value>> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().into_values()))
            .collect()
    }
}

/// A single value or a list of acceptable values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// `true`/`false`, stored as tokens.
    Flag(bool),
    One(Value),
    Many(Vec<Value>),
}

impl AttributeValue {
    /// Flatten into a list of values.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Flag(flag) => vec![Value::token(flag.to_string())],
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

impl From<Vec<Value>> for AttributeValue {
    fn from(mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            Self::One(values.remove(0))
        } else {
            Self::Many(values)
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}
