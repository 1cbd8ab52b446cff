//! Canonical resource references
//!
//! A reference names a resource as `Type[title]`. References never hold a
//! pointer to their catalog; resolution always takes the catalog explicitly.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::resource::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generic container type that `component` collapses to.
pub const CLASS_TYPE: &str = "Class";

/// Identity of a resource: canonical type name plus title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceRef {
    type_name: String,
    title: String,
}

impl ResourceRef {
    /// Build a reference from a type and a title.
    ///
    /// If the title itself looks like `Type[title]`, the embedded type wins.
    pub fn new(type_name: &str, title: &str) -> Self {
        if let Some((embedded, inner)) = split_reference(title) {
            return Self {
                type_name: canonical_type(Some(embedded)),
                title: inner.to_string(),
            };
        }
        Self {
            type_name: canonical_type(Some(type_name)),
            title: title.to_string(),
        }
    }

    /// Parse a `Type[title]` string.
    pub fn parse(reference: &str) -> Result<Self> {
        let (type_name, title) = split_reference(reference.trim())
            .ok_or_else(|| Error::InvalidReference(reference.to_string()))?;
        Ok(Self {
            type_name: canonical_type(Some(type_name)),
            title: title.to_string(),
        })
    }

    /// Canonical type name (`File`, `Foo::Bar`, `Class`).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Resource title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Registry key for this reference's type (`file`, `foo::bar`).
    pub fn type_key(&self) -> String {
        self.type_name.to_lowercase()
    }

    /// Find the referenced resource in the given catalog.
    pub fn resolve<'c>(&self, catalog: &'c Catalog) -> Option<&'c Resource> {
        catalog.resource(self)
    }
}

/// Split `Type[title]` into its parts.
///
/// The type may not contain brackets and the title may not be empty.
fn split_reference(s: &str) -> Option<(&str, &str)> {
    let (type_name, rest) = s.split_once('[')?;
    let title = rest.strip_suffix(']')?;
    if type_name.is_empty() || type_name.contains(']') || title.is_empty() {
        return None;
    }
    Some((type_name, title))
}

/// Canonicalize a type name: capitalize every `::` segment, and collapse
/// `component` (or no type at all) into [`CLASS_TYPE`].
pub fn canonical_type(type_name: Option<&str>) -> String {
    match type_name.map(str::trim) {
        None | Some("") => CLASS_TYPE.to_string(),
        Some(name) if name.eq_ignore_ascii_case("component") => CLASS_TYPE.to_string(),
        Some(name) => name
            .split("::")
            .map(capitalize)
            .collect::<Vec<_>>()
            .join("::"),
    }
}

fn capitalize(segment: &str) -> String {
    let lower = segment.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_name, self.title)
    }
}

impl FromStr for ResourceRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ResourceRef> for String {
    fn from(r: ResourceRef) -> Self {
        r.to_string()
    }
}
