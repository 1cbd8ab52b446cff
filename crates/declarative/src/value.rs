//! Attribute values
//!
//! Every current (`is`) and desired (`should`) value is one of a handful of
//! shapes. Formatting is decided by the variant plus the property's declared
//! [`ValueFormat`], never by the property implementation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token used for "the entity does not exist".
pub const ABSENT: &str = "absent";

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Numeric value (modes, uids, sizes).
    Integer(i64),
    /// Free-form text.
    Text(String),
    /// Enumerated token such as `present`, `absent` or `directory`.
    ///
    /// Tokens serialize as plain strings; properties turn text back into
    /// tokens when munging.
    #[serde(skip_deserializing)]
    Token(String),
}

/// How integer values are rendered for logs and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueFormat {
    /// Base 10.
    #[default]
    Decimal,
    /// Base 8 with no prefix (`644`), for permission bits.
    Octal,
}

impl Value {
    /// The `absent` token.
    pub fn absent() -> Self {
        Self::Token(ABSENT.to_string())
    }

    /// Build a token value.
    pub fn token(name: impl Into<String>) -> Self {
        Self::Token(name.into())
    }

    /// Build a text value.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Check if this is the `absent` token.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Token(t) if t == ABSENT)
    }

    /// Get the integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the textual payload of a token or text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Token(s) => Some(s),
            Self::Integer(_) => None,
        }
    }

    /// Render the value for humans.
    pub fn render(&self, format: ValueFormat) -> String {
        match (self, format) {
            (Self::Integer(n), ValueFormat::Octal) => format!("{n:o}"),
            (Self::Integer(n), ValueFormat::Decimal) => n.to_string(),
            (Self::Token(t), _) => t.clone(),
            (Self::Text(s), _) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(ValueFormat::Decimal))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

/// Render an ordered set of acceptable values.
pub fn render_all(values: &[Value], format: ValueFormat) -> String {
    match values {
        [] => ABSENT.to_string(),
        [single] => single.render(format),
        many => {
            let parts: Vec<String> = many.iter().map(|v| v.render(format)).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_octal() {
        assert_eq!(Value::Integer(0o644).render(ValueFormat::Octal), "644");
        assert_eq!(Value::Integer(0o644).render(ValueFormat::Decimal), "420");
        assert_eq!(Value::absent().render(ValueFormat::Octal), "absent");
    }

    #[test]
    fn test_render_all() {
        assert_eq!(render_all(&[], ValueFormat::Decimal), "absent");
        assert_eq!(
            render_all(&[Value::text("a"), Value::text("b")], ValueFormat::Decimal),
            "[a, b]"
        );
    }

    #[test]
    fn test_untagged_serde() {
        let parsed: Vec<Value> = serde_json::from_str(r#"[420, "present"]"#).unwrap();
        assert_eq!(parsed, vec![Value::Integer(420), Value::text("present")]);

        // Tokens serialize like text so cached catalogs stay readable
        let json = serde_json::to_string(&Value::token("directory")).unwrap();
        assert_eq!(json, r#""directory""#);
    }
}
