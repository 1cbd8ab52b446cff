//! Error types for the convergence engine.
//!
//! Errors are categorized so callers can decide whether a failure is local to
//! one resource (recorded in the report) or structural (aborts the whole
//! transaction before anything is touched).

use std::fmt;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad desired-value input, rejected at assignment time.
    Validation,
    /// An external write failed for one property.
    Apply,
    /// The catalog graph itself is unusable (cycle, dangling reference).
    Structural,
    /// A type name the registry does not know, or registers twice.
    Registry,
}

impl ErrorCategory {
    /// Whether this error aborts a transaction before any resource is touched.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid attribute value",
            Self::Apply => "Failed to apply change",
            Self::Structural => "Invalid catalog structure",
            Self::Registry => "Unknown or duplicate resource type",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors raised by the property/resource state machine and the transaction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A desired value could not be normalized.
    #[error("invalid value for {attribute}: {message}")]
    Validation {
        /// Attribute being assigned.
        attribute: String,
        /// Why the value was rejected.
        message: String,
    },

    /// A property's external write failed.
    #[error("{resource}: could not change {property}: {source}")]
    Apply {
        /// Resource reference (`Type[title]`).
        resource: String,
        /// Property being synced.
        property: String,
        /// Underlying provider failure.
        #[source]
        source: anyhow::Error,
    },

    /// The relationship graph contains a cycle.
    #[error("found dependency cycle: {}", .path.join(" => "))]
    Cycle {
        /// Resources participating in the cycle.
        path: Vec<String>,
    },

    /// An edge points at a resource that is not in the catalog.
    #[error("{source_ref} refers to {target}, which is not in the catalog")]
    DanglingReference {
        /// Resource declaring the relationship.
        source_ref: String,
        /// Unresolvable target reference.
        target: String,
    },

    /// A resource reference string could not be parsed.
    #[error("invalid resource reference: {0}")]
    InvalidReference(String),

    /// Two resources share the same identity.
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    /// The registry has no descriptor for this type.
    #[error("unknown resource type: {0}")]
    UnknownType(String),

    /// A type with this name is already registered.
    #[error("resource type {0} is already registered")]
    DuplicateType(String),

    /// The type has no attribute with this name.
    #[error("{type_name} has no attribute named {attribute}")]
    UnknownAttribute {
        /// Type the attribute was set on.
        type_name: String,
        /// Offending attribute name.
        attribute: String,
    },
}

impl Error {
    /// Create a validation error.
    pub fn validation(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation { .. }
            | Error::InvalidReference(_)
            | Error::UnknownAttribute { .. } => ErrorCategory::Validation,
            Error::Apply { .. } => ErrorCategory::Apply,
            Error::Cycle { .. } | Error::DanglingReference { .. } | Error::DuplicateResource(_) => {
                ErrorCategory::Structural
            }
            Error::UnknownType(_) | Error::DuplicateType(_) => ErrorCategory::Registry,
        }
    }

    /// Whether this error must abort a transaction before it starts.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        self.category().is_structural()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = Error::Cycle {
            path: vec!["File[/a]".into(), "File[/b]".into(), "File[/a]".into()],
        };
        assert_eq!(
            err.to_string(),
            "found dependency cycle: File[/a] => File[/b] => File[/a]"
        );
        assert!(err.is_structural());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::validation("mode", "not a number").category(),
            ErrorCategory::Validation
        );
        assert!(!Error::UnknownType("Nope".into()).is_structural());
        assert!(
            Error::DanglingReference {
                source_ref: "File[/a]".into(),
                target: "File[/missing]".into(),
            }
            .is_structural()
        );
    }
}
