//! Core types for transactions and their reports

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    /// Created, not yet evaluated
    Pending,
    /// Walking the graph
    Running,
    /// Every reachable resource was visited
    Completed,
    /// Graph preparation failed; nothing was touched
    Failed,
}

/// Result of evaluating one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Everything already in sync
    NoChange,
    /// At least one property was changed
    Changed,
    /// Out of sync, but running in no-op mode
    Noop,
    /// At least one property failed to sync
    Failed { error: String },
    /// Not attempted because a prerequisite failed or was skipped
    Skipped { reason: String },
    /// Not selected by the tag filter
    Filtered,
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed)
    }

    /// Whether dependents of this resource must be skipped
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }
}

/// Summary of transaction results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub changed: usize,
    pub noop: usize,
    pub skipped: usize,
    pub failed: usize,
    pub filtered: usize,
    pub no_change: usize,
    pub refreshed: usize,
}

impl ExecuteSummary {
    /// Total number of resources changed
    pub fn total_changes(&self) -> usize {
        self.changed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources visited
    pub fn total(&self) -> usize {
        self.changed + self.noop + self.skipped + self.failed + self.filtered + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.changed += other.changed;
        self.noop += other.noop;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.filtered += other.filtered;
        self.no_change += other.no_change;
        self.refreshed += other.refreshed;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Changed => self.changed += 1,
            ApplyResult::Noop => self.noop += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
            ApplyResult::Filtered => self.filtered += 1,
        }
    }
}

/// Something that happened to a resource during a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A property was synced
    Changed {
        resource: String,
        property: String,
        name: String,
        from: String,
        to: String,
    },
    /// A property is out of sync but no-op mode prevented the change
    Noop {
        resource: String,
        property: String,
        from: String,
        to: String,
    },
    /// A property (or a refresh) failed
    Failed {
        resource: String,
        property: Option<String>,
        message: String,
    },
    /// The resource was not attempted
    Skipped { resource: String, reason: String },
    /// The resource reacted to an upstream change
    Refreshed {
        resource: String,
        message: Option<String>,
    },
    /// A property was restored to its pre-change value
    RolledBack {
        resource: String,
        property: String,
        from: String,
        to: String,
    },
}

impl Event {
    /// Resource this event belongs to
    pub fn resource(&self) -> &str {
        match self {
            Self::Changed { resource, .. }
            | Self::Noop { resource, .. }
            | Self::Failed { resource, .. }
            | Self::Skipped { resource, .. }
            | Self::Refreshed { resource, .. }
            | Self::RolledBack { resource, .. } => resource,
        }
    }

    /// Check if this event records a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed {
                resource,
                property,
                name,
                from,
                to,
            } => write!(f, "{resource}/{property}: {name} ({from} -> {to})"),
            Self::Noop {
                resource,
                property,
                from,
                to,
            } => write!(f, "{resource}/{property}: would change {from} -> {to}"),
            Self::Failed {
                resource,
                property: Some(property),
                message,
            } => write!(f, "{resource}/{property}: {message}"),
            Self::Failed {
                resource, message, ..
            } => write!(f, "{resource}: {message}"),
            Self::Skipped { resource, reason } => write!(f, "{resource}: skipped ({reason})"),
            Self::Refreshed {
                resource,
                message: Some(message),
            } => write!(f, "{resource}: refreshed ({message})"),
            Self::Refreshed { resource, .. } => write!(f, "{resource}: refreshed"),
            Self::RolledBack {
                resource,
                property,
                from,
                to,
            } => write!(f, "{resource}/{property}: rolled back {from} -> {to}"),
        }
    }
}

/// Options for a transaction
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Compare only; record what would change
    pub noop: bool,
    /// When non-empty, only resources carrying one of these tags are applied
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Changed);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Skipped {
            reason: "dependency failed".into(),
        });
        summary.add_result(&ApplyResult::Failed {
            error: "boom".into(),
        });

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.total_changes(), 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_blocks_dependents() {
        assert!(ApplyResult::Failed { error: String::new() }.blocks_dependents());
        assert!(ApplyResult::Skipped { reason: String::new() }.blocks_dependents());
        assert!(!ApplyResult::Filtered.blocks_dependents());
        assert!(!ApplyResult::Noop.blocks_dependents());
    }

    #[test]
    fn test_event_display() {
        let changed = Event::Changed {
            resource: "File[/etc/motd]".into(),
            property: "mode".into(),
            name: "file_changed".into(),
            from: "600".into(),
            to: "644".into(),
        };
        assert_eq!(changed.to_string(), "File[/etc/motd]/mode: file_changed (600 -> 644)");

        let failed = Event::Failed {
            resource: "Exec[make]".into(),
            property: None,
            message: "exit 2".into(),
        };
        assert_eq!(failed.to_string(), "Exec[make]: exit 2");
    }
}
