//! Field-level comparison between desired and observed state

use crate::resource::ResourceRef;
use serde::{Deserialize, Serialize};

/// Result of comparing a resource with its observed runtime
///
/// `missing` means the backend has no such object. Otherwise `changes` lists
/// the fields that need a write; an empty list means the resource is in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub resource: ResourceRef,
    pub missing: bool,
    pub changes: Vec<ResourceDiffItem>,
}

impl ResourceDiff {
    /// Diff for a resource that does not exist yet
    pub fn missing(resource: ResourceRef) -> Self {
        Self {
            resource,
            missing: true,
            changes: Vec::new(),
        }
    }

    /// Diff for an existing resource. Items that match are dropped.
    pub fn new(resource: ResourceRef, items: impl IntoIterator<Item = ResourceDiffItem>) -> Self {
        Self {
            resource,
            missing: false,
            changes: items.into_iter().filter(|i| i.requires_write()).collect(),
        }
    }

    /// Whether an existing resource drifted from its desired state
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Whether applying the resource would write anything
    pub fn needs_apply(&self) -> bool {
        self.missing || self.has_changes()
    }

    pub fn change(&self, name: &str) -> Option<&ResourceDiffItem> {
        self.changes.iter().find(|c| c.name == name)
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.missing {
            return write!(f, "{} is missing", self.resource);
        }
        if self.changes.is_empty() {
            return write!(f, "{} is up to date", self.resource);
        }
        let fields: Vec<String> = self.changes.iter().map(|c| c.to_string()).collect();
        write!(f, "{} changed: {}", self.resource, fields.join(", "))
    }
}

/// Comparison result for a single field
///
/// At most one of `changed` and `missing` is set. Neither set means the field
/// matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiffItem {
    pub name: String,
    pub changed: bool,
    pub missing: bool,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
}

impl ResourceDiffItem {
    pub fn matching(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            changed: false,
            missing: false,
            expected_value: Some(value.clone()),
            actual_value: Some(value),
        }
    }

    pub fn changed(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            changed: true,
            missing: false,
            expected_value: Some(expected.into()),
            actual_value: Some(actual.into()),
        }
    }

    /// The backend reports no value for this field
    pub fn missing(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changed: false,
            missing: true,
            expected_value: Some(expected.into()),
            actual_value: None,
        }
    }

    /// Compare an expected value against an optional actual value using
    /// `equals`, which lets backends compare values in their own notation.
    pub fn compare<F>(name: &str, expected: &str, actual: Option<&str>, equals: F) -> Self
    where
        F: Fn(&str, &str) -> bool,
    {
        match actual {
            None => Self::missing(name, expected),
            Some(actual) if equals(expected, actual) => Self {
                name: name.to_string(),
                changed: false,
                missing: false,
                expected_value: Some(expected.to_string()),
                actual_value: Some(actual.to_string()),
            },
            Some(actual) => Self::changed(name, expected, actual),
        }
    }

    /// Plain string comparison
    pub fn compare_eq(name: &str, expected: &str, actual: Option<&str>) -> Self {
        Self::compare(name, expected, actual, |e, a| e == a)
    }

    pub fn requires_write(&self) -> bool {
        self.changed || self.missing
    }
}

impl std::fmt::Display for ResourceDiffItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let expected = self.expected_value.as_deref().unwrap_or("<none>");
        let actual = self.actual_value.as_deref().unwrap_or("<none>");
        if self.missing {
            write!(f, "{} (missing, expected {})", self.name, expected)
        } else {
            write!(f, "{} ({} -> {})", self.name, actual, expected)
        }
    }
}
