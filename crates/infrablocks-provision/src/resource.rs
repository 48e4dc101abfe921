//! Resource model: desired state, lookup keys and observed state
//!
//! Every resource kind is described by three types:
//!
//! - a [`Resource`] holding the desired state,
//! - a [`Lookup`] holding just enough to find the object in its backend,
//! - an [`Observed`] runtime snapshot reported by the backend.
//!
//! Kind identity is the `KIND` constant of the type. Backend modules choose
//! it once and the registry keys on it.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Observed-state snapshot of an existing backend object
pub trait Observed: Debug + Clone + Send + Sync + 'static {
    /// Backend-native identifier used for deletion (e.g. a numeric network id)
    fn native_id(&self) -> &str;

    /// Human readable name for logs and reports
    fn name(&self) -> &str {
        self.native_id()
    }
}

/// Minimal key for finding a runtime without the full desired state
pub trait Lookup: Debug + Send + Sync + 'static {
    /// Lookup kind identity
    const KIND: &'static str;

    /// Runtime type returned by lookups of this kind
    type Runtime: Observed;

    /// Natural id (e.g. network name)
    fn id(&self) -> &str;
}

/// Desired-state descriptor for one infrastructure object
pub trait Resource: Debug + Send + Sync + 'static {
    /// Resource kind identity
    const KIND: &'static str;

    /// Lookup type able to find this resource
    type Lookup: Lookup;

    /// Caller-supplied natural id
    fn id(&self) -> &str;

    /// Lookup key for this resource
    fn lookup(&self) -> Self::Lookup;

    /// Kind and id of this resource
    fn reference(&self) -> ResourceRef {
        ResourceRef::new(Self::KIND, self.id())
    }
}

/// Runtime type observed for resource `R`
pub type Runtime<R> = <<R as Resource>::Lookup as Lookup>::Runtime;

/// Identity of a resource: kind tag plus natural id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Get the full resource key (kind:id)
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind, self.id)
    }
}
