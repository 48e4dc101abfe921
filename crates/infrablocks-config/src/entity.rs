//! Owning scopes of configuration values

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The entity a configuration value belongs to
///
/// Every row is owned by exactly one cloud, environment or tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum EntityId {
    Cloud(Uuid),
    Environment(Uuid),
    Tenant(Uuid),
}

impl EntityId {
    pub fn scope(&self) -> EntityScope {
        match self {
            EntityId::Cloud(_) => EntityScope::Cloud,
            EntityId::Environment(_) => EntityScope::Environment,
            EntityId::Tenant(_) => EntityScope::Tenant,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            EntityId::Cloud(id) | EntityId::Environment(id) | EntityId::Tenant(id) => *id,
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.scope(), self.uuid())
    }
}

/// Kind of owning entity, i.e. which scope column a row uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    Cloud,
    Environment,
    Tenant,
}

impl EntityScope {
    pub fn entity(&self, id: Uuid) -> EntityId {
        match self {
            EntityScope::Cloud => EntityId::Cloud(id),
            EntityScope::Environment => EntityId::Environment(id),
            EntityScope::Tenant => EntityId::Tenant(id),
        }
    }
}

impl std::fmt::Display for EntityScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityScope::Cloud => write!(f, "cloud"),
            EntityScope::Environment => write!(f, "environment"),
            EntityScope::Tenant => write!(f, "tenant"),
        }
    }
}
