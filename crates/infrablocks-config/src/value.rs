//! Configuration rows and resolved values

use crate::entity::{EntityId, EntityScope};
use crate::error::{ConfigError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Persisted row of the configuration table
///
/// Exactly one of `cloud`, `environment` and `tenant` is set. Rows are never
/// modified after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRow {
    pub id: Uuid,
    pub version: u32,
    pub cloud: Option<Uuid>,
    pub environment: Option<Uuid>,
    pub tenant: Option<Uuid>,
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl ConfigurationRow {
    pub fn new(entity: &EntityId, name: &str, value: &str, version: u32) -> Self {
        let mut row = Self {
            id: Uuid::new_v4(),
            version,
            cloud: None,
            environment: None,
            tenant: None,
            name: name.to_string(),
            value: value.to_string(),
            created_at: Utc::now(),
        };
        match entity {
            EntityId::Cloud(id) => row.cloud = Some(*id),
            EntityId::Environment(id) => row.environment = Some(*id),
            EntityId::Tenant(id) => row.tenant = Some(*id),
        }
        row
    }

    /// Value of the scope column for `scope`
    pub fn column(&self, scope: EntityScope) -> Option<Uuid> {
        match scope {
            EntityScope::Cloud => self.cloud,
            EntityScope::Environment => self.environment,
            EntityScope::Tenant => self.tenant,
        }
    }

    /// Owning entity, derived from the single populated scope column
    pub fn entity(&self) -> Result<EntityId> {
        match (self.cloud, self.environment, self.tenant) {
            (Some(id), None, None) => Ok(EntityId::Cloud(id)),
            (None, Some(id), None) => Ok(EntityId::Environment(id)),
            (None, None, Some(id)) => Ok(EntityId::Tenant(id)),
            _ => Err(ConfigError::InvalidRow {
                id: self.id,
                reason: "exactly one of cloud, environment and tenant must be set".to_string(),
            }),
        }
    }

    pub fn belongs_to(&self, entity: &EntityId) -> bool {
        self.column(entity.scope()) == Some(entity.uuid())
    }
}

/// A configuration value with its owner and version
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationValue {
    pub id: Uuid,
    pub entity: EntityId,
    pub name: String,
    pub value: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

// Values are frequently secrets; keep them out of Debug output.
impl std::fmt::Debug for ConfigurationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationValue")
            .field("id", &self.id)
            .field("entity", &self.entity)
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("version", &self.version)
            .finish()
    }
}

impl TryFrom<ConfigurationRow> for ConfigurationValue {
    type Error = ConfigError;

    fn try_from(row: ConfigurationRow) -> Result<Self> {
        Ok(Self {
            entity: row.entity()?,
            id: row.id,
            name: row.name,
            value: row.value,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

/// Latest version of every key in a scope
#[derive(Debug, Clone, Default)]
pub struct LatestValues {
    scope: String,
    values: Vec<ConfigurationValue>,
}

impl LatestValues {
    /// Resolve the current values from all rows of a scope
    ///
    /// Groups rows by `(entity, name)`, picks the maximum version per group
    /// and joins back to the full row.
    pub fn from_rows(scope: EntityScope, rows: Vec<ConfigurationRow>) -> Result<Self> {
        let mut latest_versions: HashMap<(Uuid, &str), u32> = HashMap::new();
        for row in &rows {
            if let Some(owner) = row.column(scope) {
                let version = latest_versions.entry((owner, row.name.as_str())).or_insert(row.version);
                *version = (*version).max(row.version);
            }
        }

        let mut values = Vec::new();
        for row in &rows {
            let Some(owner) = row.column(scope) else {
                continue;
            };
            if latest_versions.get(&(owner, row.name.as_str())) == Some(&row.version) {
                values.push(ConfigurationValue::try_from(row.clone())?);
            }
        }

        values.sort_by(|a, b| (a.entity, &a.name).cmp(&(b.entity, &b.name)));
        values.dedup_by(|a, b| a.entity == b.entity && a.name == b.name);

        Ok(Self {
            scope: scope.to_string(),
            values,
        })
    }

    /// Only the values owned by `entity`
    pub fn for_entity(&self, entity: &EntityId) -> LatestValues {
        Self {
            scope: entity.to_string(),
            values: self
                .values
                .iter()
                .filter(|v| v.entity == *entity)
                .cloned()
                .collect(),
        }
    }

    /// The value for `name`, failing if it was never written
    ///
    /// When the set spans several entities the first match wins; narrow
    /// it with [`LatestValues::for_entity`] first.
    pub fn config_value(&self, name: &str) -> Result<&ConfigurationValue> {
        self.find(name)
            .ok_or_else(|| ConfigError::ConfigurationValueNotFound {
                name: name.to_string(),
                scope: self.scope.clone(),
            })
    }

    pub fn find(&self, name: &str) -> Option<&ConfigurationValue> {
        self.values.iter().find(|v| v.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a ConfigurationValue> + 'a {
        self.values.iter().filter(move |v| v.name.starts_with(prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_vec(self) -> Vec<ConfigurationValue> {
        self.values
    }
}
