//! Storage backends for the configuration table

use crate::entity::{EntityId, EntityScope};
use crate::error::{ConfigError, Result};
use crate::value::ConfigurationRow;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Append-only storage of configuration rows
///
/// Backends must reject a row whose `(entity, name, version)` already
/// exists with [`ConfigError::VersionConflict`]. That uniqueness is what
/// keeps versions gap-free when several writers race.
#[async_trait]
pub trait ConfigurationBackend: Send + Sync {
    /// All versions of `name` for `entity`, highest version first
    async fn rows(&self, entity: &EntityId, name: &str) -> Result<Vec<ConfigurationRow>>;

    /// Every row whose `scope` column is set
    async fn scope_rows(&self, scope: EntityScope) -> Result<Vec<ConfigurationRow>>;

    /// Insert a new row
    async fn insert(&self, row: ConfigurationRow) -> Result<()>;
}

pub(crate) fn check_unique(
    existing: &[ConfigurationRow],
    entity: &EntityId,
    row: &ConfigurationRow,
) -> Result<()> {
    let taken = existing
        .iter()
        .any(|r| r.belongs_to(entity) && r.name == row.name && r.version == row.version);
    if taken {
        return Err(ConfigError::VersionConflict {
            entity: entity.to_string(),
            name: row.name.clone(),
            version: row.version,
        });
    }
    Ok(())
}

pub(crate) fn select_rows(
    rows: &[ConfigurationRow],
    entity: &EntityId,
    name: &str,
) -> Vec<ConfigurationRow> {
    let mut matching: Vec<ConfigurationRow> = rows
        .iter()
        .filter(|r| r.belongs_to(entity) && r.name == name)
        .cloned()
        .collect();
    matching.sort_by(|a, b| b.version.cmp(&a.version));
    matching
}

/// Process-local backend, used by tests and short-lived tools
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<Vec<ConfigurationRow>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl ConfigurationBackend for MemoryBackend {
    async fn rows(&self, entity: &EntityId, name: &str) -> Result<Vec<ConfigurationRow>> {
        Ok(select_rows(&self.rows.read().await, entity, name))
    }

    async fn scope_rows(&self, scope: EntityScope) -> Result<Vec<ConfigurationRow>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.column(scope).is_some())
            .cloned()
            .collect())
    }

    async fn insert(&self, row: ConfigurationRow) -> Result<()> {
        let entity = row.entity()?;
        let mut rows = self.rows.write().await;
        check_unique(&rows, &entity, &row)?;
        rows.push(row);
        Ok(())
    }
}
