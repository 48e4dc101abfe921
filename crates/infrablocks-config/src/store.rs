//! Versioned configuration store

use crate::backend::{ConfigurationBackend, MemoryBackend};
use crate::entity::{EntityId, EntityScope};
use crate::error::{ConfigError, Result};
use crate::file::FileBackend;
use crate::value::{ConfigurationRow, ConfigurationValue, LatestValues};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Tuning for [`ConfigurationStore`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Attempts per write when another writer takes the same version
    pub max_write_attempts: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_write_attempts: 5,
        }
    }
}

/// Append-only, versioned key/value store scoped by [`EntityId`]
///
/// Writing a key never overwrites: each write adds a row with the next
/// version. Readers see the highest version of each key. Values are
/// frequently secrets and are never logged.
#[derive(Clone)]
pub struct ConfigurationStore {
    backend: Arc<dyn ConfigurationBackend>,
    write_lock: Arc<Mutex<()>>,
    options: StoreOptions,
}

impl ConfigurationStore {
    pub fn new(backend: Arc<dyn ConfigurationBackend>) -> Self {
        Self {
            backend,
            write_lock: Arc::new(Mutex::new(())),
            options: StoreOptions::default(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Store backed by a JSON table under `dir`
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self::new(Arc::new(FileBackend::new(dir)))
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &Arc<dyn ConfigurationBackend> {
        &self.backend
    }

    /// Append a new version of `name` for `entity`
    ///
    /// The first write of a key gets version 0, each later write the
    /// current maximum plus one. `None` is a no-op and returns `Ok(None)`;
    /// otherwise the new version is returned.
    pub async fn set_configuration(
        &self,
        entity: &EntityId,
        name: &str,
        value: Option<&str>,
    ) -> Result<Option<u32>> {
        let Some(value) = value else {
            debug!("No value for '{}' on {}, skipping write", name, entity);
            return Ok(None);
        };

        let _guard = self.write_lock.lock().await;
        let attempts = self.options.max_write_attempts.max(1);
        let mut attempt = 1;

        loop {
            let version = self.next_version(entity, name).await?;
            let row = ConfigurationRow::new(entity, name, value, version);

            match self.backend.insert(row).await {
                Ok(()) => {
                    debug!("Stored '{}' version {} for {}", name, version, entity);
                    return Ok(Some(version));
                }
                Err(ConfigError::VersionConflict { .. }) if attempt < attempts => {
                    warn!(
                        "Version {} of '{}' for {} was taken by another writer, retrying ({}/{})",
                        version, name, entity, attempt, attempts
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write several keys for one entity in order
    ///
    /// Stops at the first failure; keys written before it stay written.
    pub async fn set_configurations<'a, I>(
        &self,
        entity: &EntityId,
        values: I,
    ) -> Result<Vec<(String, Option<u32>)>>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut written = Vec::new();
        for (name, value) in values {
            let version = self.set_configuration(entity, name, value).await?;
            written.push((name.to_string(), version));
        }
        Ok(written)
    }

    /// Latest version of every key of every entity in `scope`
    pub async fn latest_configuration_values(&self, scope: EntityScope) -> Result<LatestValues> {
        let rows = self.backend.scope_rows(scope).await?;
        LatestValues::from_rows(scope, rows)
    }

    /// Latest version of every key of one entity
    pub async fn latest_values_for(&self, entity: &EntityId) -> Result<LatestValues> {
        Ok(self
            .latest_configuration_values(entity.scope())
            .await?
            .for_entity(entity))
    }

    /// Latest value of one key, failing with
    /// [`ConfigError::ConfigurationValueNotFound`] if it was never written
    pub async fn config_value(&self, entity: &EntityId, name: &str) -> Result<ConfigurationValue> {
        self.history(entity, name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ConfigError::ConfigurationValueNotFound {
                name: name.to_string(),
                scope: entity.to_string(),
            })
    }

    /// Every version of one key, newest first
    pub async fn history(&self, entity: &EntityId, name: &str) -> Result<Vec<ConfigurationValue>> {
        self.backend
            .rows(entity, name)
            .await?
            .into_iter()
            .map(ConfigurationValue::try_from)
            .collect()
    }

    async fn next_version(&self, entity: &EntityId, name: &str) -> Result<u32> {
        let rows = self.backend.rows(entity, name).await?;
        Ok(rows
            .iter()
            .map(|r| r.version)
            .max()
            .map_or(0, |latest| latest + 1))
    }
}

impl std::fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
