//! JSON file backend
//!
//! Keeps the configuration table in `<dir>/configuration.json`. Every write
//! rewrites the file through a temporary file and a rename, after copying
//! the previous table to `configuration.json.backup`. Writers from other
//! processes are excluded with a `lock.json` file.

use crate::backend::{ConfigurationBackend, check_unique, select_rows};
use crate::entity::{EntityId, EntityScope};
use crate::error::{ConfigError, Result};
use crate::value::ConfigurationRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const TABLE_VERSION: u32 = 1;
const TABLE_FILE: &str = "configuration.json";
const TABLE_BACKUP: &str = "configuration.json.backup";
const TABLE_TEMP: &str = "configuration.json.tmp";
const LOCK_FILE: &str = "lock.json";

const LOCK_RETRIES: u32 = 40;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);
/// Unreadable locks older than this were abandoned mid-write
const LOCK_WRITE_GRACE: Duration = Duration::from_secs(10);

/// On-disk form of the configuration table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigurationTable {
    version: u32,
    updated_at: DateTime<Utc>,
    rows: Vec<ConfigurationRow>,
}

impl Default for ConfigurationTable {
    fn default() -> Self {
        Self {
            version: TABLE_VERSION,
            updated_at: Utc::now(),
            rows: Vec::new(),
        }
    }
}

/// Configuration backend persisted as a JSON file
pub struct FileBackend {
    dir: PathBuf,
    // serializes writers inside this process; lock.json covers the others
    write_guard: Mutex<()>,
}

impl FileBackend {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self) -> PathBuf {
        self.dir.join(TABLE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.join(TABLE_BACKUP)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(TABLE_TEMP)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !fs::try_exists(&self.dir).await? {
            fs::create_dir_all(&self.dir).await?;
            tracing::debug!("Created configuration directory: {}", self.dir.display());
        }
        Ok(())
    }

    async fn load(&self) -> Result<ConfigurationTable> {
        let path = self.table_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Configuration table not found, starting empty");
                return Ok(ConfigurationTable::default());
            }
            Err(e) => return Err(e.into()),
        };

        let table: ConfigurationTable = serde_json::from_str(&content)?;
        if table.version > TABLE_VERSION {
            return Err(ConfigError::StateError(format!(
                "Configuration table version {} is newer than supported version {}",
                table.version, TABLE_VERSION
            )));
        }

        Ok(table)
    }

    async fn save(&self, table: &ConfigurationTable) -> Result<()> {
        let path = self.table_path();
        if fs::try_exists(&path).await? {
            fs::copy(&path, self.backup_path()).await?;
        }

        let temp = self.temp_path();
        let content = serde_json::to_vec_pretty(table)?;
        let mut file = fs::File::create(&temp).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved configuration table with {} rows", table.rows.len());
        Ok(())
    }

    async fn acquire_lock(&self) -> Result<TableLock> {
        let lock_path = self.lock_path();

        for _ in 0..LOCK_RETRIES {
            let created = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await;

            match created {
                Ok(mut file) => {
                    let info = LockInfo {
                        holder: lock_holder(),
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    file.write_all(&serde_json::to_vec_pretty(&info)?).await?;
                    return Ok(TableLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.remove_if_stale(&lock_path).await? {
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let holder = match fs::read_to_string(&lock_path).await {
            Ok(content) => serde_json::from_str::<LockInfo>(&content)
                .map(|info| format!("{} since {}", info.holder, info.acquired_at))
                .unwrap_or_else(|_| "an unknown holder".to_string()),
            Err(_) => "an unknown holder".to_string(),
        };
        Err(ConfigError::LockError(format!(
            "Configuration table is locked by {}",
            holder
        )))
    }

    // Locks older than an hour are left over from a crashed writer.
    async fn remove_if_stale(&self, lock_path: &Path) -> Result<bool> {
        let content = match fs::read_to_string(lock_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<LockInfo>(&content) {
            Ok(info) => {
                let age = Utc::now().signed_duration_since(info.acquired_at);
                if age.num_hours() < 1 {
                    return Ok(false);
                }
                tracing::warn!("Removing stale configuration lock from {}", info.holder);
            }
            Err(e) => {
                // a writer may still be filling in the file
                let modified = match fs::metadata(lock_path).await {
                    Ok(metadata) => metadata.modified()?,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
                    Err(e) => return Err(e.into()),
                };
                let age = modified.elapsed().unwrap_or_default();
                if age < LOCK_WRITE_GRACE {
                    return Ok(false);
                }
                tracing::warn!(
                    "Removing unreadable configuration lock, last written {}s ago: {}",
                    age.as_secs(),
                    e
                );
            }
        }

        match fs::remove_file(lock_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ConfigurationBackend for FileBackend {
    async fn rows(&self, entity: &EntityId, name: &str) -> Result<Vec<ConfigurationRow>> {
        let table = self.load().await?;
        Ok(select_rows(&table.rows, entity, name))
    }

    async fn scope_rows(&self, scope: EntityScope) -> Result<Vec<ConfigurationRow>> {
        let table = self.load().await?;
        Ok(table
            .rows
            .into_iter()
            .filter(|r| r.column(scope).is_some())
            .collect())
    }

    async fn insert(&self, row: ConfigurationRow) -> Result<()> {
        let entity = row.entity()?;
        let _guard = self.write_guard.lock().await;
        self.ensure_dir().await?;
        let lock = self.acquire_lock().await?;

        let outcome = async {
            let mut table = self.load().await?;
            check_unique(&table.rows, &entity, &row)?;
            table.rows.push(row);
            table.updated_at = Utc::now();
            self.save(&table).await
        }
        .await;

        lock.release().await?;
        outcome
    }
}

fn lock_holder() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Removes the lock file when released or dropped
struct TableLock {
    lock_path: PathBuf,
    released: bool,
}

impl TableLock {
    async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
