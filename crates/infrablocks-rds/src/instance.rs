//! Backup operations and startup environment of a database instance

use crate::error::{RdsError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const BACKUP_LOCAL_ENV: &str = "DB_BACKUP_LOCAL";
pub const POSTGRES_EXTRA_CONFIG_ENV: &str = "DB_POSTGRES_EXTRA_CONFIG";
pub const RESTORE_PITR_ENV: &str = "DB_RESTORE_PITR";

/// Point-in-time format understood by the restore tooling, always UTC
pub const PITR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Backup type, one script each inside the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupKind {
    Full,
    Incremental,
    Differential,
}

impl BackupKind {
    pub fn script(&self) -> &'static str {
        match self {
            BackupKind::Full => "/rds/bin/backup-full.sh",
            BackupKind::Incremental => "/rds/bin/backup-incr.sh",
            BackupKind::Differential => "/rds/bin/backup-diff.sh",
        }
    }
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupKind::Full => write!(f, "full"),
            BackupKind::Incremental => write!(f, "incremental"),
            BackupKind::Differential => write!(f, "differential"),
        }
    }
}

/// Startup inputs of an instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RdsInstanceSpec {
    /// Back up to the locally mounted backup directory
    pub backup_local: bool,
    /// Appended verbatim to `postgresql.conf`
    pub postgres_extra_config: Option<String>,
    /// Restore to this point in time when starting from an empty data dir
    pub restore_pitr: Option<DateTime<Utc>>,
}

impl RdsInstanceSpec {
    pub fn local_backup() -> Self {
        Self {
            backup_local: true,
            ..Self::default()
        }
    }

    pub fn with_extra_config(mut self, config: impl Into<String>) -> Self {
        self.postgres_extra_config = Some(config.into());
        self
    }

    pub fn with_restore_pitr(mut self, point_in_time: DateTime<Utc>) -> Self {
        self.restore_pitr = Some(point_in_time);
        self
    }

    /// Environment variables passed to the instance
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if self.backup_local {
            env.insert(BACKUP_LOCAL_ENV.to_string(), "1".to_string());
        }
        if let Some(config) = &self.postgres_extra_config {
            env.insert(POSTGRES_EXTRA_CONFIG_ENV.to_string(), config.clone());
        }
        if let Some(point_in_time) = &self.restore_pitr {
            env.insert(
                RESTORE_PITR_ENV.to_string(),
                point_in_time.format(PITR_FORMAT).to_string(),
            );
        }
        env
    }
}

/// Result of running a command inside an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A running instance that commands can be executed in
#[async_trait]
pub trait RdsProcess: Send + Sync {
    async fn exec(&self, command: &str) -> Result<ExecOutput>;
}

/// Run a backup of `kind` and fail unless the script exits with 0
pub async fn run_backup(process: &dyn RdsProcess, kind: BackupKind) -> Result<ExecOutput> {
    info!("Running {} backup", kind);
    let output = process.exec(kind.script()).await?;

    if !output.is_success() {
        warn!("{} backup exited with {}", kind, output.exit_code);
        return Err(RdsError::ExecFailed {
            script: kind.script().to_string(),
            exit_code: output.exit_code,
            output: if output.stderr.is_empty() {
                output.stdout
            } else {
                output.stderr
            },
        });
    }

    Ok(output)
}
