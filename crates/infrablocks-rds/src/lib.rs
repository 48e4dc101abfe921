//! Backup/restore contract of infrablocks PostgreSQL instances
//!
//! The backup and restore tooling runs inside the database instance and is
//! opaque to infrablocks. What is fixed is its contract:
//!
//! - startup decisions are reported as log lines ([`RdsEvent`]);
//! - backups are run by executing one script per [`BackupKind`];
//! - restore inputs are passed as environment variables ([`RdsInstanceSpec`]).
//!
//! [`LogWatcher`] and [`RdsProcess`] let tests and tools drive a real
//! container or a stand-in through the same contract.

pub mod error;
pub mod instance;
pub mod log;

pub use error::{RdsError, Result};
pub use instance::{
    BACKUP_LOCAL_ENV, BackupKind, ExecOutput, PITR_FORMAT, POSTGRES_EXTRA_CONFIG_ENV,
    RESTORE_PITR_ENV, RdsInstanceSpec, RdsProcess, run_backup,
};
pub use log::{DEFAULT_LOG_PREFIX, LogWatcher, RdsEvent, StartupPath};
