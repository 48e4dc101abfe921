//! Log-line contract of a database instance
//!
//! The instance's entrypoint reports its startup decisions on stdout. Each
//! [`RdsEvent`] maps to one line; all but the PostgreSQL readiness line carry
//! the instance prefix.

use crate::error::{RdsError, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing::{debug, trace};

pub const DEFAULT_LOG_PREFIX: &str = "[infrablocks-rds-postgresql]";

/// Startup events, in the order an instance may emit them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdsEvent {
    DataDirEmpty,
    DataDirNotEmpty,
    InitializingDatabase,
    ExecutingInitialBackup,
    RestoringFromBackup,
    ProvisioningCompleted,
    ReadyToAcceptConnections,
}

impl RdsEvent {
    pub const ALL: [RdsEvent; 7] = [
        RdsEvent::DataDirEmpty,
        RdsEvent::DataDirNotEmpty,
        RdsEvent::InitializingDatabase,
        RdsEvent::ExecutingInitialBackup,
        RdsEvent::RestoringFromBackup,
        RdsEvent::ProvisioningCompleted,
        RdsEvent::ReadyToAcceptConnections,
    ];

    /// Line text without prefix
    pub fn message(&self) -> &'static str {
        match self {
            RdsEvent::DataDirEmpty => "data dir is empty",
            RdsEvent::DataDirNotEmpty => "data dir is not empty",
            RdsEvent::InitializingDatabase => "initializing database instance",
            RdsEvent::ExecutingInitialBackup => "executing initial backup",
            RdsEvent::RestoringFromBackup => "restoring database from backup",
            RdsEvent::ProvisioningCompleted => "provisioning completed",
            RdsEvent::ReadyToAcceptConnections => "database system is ready to accept connections",
        }
    }

    /// Emitted by PostgreSQL itself rather than the entrypoint
    pub fn is_postgres(&self) -> bool {
        matches!(self, RdsEvent::ReadyToAcceptConnections)
    }

    /// Full line as emitted by an instance using `prefix`
    pub fn line(&self, prefix: &str) -> String {
        if self.is_postgres() {
            self.message().to_string()
        } else {
            format!("{} {}", prefix, self.message())
        }
    }
}

/// How an instance came up, derived from its startup events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPath {
    /// Empty data dir, no backup: a new instance was initialized and backed up
    FreshInit,
    /// Empty data dir restored from backup
    Restore,
    /// Existing data dir reused as is
    ExistingDataDir,
}

/// Collects an instance's log lines and answers contract queries on them
///
/// Clones share the same buffer, so one clone can follow the process output
/// while another waits for events.
#[derive(Clone)]
pub struct LogWatcher {
    prefix: String,
    lines: Arc<Mutex<Vec<String>>>,
    updates: Arc<watch::Sender<usize>>,
}

impl Default for LogWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LogWatcher {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_LOG_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            prefix: prefix.into(),
            lines: Arc::new(Mutex::new(Vec::new())),
            updates: Arc::new(updates),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        trace!("rds: {}", line);
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
        self.updates.send_modify(|count| *count += 1);
    }

    /// Read `reader` line by line until EOF
    pub async fn follow<R: AsyncRead + Unpin>(&self, reader: R) -> Result<()> {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            self.push(line);
        }
        debug!("rds: log stream closed");
        Ok(())
    }

    /// Whether any line so far contains `text`
    pub fn has_line(&self, text: &str) -> bool {
        self.lines
            .lock()
            .map(|lines| lines.iter().any(|l| l.contains(text)))
            .unwrap_or(false)
    }

    pub fn has_event(&self, event: RdsEvent) -> bool {
        self.has_line(&event.line(&self.prefix))
    }

    pub fn expect_event(&self, event: RdsEvent) -> Result<()> {
        if self.has_event(event) {
            Ok(())
        } else {
            Err(RdsError::MissingLogLine(event.line(&self.prefix)))
        }
    }

    pub fn expect_no_event(&self, event: RdsEvent) -> Result<()> {
        if self.has_event(event) {
            Err(RdsError::UnexpectedLogLine(event.line(&self.prefix)))
        } else {
            Ok(())
        }
    }

    /// Wait until a line containing `text` appears
    pub async fn wait_for_line(&self, text: &str, timeout: Duration) -> Result<()> {
        let mut updates = self.updates.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.has_line(text) {
                return Ok(());
            }
            match tokio::time::timeout_at(deadline, updates.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => {
                    return Err(RdsError::LogLineTimeout {
                        line: text.to_string(),
                        timeout,
                    });
                }
            }
        }
    }

    pub async fn wait_for(&self, event: RdsEvent, timeout: Duration) -> Result<()> {
        self.wait_for_line(&event.line(&self.prefix), timeout).await
    }

    /// Events seen so far, in the order of their first occurrence
    pub fn events(&self) -> Vec<RdsEvent> {
        let Ok(lines) = self.lines.lock() else {
            return Vec::new();
        };

        let mut events: Vec<(usize, RdsEvent)> = RdsEvent::ALL
            .iter()
            .filter_map(|event| {
                let line = event.line(&self.prefix);
                lines
                    .iter()
                    .position(|l| l.contains(&line))
                    .map(|i| (i, *event))
            })
            .collect();
        events.sort_by_key(|(i, _)| *i);
        events.into_iter().map(|(_, e)| e).collect()
    }

    /// Classify the startup once provisioning completed
    pub fn startup_path(&self) -> Option<StartupPath> {
        if !self.has_event(RdsEvent::ProvisioningCompleted) {
            return None;
        }
        if self.has_event(RdsEvent::DataDirNotEmpty) {
            return Some(StartupPath::ExistingDataDir);
        }
        if self.has_event(RdsEvent::RestoringFromBackup) {
            return Some(StartupPath::Restore);
        }
        if self.has_event(RdsEvent::InitializingDatabase) {
            return Some(StartupPath::FreshInit);
        }
        None
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Forget everything seen so far, e.g. before restarting the instance
    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl std::fmt::Debug for LogWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWatcher")
            .field("prefix", &self.prefix)
            .field("lines", &self.lines().len())
            .finish()
    }
}
