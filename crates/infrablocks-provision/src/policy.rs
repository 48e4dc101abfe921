//! Per-call policy applied by the engine around backend calls

use crate::error::{ProvisionError, Result};
use std::future::Future;
use std::time::Duration;

/// Call policy for backend operations
///
/// The engine never retries. A timeout turns a hanging backend call into
/// [`ProvisionError::Timeout`]; without one the transport default applies.
#[derive(Debug, Clone, Default)]
pub struct CallPolicy {
    /// Upper bound for a single backend call
    pub timeout: Option<Duration>,
}

impl CallPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub(crate) async fn run<T, F>(&self, operation: &'static str, target: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            None => call.await,
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| ProvisionError::Timeout {
                    operation,
                    target: target.to_string(),
                    timeout,
                })?,
        }
    }
}
