//! Provisioning error types

use std::time::Duration;
use thiserror::Error;

/// Provisioning errors
///
/// Absence of a remote resource is never an error: lookups return
/// `Ok(None)` and destroying a missing resource returns `Ok(false)`.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Duplicate registration: {namespace} for kind '{kind}' is already registered")]
    DuplicateRegistration { namespace: &'static str, kind: String },

    #[error("Unknown resource kind: no provisioner registered for '{0}'")]
    UnknownResourceKind(String),

    #[error("Unknown lookup kind: no lookup provider registered for '{0}'")]
    UnknownLookupKind(String),

    #[error("Kind '{kind}' is registered for a different type than {expected}")]
    KindMismatch { kind: String, expected: &'static str },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Timeout: {operation} of {target} did not finish within {timeout:?}")]
    Timeout {
        operation: &'static str,
        target: String,
        timeout: Duration,
    },
}

impl ProvisionError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Whether the error comes from setting up the registry rather than from
    /// talking to a backend.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRegistration { .. }
                | Self::UnknownResourceKind(_)
                | Self::UnknownLookupKind(_)
                | Self::KindMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
