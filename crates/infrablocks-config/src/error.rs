//! Configuration store error types

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration value '{name}' not found for {scope}")]
    ConfigurationValueNotFound { name: String, scope: String },

    #[error("Version {version} of '{name}' already exists for {entity}")]
    VersionConflict {
        entity: String,
        name: String,
        version: u32,
    },

    #[error("Invalid configuration row {id}: {reason}")]
    InvalidRow { id: Uuid, reason: String },

    #[error("Configuration table error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
