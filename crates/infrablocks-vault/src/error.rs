//! Vault error types

use infrablocks_config::ConfigError;
use infrablocks_provision::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    /// Unseal keys are recorded but the remote store reports uninitialized.
    /// Re-initializing would orphan the recorded keys, so nothing is done.
    #[error("{environment} has unseal keys recorded, but vault at {address} is not initialized")]
    InconsistentState {
        environment: String,
        address: String,
    },

    #[error("vault at {address} is initialized, but no root token is recorded for {environment}")]
    MissingCredentials {
        environment: String,
        address: String,
    },

    #[error("vault at {address} is still sealed after applying {keys_used} unseal keys")]
    StillSealed { address: String, keys_used: usize },

    #[error("Vault API error ({status}) on {path}: {message}")]
    Api {
        status: u16,
        path: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration store error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid TTL '{0}'")]
    InvalidTtl(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<VaultError> for ProvisionError {
    fn from(err: VaultError) -> Self {
        ProvisionError::Backend(format!("vault: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
