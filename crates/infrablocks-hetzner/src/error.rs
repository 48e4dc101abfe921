//! Hetzner provider error types

use infrablocks_provision::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HetznerError {
    #[error("Hetzner API error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hetzner API token not configured. Set HCLOUD_TOKEN")]
    MissingToken,

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<HetznerError> for ProvisionError {
    fn from(err: HetznerError) -> Self {
        ProvisionError::Backend(format!("hetzner: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, HetznerError>;
