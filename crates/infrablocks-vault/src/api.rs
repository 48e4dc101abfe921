//! Vault HTTP API
//!
//! Covers the `sys/` endpoints needed to initialize and unseal a server and
//! token-authenticated access to logical paths.

use crate::error::{Result, VaultError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const VAULT_PORT: u16 = 8200;

/// Upper bound for one HTTP request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Address of the Vault server of an environment
pub fn vault_address(environment: &str, root_domain: &str) -> String {
    format!("https://vault.{}.{}:{}", environment, root_domain, VAULT_PORT)
}

/// Parameters for `sys/init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitOptions {
    pub secret_shares: u8,
    pub secret_threshold: u8,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            secret_shares: 5,
            secret_threshold: 3,
        }
    }
}

/// Result of initializing a Vault server
#[derive(Clone, Deserialize)]
pub struct InitResponse {
    /// Unseal keys, in the order Vault returned them
    pub keys: Vec<String>,
    pub root_token: String,
}

impl std::fmt::Debug for InitResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitResponse")
            .field("keys", &format!("<{} redacted>", self.keys.len()))
            .field("root_token", &"<redacted>")
            .finish()
    }
}

/// `sys/seal-status` response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SealStatus {
    pub sealed: bool,
    /// Threshold
    #[serde(rename = "t", default)]
    pub threshold: u32,
    /// Number of shares
    #[serde(rename = "n", default)]
    pub shares: u32,
    #[serde(default)]
    pub progress: u32,
}

/// Operations on one Vault server
#[async_trait]
pub trait VaultApi: Send + Sync {
    fn address(&self) -> &str;

    async fn is_initialized(&self) -> Result<bool>;

    async fn initialize(&self, options: InitOptions) -> Result<InitResponse>;

    async fn seal_status(&self) -> Result<SealStatus>;

    /// Submit one unseal key
    async fn unseal(&self, key: &str) -> Result<SealStatus>;

    /// `data` of a logical path, `None` if nothing is stored there
    async fn read(&self, token: &str, path: &str) -> Result<Option<Value>>;

    async fn write(&self, token: &str, path: &str, body: &Value) -> Result<Option<Value>>;

    /// Keys below a path, empty if the path does not exist
    async fn list(&self, token: &str, path: &str) -> Result<Vec<String>>;

    async fn delete(&self, token: &str, path: &str) -> Result<()>;

    /// Raw response body of a path that does not return JSON (e.g. `pki/ca/pem`)
    async fn get_raw(&self, token: &str, path: &str) -> Result<Option<String>>;
}

/// reqwest-backed [`VaultApi`]
pub struct HttpVaultApi {
    client: reqwest::Client,
    address: String,
}

impl HttpVaultApi {
    pub fn new(address: impl Into<String>) -> Result<Self> {
        Self::with_timeout(address, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            address: address.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    async fn sys<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, path, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    // Vault answers 404 for paths with nothing stored and 204 for writes
    // without a response body.
    async fn logical(&self, request: reqwest::RequestBuilder, path: &str) -> Result<Option<Value>> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, path, &body));
        }
        if body.trim().is_empty() {
            return Ok(None);
        }

        let mut value: Value = serde_json::from_str(&body)?;
        Ok(value.get_mut("data").map(Value::take))
    }
}

#[async_trait]
impl VaultApi for HttpVaultApi {
    fn address(&self) -> &str {
        &self.address
    }

    async fn is_initialized(&self) -> Result<bool> {
        #[derive(Deserialize)]
        struct InitStatus {
            initialized: bool,
        }

        let status: InitStatus = self
            .sys(self.client.get(self.url("sys/init")), "sys/init")
            .await?;
        Ok(status.initialized)
    }

    async fn initialize(&self, options: InitOptions) -> Result<InitResponse> {
        self.sys(
            self.client.put(self.url("sys/init")).json(&options),
            "sys/init",
        )
        .await
    }

    async fn seal_status(&self) -> Result<SealStatus> {
        self.sys(self.client.get(self.url("sys/seal-status")), "sys/seal-status")
            .await
    }

    async fn unseal(&self, key: &str) -> Result<SealStatus> {
        self.sys(
            self.client
                .put(self.url("sys/unseal"))
                .json(&serde_json::json!({ "key": key })),
            "sys/unseal",
        )
        .await
    }

    async fn read(&self, token: &str, path: &str) -> Result<Option<Value>> {
        self.logical(
            self.client.get(self.url(path)).header(TOKEN_HEADER, token),
            path,
        )
        .await
    }

    async fn write(&self, token: &str, path: &str, body: &Value) -> Result<Option<Value>> {
        self.logical(
            self.client
                .post(self.url(path))
                .header(TOKEN_HEADER, token)
                .json(body),
            path,
        )
        .await
    }

    async fn list(&self, token: &str, path: &str) -> Result<Vec<String>> {
        let data = self
            .logical(
                self.client
                    .get(self.url(path))
                    .query(&[("list", "true")])
                    .header(TOKEN_HEADER, token),
                path,
            )
            .await?;

        Ok(list_keys(data))
    }

    async fn delete(&self, token: &str, path: &str) -> Result<()> {
        self.logical(
            self.client.delete(self.url(path)).header(TOKEN_HEADER, token),
            path,
        )
        .await?;
        Ok(())
    }

    async fn get_raw(&self, token: &str, path: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.url(path))
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, path, &body));
        }
        Ok(Some(body).filter(|b| !b.trim().is_empty()))
    }
}

const TOKEN_HEADER: &str = "X-Vault-Token";

pub(crate) fn list_keys(data: Option<Value>) -> Vec<String> {
    data.as_ref()
        .and_then(|d| d.get("keys"))
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn api_error(status: StatusCode, path: &str, body: &str) -> VaultError {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        errors: Vec<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .filter(|b| !b.errors.is_empty())
        .map(|b| b.errors.join("; "))
        .unwrap_or_else(|| body.chars().take(200).collect());

    VaultError::Api {
        status: status.as_u16(),
        path: path.to_string(),
        message,
    }
}
