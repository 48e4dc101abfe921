//! Token-authenticated Vault client handle

use crate::api::VaultApi;
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

struct ClientInner {
    api: Arc<dyn VaultApi>,
    token: String,
}

/// Authenticated handle to an unsealed Vault server
///
/// Cheap to clone; clones share the same underlying handle.
#[derive(Clone)]
pub struct VaultClient {
    inner: Arc<ClientInner>,
}

impl VaultClient {
    pub fn new(api: Arc<dyn VaultApi>, token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                api,
                token: token.into(),
            }),
        }
    }

    pub fn address(&self) -> &str {
        self.inner.api.address()
    }

    /// Whether both values are clones of one handle
    pub fn same_handle(&self, other: &VaultClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn read(&self, path: &str) -> Result<Option<Value>> {
        self.inner.api.read(&self.inner.token, path).await
    }

    pub async fn write(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        self.inner.api.write(&self.inner.token, path, body).await
    }

    pub async fn list(&self, path: &str) -> Result<Vec<String>> {
        self.inner.api.list(&self.inner.token, path).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.inner.api.delete(&self.inner.token, path).await
    }

    pub async fn get_raw(&self, path: &str) -> Result<Option<String>> {
        self.inner.api.get_raw(&self.inner.token, path).await
    }
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("address", &self.address())
            .field("token", &"<redacted>")
            .finish()
    }
}
