//! PKI secrets engine roles
//!
//! Resource kind `vault-pki-backend-role`. Applying a role also makes sure
//! the mount has a CA: an internal root certificate is generated the first
//! time a role is applied to a mount without one.

use crate::bootstrap::VaultRootClientProvider;
use crate::client::VaultClient;
use crate::error::{Result as VaultResult, VaultError};
use async_trait::async_trait;
use infrablocks_provision::{
    Lookup, LookupProvider, Observed, Resource, ResourceDiffItem, ResourceProvisioner, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const PKI_ROLE_KIND: &str = "vault-pki-backend-role";

/// Parse a Vault duration such as `"1h30m"`, `"720h"`, `"90s"` or `"3600"`
/// into seconds
pub fn parse_ttl(ttl: &str) -> VaultResult<u64> {
    let ttl = ttl.trim();
    if ttl.is_empty() {
        return Err(VaultError::InvalidTtl(ttl.to_string()));
    }
    if let Ok(seconds) = ttl.parse::<u64>() {
        return Ok(seconds);
    }

    let mut total: u64 = 0;
    let mut number = String::new();
    for c in ttl.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let unit = match c {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return Err(VaultError::InvalidTtl(ttl.to_string())),
        };
        let value: u64 = number
            .parse()
            .map_err(|_| VaultError::InvalidTtl(ttl.to_string()))?;
        total = value
            .checked_mul(unit)
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(|| VaultError::InvalidTtl(ttl.to_string()))?;
        number.clear();
    }

    if !number.is_empty() {
        return Err(VaultError::InvalidTtl(ttl.to_string()));
    }
    Ok(total)
}

/// Whether two TTLs denote the same duration; unparsable values never match
pub fn ttl_matches(expected: &str, actual: &str) -> bool {
    matches!((parse_ttl(expected), parse_ttl(actual)), (Ok(e), Ok(a)) if e == a)
}

/// Desired PKI role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiBackendRole {
    /// Role name
    pub id: String,
    /// Mount path of the PKI secrets engine, e.g. `pki`
    pub mount: String,
    pub key_type: String,
    pub key_bits: u32,
    pub max_ttl: String,
    pub ttl: String,
    pub allow_localhost: bool,
    pub allowed_domains: Vec<String>,
    pub allow_subdomains: bool,
    pub generate_lease: bool,
}

impl PkiBackendRole {
    pub fn new(id: impl Into<String>, mount: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mount: mount.into(),
            key_type: "rsa".to_string(),
            key_bits: 2048,
            max_ttl: "168h".to_string(),
            ttl: "168h".to_string(),
            allow_localhost: false,
            allowed_domains: Vec::new(),
            allow_subdomains: false,
            generate_lease: false,
        }
    }

    fn body(&self) -> Value {
        serde_json::json!({
            "key_type": self.key_type,
            "key_bits": self.key_bits,
            "max_ttl": self.max_ttl,
            "ttl": self.ttl,
            "allow_localhost": self.allow_localhost,
            "allowed_domains": self.allowed_domains,
            "allow_subdomains": self.allow_subdomains,
            "generate_lease": self.generate_lease,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiBackendRoleLookup {
    pub id: String,
    pub mount: String,
}

impl PkiBackendRoleLookup {
    pub fn new(id: impl Into<String>, mount: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mount: mount.into(),
        }
    }
}

/// Role as stored in Vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiBackendRoleRuntime {
    pub id: String,
    pub mount: String,
    pub key_type: Option<String>,
    pub key_bits: Option<u64>,
    /// Seconds, as reported by Vault
    pub max_ttl: Option<String>,
    pub ttl: Option<String>,
    /// Whether the mount has a CA certificate
    pub keys_exist: bool,
}

impl PkiBackendRoleRuntime {
    fn from_data(lookup: &PkiBackendRoleLookup, data: &Value, keys_exist: bool) -> Self {
        Self {
            id: lookup.id.clone(),
            mount: lookup.mount.clone(),
            key_type: data
                .get("key_type")
                .and_then(Value::as_str)
                .map(str::to_string),
            key_bits: data.get("key_bits").and_then(Value::as_u64),
            max_ttl: data.get("max_ttl").and_then(scalar_string),
            ttl: data.get("ttl").and_then(scalar_string),
            keys_exist,
        }
    }

    fn path(&self) -> String {
        role_path(&self.mount, &self.id)
    }
}

// Vault reports TTLs as numbers of seconds; older versions as strings.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn role_path(mount: &str, id: &str) -> String {
    format!("{}/roles/{}", mount, id)
}

impl Observed for PkiBackendRoleRuntime {
    fn native_id(&self) -> &str {
        &self.id
    }
}

impl Lookup for PkiBackendRoleLookup {
    const KIND: &'static str = PKI_ROLE_KIND;
    type Runtime = PkiBackendRoleRuntime;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for PkiBackendRole {
    const KIND: &'static str = PKI_ROLE_KIND;
    type Lookup = PkiBackendRoleLookup;

    fn id(&self) -> &str {
        &self.id
    }

    fn lookup(&self) -> PkiBackendRoleLookup {
        PkiBackendRoleLookup::new(&self.id, &self.mount)
    }
}

/// Provisioner and lookup provider for [`PkiBackendRole`]
///
/// Listing for destroy-all covers the mounts given with
/// [`PkiBackendRoleProvisioner::with_mount`].
pub struct PkiBackendRoleProvisioner {
    provider: Arc<VaultRootClientProvider>,
    mounts: Vec<String>,
}

impl PkiBackendRoleProvisioner {
    pub fn new(provider: Arc<VaultRootClientProvider>) -> Self {
        Self {
            provider,
            mounts: Vec::new(),
        }
    }

    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mounts.push(mount.into());
        self
    }

    async fn keys_exist(&self, client: &VaultClient, mount: &str) -> VaultResult<bool> {
        Ok(client.get_raw(&format!("{}/ca/pem", mount)).await?.is_some())
    }

    async fn find(&self, lookup: &PkiBackendRoleLookup) -> VaultResult<Option<PkiBackendRoleRuntime>> {
        let client = self.provider.create_client().await?;

        let Some(data) = client.read(&role_path(&lookup.mount, &lookup.id)).await? else {
            return Ok(None);
        };
        let keys_exist = self.keys_exist(&client, &lookup.mount).await?;

        Ok(Some(PkiBackendRoleRuntime::from_data(lookup, &data, keys_exist)))
    }
}

#[async_trait]
impl LookupProvider<PkiBackendRoleLookup> for PkiBackendRoleProvisioner {
    async fn lookup(&self, lookup: &PkiBackendRoleLookup) -> Result<Option<PkiBackendRoleRuntime>> {
        Ok(self.find(lookup).await?)
    }
}

#[async_trait]
impl ResourceProvisioner<PkiBackendRole> for PkiBackendRoleProvisioner {
    async fn lookup(&self, lookup: &PkiBackendRoleLookup) -> Result<Option<PkiBackendRoleRuntime>> {
        Ok(self.find(lookup).await?)
    }

    fn compare(
        &self,
        resource: &PkiBackendRole,
        runtime: &PkiBackendRoleRuntime,
    ) -> Vec<ResourceDiffItem> {
        let keys = if runtime.keys_exist {
            ResourceDiffItem::matching("keys_exist", "true")
        } else {
            ResourceDiffItem::changed("keys_exist", "true", "false")
        };

        vec![
            keys,
            ResourceDiffItem::compare(
                "max_ttl",
                &resource.max_ttl,
                runtime.max_ttl.as_deref(),
                ttl_matches,
            ),
            ResourceDiffItem::compare("ttl", &resource.ttl, runtime.ttl.as_deref(), ttl_matches),
        ]
    }

    async fn apply(&self, resource: &PkiBackendRole) -> Result<()> {
        let client = self.provider.create_client().await?;

        let path = role_path(&resource.mount, &resource.id);
        client.write(&path, &resource.body()).await?;
        info!("Wrote PKI role {}", path);

        if self.keys_exist(&client, &resource.mount).await? {
            debug!("PKI mount '{}' already has a CA", resource.mount);
            return Ok(());
        }

        client
            .write(
                &format!("{}/root/generate/internal", resource.mount),
                &serde_json::json!({ "common_name": format!("{} root", resource.id) }),
            )
            .await?;
        info!("Generated root CA for PKI mount '{}'", resource.mount);
        Ok(())
    }

    async fn delete(&self, runtime: &PkiBackendRoleRuntime) -> Result<()> {
        let client = self.provider.create_client().await?;
        client.delete(&runtime.path()).await?;
        info!("Deleted PKI role {}", runtime.path());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PkiBackendRoleRuntime>> {
        let client = self.provider.create_client().await?;
        let mut roles = Vec::new();

        for mount in &self.mounts {
            for id in client.list(&format!("{}/roles", mount)).await? {
                let lookup = PkiBackendRoleLookup::new(id, mount);
                if let Some(runtime) = self.find(&lookup).await? {
                    roles.push(runtime);
                }
            }
        }

        Ok(roles)
    }
}
