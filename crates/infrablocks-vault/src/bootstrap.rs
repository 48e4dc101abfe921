//! Bootstrap of an environment's root Vault client
//!
//! The first [`VaultRootClientProvider::create_client`] call drives the
//! server through
//!
//! ```text
//! Uninitialized ──> Initializing ──> Sealed ──> Unsealed (handle cached)
//! ```
//!
//! Credentials produced by initialization (ordered unseal keys and the root
//! token) are written to the configuration store of the environment before
//! anything else happens, so a crash after `sys/init` never loses them.
//! Later calls return the cached handle without any remote call.

use crate::api::{InitOptions, VaultApi};
use crate::client::VaultClient;
use crate::error::{Result, VaultError};
use infrablocks_config::{ConfigurationStore, EntityId, LatestValues};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const ROOT_TOKEN_KEY: &str = "vault-root-token";
pub const UNSEAL_KEY_PREFIX: &str = "vault-unseal-key";

/// Configuration key of the `index`-th unseal key
pub fn unseal_key_name(index: usize) -> String {
    format!("{}-{}", UNSEAL_KEY_PREFIX, index)
}

fn unseal_key_index(name: &str) -> Option<usize> {
    name.strip_prefix(UNSEAL_KEY_PREFIX)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Last bootstrap step reached by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Uninitialized,
    Initializing,
    Sealed,
    Unsealed,
}

/// Root token and unseal keys of an environment's Vault
#[derive(Clone, PartialEq, Eq)]
pub struct VaultCredentials {
    pub root_token: String,
    /// Ordered by key index
    pub unseal_keys: Vec<String>,
}

impl VaultCredentials {
    /// Credentials recorded in `values`, `None` without a root token
    pub fn from_values(values: &LatestValues) -> Option<Self> {
        let root_token = values.find(ROOT_TOKEN_KEY)?.value.clone();

        let mut keys: Vec<(usize, String)> = values
            .with_prefix(UNSEAL_KEY_PREFIX)
            .filter_map(|v| unseal_key_index(&v.name).map(|i| (i, v.value.clone())))
            .collect();
        keys.sort_by_key(|(i, _)| *i);

        Some(Self {
            root_token,
            unseal_keys: keys.into_iter().map(|(_, key)| key).collect(),
        })
    }
}

impl std::fmt::Debug for VaultCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCredentials")
            .field("root_token", &"<redacted>")
            .field("unseal_keys", &format!("<{} redacted>", self.unseal_keys.len()))
            .finish()
    }
}

/// Creates the root client for one environment's Vault
///
/// The handle is built at most once per provider, even with concurrent
/// callers, and never invalidated. Rotated credentials need a new provider.
pub struct VaultRootClientProvider {
    api: Arc<dyn VaultApi>,
    store: ConfigurationStore,
    environment: EntityId,
    init_options: InitOptions,
    state: Mutex<BootstrapState>,
    client: OnceCell<VaultClient>,
}

impl VaultRootClientProvider {
    pub fn new(api: Arc<dyn VaultApi>, store: ConfigurationStore, environment: EntityId) -> Self {
        Self {
            api,
            store,
            environment,
            init_options: InitOptions::default(),
            state: Mutex::new(BootstrapState::Uninitialized),
            client: OnceCell::new(),
        }
    }

    pub fn with_init_options(mut self, init_options: InitOptions) -> Self {
        self.init_options = init_options;
        self
    }

    pub fn address(&self) -> &str {
        self.api.address()
    }

    pub fn environment(&self) -> &EntityId {
        &self.environment
    }

    pub fn state(&self) -> BootstrapState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(BootstrapState::Uninitialized)
    }

    /// Root client of the environment's Vault, bootstrapping it on first use
    ///
    /// Remote failures are returned as they are; a failed bootstrap is
    /// attempted again on the next call.
    pub async fn create_client(&self) -> Result<VaultClient> {
        self.client
            .get_or_try_init(|| self.bootstrap())
            .await
            .cloned()
    }

    async fn bootstrap(&self) -> Result<VaultClient> {
        let address = self.api.address().to_string();
        debug!("Bootstrapping vault client for {} at {}", self.environment, address);

        if !self.api.is_initialized().await? {
            let recorded = self.store.latest_values_for(&self.environment).await?;
            if recorded.with_prefix(UNSEAL_KEY_PREFIX).next().is_some() {
                warn!(
                    "Refusing to initialize vault at {}: {} already has unseal keys",
                    address, self.environment
                );
                return Err(VaultError::InconsistentState {
                    environment: self.environment.to_string(),
                    address,
                });
            }

            self.set_state(BootstrapState::Initializing);
            self.initialize(&address).await?;
        }

        let values = self.store.latest_values_for(&self.environment).await?;
        let credentials =
            VaultCredentials::from_values(&values).ok_or_else(|| VaultError::MissingCredentials {
                environment: self.environment.to_string(),
                address: address.clone(),
            })?;

        if self.api.seal_status().await?.sealed {
            self.set_state(BootstrapState::Sealed);
            self.unseal(&address, &credentials).await?;
        }

        self.set_state(BootstrapState::Unsealed);
        info!("Vault at {} is ready", address);
        Ok(VaultClient::new(self.api.clone(), credentials.root_token))
    }

    async fn initialize(&self, address: &str) -> Result<()> {
        info!(
            "Initializing vault at {} ({} shares, threshold {})",
            address, self.init_options.secret_shares, self.init_options.secret_threshold
        );
        let init = self.api.initialize(self.init_options).await?;

        let names: Vec<String> = (0..init.keys.len()).map(unseal_key_name).collect();
        // collected so no borrowing closure lives across the store's awaits
        let unseal_keys: Vec<(&str, Option<&str>)> = names
            .iter()
            .zip(&init.keys)
            .map(|(name, key)| (name.as_str(), Some(key.as_str())))
            .collect();
        self.store
            .set_configurations(&self.environment, unseal_keys)
            .await?;
        self.store
            .set_configuration(&self.environment, ROOT_TOKEN_KEY, Some(&init.root_token))
            .await?;

        info!(
            "Recorded {} unseal keys and the root token for {}",
            init.keys.len(),
            self.environment
        );
        Ok(())
    }

    async fn unseal(&self, address: &str, credentials: &VaultCredentials) -> Result<()> {
        info!("Unsealing vault at {}", address);

        for (i, key) in credentials.unseal_keys.iter().enumerate() {
            let status = self.api.unseal(key).await?;
            debug!(
                "Unseal progress {}/{} after key {}",
                status.progress, status.threshold, i
            );
            if !status.sealed {
                return Ok(());
            }
        }

        Err(VaultError::StillSealed {
            address: address.to_string(),
            keys_used: credentials.unseal_keys.len(),
        })
    }

    fn set_state(&self, state: BootstrapState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }
}
