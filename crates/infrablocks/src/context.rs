//! Wiring of store, backends and engine for one environment

use crate::settings::{EnvironmentSettings, Settings};
use anyhow::{Context, Result};
use infrablocks_config::{ConfigurationStore, EntityId};
use infrablocks_hetzner::{HetznerNetworkApi, NetworkApi};
use infrablocks_provision::{Provisioner, ProvisionerRegistry};
use infrablocks_vault::{
    HttpVaultApi, PkiBackendRole, PkiBackendRoleProvisioner, VaultApi, VaultClient,
    VaultRootClientProvider,
};
use std::sync::Arc;

/// Remote APIs the context talks to
pub struct Backends {
    pub vault: Arc<dyn VaultApi>,
    /// `None` leaves the `hetzner-network` kind unregistered
    pub networks: Option<Arc<dyn NetworkApi>>,
}

impl Backends {
    /// HTTP clients as configured in `settings`
    pub fn from_settings(settings: &Settings, environment: &EnvironmentSettings) -> Result<Self> {
        let timeout = settings.request_timeout();
        let vault: Arc<dyn VaultApi> = Arc::new(
            HttpVaultApi::with_timeout(settings.vault_address(environment)?, timeout)
                .context("Failed to create the Vault HTTP client")?,
        );

        let networks: Option<Arc<dyn NetworkApi>> = match settings.hetzner_config() {
            Some(config) => Some(Arc::new(
                HetznerNetworkApi::new(config.with_timeout(timeout))
                    .context("Failed to create the Hetzner HTTP client")?,
            )),
            None => {
                tracing::debug!("No Hetzner API token, hetzner-network is unavailable");
                None
            }
        };
        Ok(Self { vault, networks })
    }
}

/// Everything needed to provision one environment
pub struct ApplicationContext {
    settings: Settings,
    environment: EnvironmentSettings,
    store: ConfigurationStore,
    vault: Arc<VaultRootClientProvider>,
    provisioner: Provisioner,
}

impl ApplicationContext {
    /// Open the state directory and connect to the environment's backends
    pub fn new(settings: Settings, environment: &str) -> Result<Self> {
        let env = settings.environment(environment)?.clone();
        let state_dir = settings.state_dir()?;
        std::fs::create_dir_all(&state_dir).with_context(|| {
            format!("Failed to create state directory {}", state_dir.display())
        })?;
        let store = ConfigurationStore::open(&state_dir);
        let backends = Backends::from_settings(&settings, &env)
            .with_context(|| format!("Failed to configure backends of '{}'", env.name))?;

        Self::with_backends(settings, environment, store, backends)
    }

    pub fn with_backends(
        settings: Settings,
        environment: &str,
        store: ConfigurationStore,
        backends: Backends,
    ) -> Result<Self> {
        let environment = settings.environment(environment)?.clone();
        let entity = EntityId::Environment(environment.id);

        let vault = Arc::new(
            VaultRootClientProvider::new(backends.vault, store.clone(), entity)
                .with_init_options(settings.init_options()),
        );

        let mut registry = ProvisionerRegistry::new();
        let pki = settings
            .vault
            .pki_mounts
            .iter()
            .fold(PkiBackendRoleProvisioner::new(vault.clone()), |pki, mount| {
                pki.with_mount(mount.clone())
            });
        registry
            .register::<PkiBackendRole, _>(Arc::new(pki))
            .context("Failed to register the Vault PKI provisioner")?;
        if let Some(networks) = backends.networks {
            infrablocks_hetzner::register(&mut registry, networks)
                .context("Failed to register the Hetzner network provisioner")?;
        }

        tracing::info!(
            "Environment '{}' ready with kinds: {}",
            environment.name,
            registry.kinds().join(", ")
        );

        let provisioner = Provisioner::new(Arc::new(registry)).with_policy(settings.call_policy());

        Ok(Self {
            settings,
            environment,
            store,
            vault,
            provisioner,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn environment(&self) -> &EnvironmentSettings {
        &self.environment
    }

    /// Owner of this environment's configuration values
    pub fn entity(&self) -> EntityId {
        EntityId::Environment(self.environment.id)
    }

    pub fn store(&self) -> &ConfigurationStore {
        &self.store
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn vault(&self) -> &Arc<VaultRootClientProvider> {
        &self.vault
    }

    /// Root client of the environment's Vault, bootstrapping it if needed
    pub async fn vault_client(&self) -> Result<VaultClient> {
        self.vault.create_client().await.with_context(|| {
            format!(
                "Failed to obtain a Vault client for environment '{}' at {}",
                self.environment.name,
                self.vault.address()
            )
        })
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("environment", &self.environment.name)
            .field("vault", &self.vault.address())
            .field("kinds", &self.provisioner.registry().kinds())
            .finish()
    }
}
