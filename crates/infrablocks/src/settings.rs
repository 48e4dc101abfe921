//! Settings file discovery and loading

use anyhow::{Context, Result, bail};
use infrablocks_hetzner::HetznerConfig;
use infrablocks_provision::CallPolicy;
use infrablocks_vault::{DEFAULT_REQUEST_TIMEOUT, InitOptions, vault_address};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Direct path to a settings file, checked before any other location
pub const CONFIG_PATH_ENV: &str = "INFRABLOCKS_CONFIG_PATH";

const CANDIDATES: [&str; 4] = [
    "infrablocks.local.yaml",
    ".infrablocks.local.yaml",
    "infrablocks.yaml",
    ".infrablocks.yaml",
];

const PROJECT_DIR: &str = ".infrablocks";

/// Find the settings file
///
/// Search order:
/// 1. `INFRABLOCKS_CONFIG_PATH` (direct path)
/// 2. Working directory: infrablocks.local.yaml, .infrablocks.local.yaml,
///    infrablocks.yaml, .infrablocks.yaml
/// 3. `./.infrablocks/` with the same names
/// 4. `~/.config/infrablocks/infrablocks.yaml`
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!(
            "{} points to {}, which does not exist",
            CONFIG_PATH_ENV,
            path.display()
        );
    }

    let current_dir = std::env::current_dir().context("Failed to read working directory")?;

    if let Some(path) = first_existing(&current_dir) {
        return Ok(Some(path));
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = first_existing(&project_dir)
    {
        return Ok(Some(path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("infrablocks").join("infrablocks.yaml");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// An environment infrastructure is provisioned into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub name: String,
    /// Owner of the environment's configuration values
    pub id: Uuid,
    /// Overrides the top-level `root_domain`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// Fixed server address instead of `https://vault.<env>.<root_domain>:8200`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub secret_shares: u8,
    pub secret_threshold: u8,
    /// Mounts whose roles are managed
    pub pki_mounts: Vec<String>,
}

impl Default for VaultSettings {
    fn default() -> Self {
        let init = InitOptions::default();
        Self {
            address: None,
            secret_shares: init.secret_shares,
            secret_threshold: init.secret_threshold,
            pki_mounts: vec!["pki".to_string()],
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HetznerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Falls back to `HCLOUD_TOKEN`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl HetznerSettings {
    pub fn api_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("HCLOUD_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for HetznerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerSettings")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Contents of an `infrablocks.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory of the configuration store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Upper bound for a single backend call, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_domain: Option<String>,
    pub environments: Vec<EnvironmentSettings>,
    pub vault: VaultSettings,
    pub hetzner: HetznerSettings,
}

impl Settings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings =
            serde_yaml::from_str(content).context("Failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Load the discovered settings file, or defaults when there is none
    pub fn discover() -> Result<Self> {
        match find_settings_file()? {
            Some(path) => {
                tracing::debug!("Loading settings from {}", path.display());
                Self::load(&path)
            }
            None => {
                tracing::debug!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let init = self.init_options();
        if init.secret_threshold == 0 || init.secret_threshold > init.secret_shares {
            bail!(
                "vault.secret_threshold must be between 1 and secret_shares ({}), got {}",
                init.secret_shares,
                init.secret_threshold
            );
        }

        let mut names: Vec<&str> = self.environments.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            bail!("Environment '{}' is defined more than once", pair[0]);
        }

        Ok(())
    }

    /// Configured state directory, `<data dir>/infrablocks` otherwise
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("infrablocks"))
            .context("No data directory available, set state_dir in the settings file")
    }

    pub fn call_policy(&self) -> CallPolicy {
        match self.call_timeout_secs {
            Some(secs) => CallPolicy::with_timeout(Duration::from_secs(secs)),
            None => CallPolicy::default(),
        }
    }

    /// Timeout of a single HTTP request to a backend
    pub fn request_timeout(&self) -> Duration {
        self.call_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            secret_shares: self.vault.secret_shares,
            secret_threshold: self.vault.secret_threshold,
        }
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentSettings> {
        self.environments
            .iter()
            .find(|e| e.name == name)
            .with_context(|| format!("Environment '{}' is not defined", name))
    }

    pub fn vault_address(&self, environment: &EnvironmentSettings) -> Result<String> {
        if let Some(address) = &self.vault.address {
            return Ok(address.clone());
        }
        let root_domain = environment
            .root_domain
            .as_deref()
            .or(self.root_domain.as_deref())
            .with_context(|| {
                format!(
                    "No root_domain for environment '{}' and no vault.address set",
                    environment.name
                )
            })?;
        Ok(vault_address(&environment.name, root_domain))
    }

    /// Hetzner client settings, `None` without an API token
    pub fn hetzner_config(&self) -> Option<HetznerConfig> {
        let token = self.hetzner.api_token()?;
        let config = HetznerConfig::new(token);
        Some(match &self.hetzner.endpoint {
            Some(endpoint) => config.with_endpoint(endpoint.clone()),
            None => config,
        })
    }
}
