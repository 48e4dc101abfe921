//! Vault integration for infrablocks
//!
//! - [`VaultRootClientProvider`]: initializes or reuses an environment's
//!   Vault, records the generated credentials in the configuration store and
//!   hands out a cached root client.
//! - [`PkiBackendRoleProvisioner`]: the `vault-pki-backend-role` resource
//!   kind.
//! - [`VaultApi`] / [`HttpVaultApi`]: the HTTP surface both rely on.

pub mod api;
pub mod bootstrap;
pub mod client;
pub mod error;
pub mod pki;

pub use api::{
    DEFAULT_REQUEST_TIMEOUT, HttpVaultApi, InitOptions, InitResponse, SealStatus, VaultApi,
    vault_address,
};
pub use bootstrap::{
    BootstrapState, ROOT_TOKEN_KEY, UNSEAL_KEY_PREFIX, VaultCredentials, VaultRootClientProvider,
    unseal_key_name,
};
pub use client::VaultClient;
pub use error::{Result, VaultError};
pub use pki::{
    PKI_ROLE_KIND, PkiBackendRole, PkiBackendRoleLookup, PkiBackendRoleProvisioner,
    PkiBackendRoleRuntime, parse_ttl, ttl_matches,
};
