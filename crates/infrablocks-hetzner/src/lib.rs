//! Hetzner Cloud provider for infrablocks
//!
//! Provides the `hetzner-network` resource kind: a provisioner and lookup
//! provider for private networks, backed by the Hetzner Cloud HTTP API.

pub mod api;
pub mod error;
pub mod network;

pub use api::{ApiNetwork, HETZNER_API_BASE, HetznerConfig, HetznerNetworkApi, NetworkApi};
pub use error::{HetznerError, Result};
pub use network::{NETWORK_KIND, Network, NetworkLookup, NetworkProvisioner, NetworkRuntime};

use infrablocks_provision::ProvisionerRegistry;
use std::sync::Arc;

/// Register the Hetzner network provisioner and lookup provider
pub fn register(
    registry: &mut ProvisionerRegistry,
    api: Arc<dyn NetworkApi>,
) -> infrablocks_provision::Result<()> {
    registry.register::<Network, _>(Arc::new(NetworkProvisioner::new(api)))
}
