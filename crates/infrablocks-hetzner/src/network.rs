//! Hetzner network resource and its provisioner

use crate::api::{ApiNetwork, NetworkApi};
use async_trait::async_trait;
use infrablocks_provision::{
    Lookup, LookupProvider, Observed, ProvisionError, Resource, ResourceDiffItem,
    ResourceProvisioner, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const NETWORK_KIND: &str = "hetzner-network";

/// Desired private network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network name, unique within the project
    pub id: String,
    /// CIDR range, e.g. `10.0.0.0/16`
    pub ip_range: String,
}

impl Network {
    pub fn new(id: impl Into<String>, ip_range: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip_range: ip_range.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLookup {
    pub id: String,
}

impl NetworkLookup {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Network as it exists in Hetzner Cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRuntime {
    /// Hetzner's numeric id, as a string
    pub id: String,
    pub name: String,
    pub ip_range: String,
}

impl NetworkRuntime {
    fn numeric_id(&self) -> Result<u64> {
        self.id
            .parse()
            .map_err(|_| ProvisionError::backend(format!("invalid Hetzner network id '{}'", self.id)))
    }
}

impl From<ApiNetwork> for NetworkRuntime {
    fn from(network: ApiNetwork) -> Self {
        Self {
            id: network.id.to_string(),
            name: network.name,
            ip_range: network.ip_range,
        }
    }
}

impl Observed for NetworkRuntime {
    fn native_id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Lookup for NetworkLookup {
    const KIND: &'static str = NETWORK_KIND;
    type Runtime = NetworkRuntime;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for Network {
    const KIND: &'static str = NETWORK_KIND;
    type Lookup = NetworkLookup;

    fn id(&self) -> &str {
        &self.id
    }

    fn lookup(&self) -> NetworkLookup {
        NetworkLookup::new(&self.id)
    }
}

/// Provisioner and lookup provider for [`Network`]
pub struct NetworkProvisioner {
    api: Arc<dyn NetworkApi>,
}

impl NetworkProvisioner {
    pub fn new(api: Arc<dyn NetworkApi>) -> Self {
        Self { api }
    }

    async fn find(&self, name: &str) -> Result<Option<NetworkRuntime>> {
        let networks = self.api.networks_by_name(name).await?;
        Ok(networks
            .into_iter()
            .find(|n| n.name == name)
            .map(NetworkRuntime::from))
    }
}

#[async_trait]
impl LookupProvider<NetworkLookup> for NetworkProvisioner {
    async fn lookup(&self, lookup: &NetworkLookup) -> Result<Option<NetworkRuntime>> {
        self.find(&lookup.id).await
    }
}

#[async_trait]
impl ResourceProvisioner<Network> for NetworkProvisioner {
    async fn lookup(&self, lookup: &NetworkLookup) -> Result<Option<NetworkRuntime>> {
        self.find(&lookup.id).await
    }

    fn compare(&self, resource: &Network, runtime: &NetworkRuntime) -> Vec<ResourceDiffItem> {
        vec![ResourceDiffItem::compare_eq(
            "ip_range",
            &resource.ip_range,
            Some(&runtime.ip_range),
        )]
    }

    // The range of an existing network cannot be changed in place; drift is
    // left to diff to report.
    async fn apply(&self, resource: &Network) -> Result<()> {
        if let Some(existing) = self.find(&resource.id).await? {
            debug!(
                "Network '{}' already exists with id {}",
                existing.name, existing.id
            );
            return Ok(());
        }

        let created = self
            .api
            .create_network(&resource.id, &resource.ip_range)
            .await?;
        info!(
            "Created network '{}' ({}) with id {}",
            created.name, created.ip_range, created.id
        );
        Ok(())
    }

    async fn delete(&self, runtime: &NetworkRuntime) -> Result<()> {
        self.api.delete_network(runtime.numeric_id()?).await?;
        info!("Deleted network '{}' (id {})", runtime.name, runtime.id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<NetworkRuntime>> {
        Ok(self
            .api
            .networks()
            .await?
            .into_iter()
            .map(NetworkRuntime::from)
            .collect())
    }
}
