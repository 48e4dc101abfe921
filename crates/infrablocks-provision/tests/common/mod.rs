use async_trait::async_trait;
use infrablocks_provision::{
    Lookup, LookupProvider, Observed, ProvisionError, Resource, ResourceDiffItem,
    ResourceProvisioner, Result,
};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub id: String,
    pub ip_range: String,
}

impl Net {
    pub fn new(id: &str, ip_range: &str) -> Self {
        Self {
            id: id.to_string(),
            ip_range: ip_range.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct NetLookup(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct NetRuntime {
    pub id: String,
    pub name: String,
    pub ip_range: String,
}

impl Observed for NetRuntime {
    fn native_id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Lookup for NetLookup {
    const KIND: &'static str = "test-network";
    type Runtime = NetRuntime;

    fn id(&self) -> &str {
        &self.0
    }
}

impl Resource for Net {
    const KIND: &'static str = "test-network";
    type Lookup = NetLookup;

    fn id(&self) -> &str {
        &self.id
    }

    fn lookup(&self) -> NetLookup {
        NetLookup(self.id.clone())
    }
}

/// In-memory network backend counting remote calls
#[derive(Default)]
pub struct FakeNetworks {
    networks: Mutex<Vec<NetRuntime>>,
    next_id: AtomicUsize,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    failing_deletes: Mutex<HashSet<String>>,
    pub lookup_delay: Option<Duration>,
}

impl FakeNetworks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(lookup_delay: Duration) -> Self {
        Self {
            lookup_delay: Some(lookup_delay),
            ..Self::default()
        }
    }

    pub fn seed(&self, name: &str, ip_range: &str) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.networks.lock().unwrap().push(NetRuntime {
            id,
            name: name.to_string(),
            ip_range: ip_range.to_string(),
        });
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn names(&self) -> Vec<String> {
        self.networks
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.name.clone())
            .collect()
    }

    fn find(&self, name: &str) -> Option<NetRuntime> {
        self.networks
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.name == name)
            .cloned()
    }
}

#[async_trait]
impl LookupProvider<NetLookup> for FakeNetworks {
    async fn lookup(&self, lookup: &NetLookup) -> Result<Option<NetRuntime>> {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.find(lookup.id()))
    }
}

#[async_trait]
impl ResourceProvisioner<Net> for FakeNetworks {
    async fn lookup(&self, lookup: &NetLookup) -> Result<Option<NetRuntime>> {
        LookupProvider::lookup(self, lookup).await
    }

    fn compare(&self, resource: &Net, runtime: &NetRuntime) -> Vec<ResourceDiffItem> {
        vec![ResourceDiffItem::compare_eq(
            "ip_range",
            &resource.ip_range,
            Some(&runtime.ip_range),
        )]
    }

    async fn apply(&self, resource: &Net) -> Result<()> {
        if self.find(&resource.id).is_none() {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.seed(&resource.id, &resource.ip_range);
        }
        Ok(())
    }

    async fn delete(&self, runtime: &NetRuntime) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(&runtime.name) {
            return Err(ProvisionError::backend(format!(
                "deleting network {} was rejected",
                runtime.name
            )));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.networks
            .lock()
            .unwrap()
            .retain(|n| n.id != runtime.id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<NetRuntime>> {
        Ok(self.networks.lock().unwrap().clone())
    }
}
