use async_trait::async_trait;
use infrablocks_hetzner::{
    ApiNetwork, HetznerError, Network, NetworkApi, NetworkLookup, Result, register,
};
use infrablocks_provision::{ProvisionError, Provisioner, ProvisionerRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// In-memory stand-in for the Hetzner networks API
#[derive(Default)]
struct FakeHetzner {
    networks: Mutex<Vec<ApiNetwork>>,
    next_id: AtomicU64,
    creates: AtomicUsize,
    deletes: AtomicUsize,
    rejected_deletes: Mutex<HashSet<String>>,
    removed_after_listing: Mutex<HashSet<String>>,
}

impl FakeHetzner {
    fn with_networks(names: &[&str]) -> Self {
        let fake = Self::default();
        for name in names {
            fake.insert(name, "10.0.0.0/16");
        }
        fake
    }

    fn insert(&self, name: &str, ip_range: &str) -> ApiNetwork {
        let network = ApiNetwork {
            id: 1000 + self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            ip_range: ip_range.to_string(),
        };
        self.networks.lock().unwrap().push(network.clone());
        network
    }

    fn reject_delete_of(&self, name: &str) {
        self.rejected_deletes
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    /// Someone else deletes `name` right after the next full listing
    fn remove_after_listing(&self, name: &str) {
        self.removed_after_listing
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    fn names(&self) -> Vec<String> {
        self.networks
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.name.clone())
            .collect()
    }
}

#[async_trait]
impl NetworkApi for FakeHetzner {
    async fn networks_by_name(&self, name: &str) -> Result<Vec<ApiNetwork>> {
        Ok(self
            .networks
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.name == name)
            .cloned()
            .collect())
    }

    async fn networks(&self) -> Result<Vec<ApiNetwork>> {
        let mut networks = self.networks.lock().unwrap();
        let listed = networks.clone();
        let removed = std::mem::take(&mut *self.removed_after_listing.lock().unwrap());
        networks.retain(|n| !removed.contains(&n.name));
        Ok(listed)
    }

    async fn create_network(&self, name: &str, ip_range: &str) -> Result<ApiNetwork> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.insert(name, ip_range))
    }

    async fn delete_network(&self, id: u64) -> Result<()> {
        let mut networks = self.networks.lock().unwrap();
        // the real client treats a 404 as already deleted
        let Some(position) = networks.iter().position(|n| n.id == id) else {
            return Ok(());
        };
        if self
            .rejected_deletes
            .lock()
            .unwrap()
            .contains(&networks[position].name)
        {
            return Err(HetznerError::Api {
                status: 409,
                code: "conflict".to_string(),
                message: "network is still attached to a server".to_string(),
            });
        }
        networks.remove(position);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn engine(api: Arc<FakeHetzner>) -> Provisioner {
    let mut registry = ProvisionerRegistry::new();
    register(&mut registry, api).unwrap();
    Provisioner::new(Arc::new(registry))
}

#[tokio::test]
async fn test_apply_then_diff_has_no_changes() {
    let api = Arc::new(FakeHetzner::default());
    let engine = engine(api.clone());
    let network = Network::new("net-1", "10.0.0.0/16");

    assert!(engine.diff(&network).await.unwrap().missing);

    engine.apply(&network).await.unwrap();
    let diff = engine.diff(&network).await.unwrap();

    assert!(!diff.missing);
    assert!(diff.changes.is_empty());
}

#[tokio::test]
async fn test_apply_twice_creates_once() {
    let api = Arc::new(FakeHetzner::default());
    let engine = engine(api.clone());
    let network = Network::new("net-1", "10.0.0.0/16");

    engine.apply(&network).await.unwrap();
    let first = engine.lookup(&NetworkLookup::new("net-1")).await.unwrap();
    engine.apply(&network).await.unwrap();
    let second = engine.lookup(&NetworkLookup::new("net-1")).await.unwrap();

    assert_eq!(api.creates.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_diff_reports_ip_range_drift() {
    let api = Arc::new(FakeHetzner::default());
    api.insert("net-1", "192.168.0.0/24");
    let engine = engine(api);

    let diff = engine
        .diff(&Network::new("net-1", "10.0.0.0/16"))
        .await
        .unwrap();

    let change = diff.change("ip_range").unwrap();
    assert_eq!(change.actual_value.as_deref(), Some("192.168.0.0/24"));
}

#[tokio::test]
async fn test_destroy_missing_network_makes_no_delete_call() {
    let api = Arc::new(FakeHetzner::default());
    let engine = engine(api.clone());

    let deleted = engine
        .destroy(&Network::new("net-1", "10.0.0.0/16"))
        .await
        .unwrap();

    assert!(!deleted);
    assert_eq!(api.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_destroy_all_with_one_rejected_delete() {
    let api = Arc::new(FakeHetzner::with_networks(&["net-a", "net-b", "net-c"]));
    api.reject_delete_of("net-b");
    let engine = engine(api.clone());

    let result = engine.destroy_all::<Network>().await.unwrap();

    assert!(!result.is_success());
    assert_eq!(result.succeeded.len(), 2);
    assert_eq!(result.failed.len(), 1);
    assert!(
        result.failed[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("still attached"))
    );
    assert_eq!(api.names(), vec!["net-b".to_string()]);
}

#[tokio::test]
async fn test_destroy_all_of_every_network() {
    let api = Arc::new(FakeHetzner::with_networks(&["net-a", "net-b", "net-c"]));
    let engine = engine(api.clone());

    let result = engine.destroy_all::<Network>().await.unwrap();

    assert!(result.is_success());
    assert!(api.names().is_empty());
}

#[tokio::test]
async fn test_api_failure_becomes_backend_error() {
    struct Unreachable;

    #[async_trait]
    impl NetworkApi for Unreachable {
        async fn networks_by_name(&self, _name: &str) -> Result<Vec<ApiNetwork>> {
            Err(HetznerError::Api {
                status: 401,
                code: "unauthorized".to_string(),
                message: "unable to authenticate".to_string(),
            })
        }

        async fn networks(&self) -> Result<Vec<ApiNetwork>> {
            Ok(Vec::new())
        }

        async fn create_network(&self, _name: &str, _ip_range: &str) -> Result<ApiNetwork> {
            unreachable!()
        }

        async fn delete_network(&self, _id: u64) -> Result<()> {
            unreachable!()
        }
    }

    let mut registry = ProvisionerRegistry::new();
    register(&mut registry, Arc::new(Unreachable)).unwrap();
    let engine = Provisioner::new(Arc::new(registry));

    let err = engine
        .diff(&Network::new("net-1", "10.0.0.0/16"))
        .await
        .unwrap_err();
    match err {
        ProvisionError::Backend(message) => assert!(message.contains("unauthorized")),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_destroy_all_tolerates_network_removed_concurrently() {
    let api = Arc::new(FakeHetzner::with_networks(&["net-a", "net-b", "net-c"]));
    api.remove_after_listing("net-b");
    let engine = engine(api.clone());

    let result = engine.destroy_all::<Network>().await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.succeeded.len(), 3);
    assert!(api.names().is_empty());
    assert_eq!(api.deletes.load(Ordering::SeqCst), 2);
}
