mod common;

use common::FakeVault;
use infrablocks_config::{ConfigurationStore, EntityId};
use infrablocks_provision::{Provisioner, ProvisionerRegistry};
use infrablocks_vault::{
    PkiBackendRole, PkiBackendRoleLookup, PkiBackendRoleProvisioner, VaultRootClientProvider,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use uuid::Uuid;

fn setup() -> (Arc<FakeVault>, Provisioner) {
    let vault = Arc::new(FakeVault::new());
    let provider = Arc::new(VaultRootClientProvider::new(
        vault.clone(),
        ConfigurationStore::in_memory(),
        EntityId::Environment(Uuid::new_v4()),
    ));

    let mut registry = ProvisionerRegistry::new();
    registry
        .register::<PkiBackendRole, _>(Arc::new(
            PkiBackendRoleProvisioner::new(provider).with_mount("pki"),
        ))
        .unwrap();

    (vault, Provisioner::new(Arc::new(registry)))
}

fn web_role() -> PkiBackendRole {
    PkiBackendRole {
        max_ttl: "168h".to_string(),
        ttl: "1h30m".to_string(),
        allowed_domains: vec!["example.com".to_string()],
        allow_subdomains: true,
        ..PkiBackendRole::new("web", "pki")
    }
}

#[tokio::test]
async fn test_apply_writes_role_and_generates_ca_then_diff_is_clean() {
    let (vault, engine) = setup();
    let role = web_role();

    assert!(engine.diff(&role).await.unwrap().missing);

    engine.apply(&role).await.unwrap();

    let stored = vault.logical("pki/roles/web").unwrap();
    assert_eq!(stored["ttl"], 5400);
    assert_eq!(stored["allowed_domains"][0], "example.com");
    assert_eq!(vault.ca_generations.load(Ordering::SeqCst), 1);

    let diff = engine.diff(&role).await.unwrap();
    assert!(!diff.missing);
    assert!(diff.changes.is_empty(), "unexpected changes: {}", diff);
}

#[tokio::test]
async fn test_apply_twice_generates_ca_once() {
    let (vault, engine) = setup();
    let role = web_role();

    engine.apply(&role).await.unwrap();
    engine.apply(&role).await.unwrap();

    assert_eq!(vault.ca_generations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_diff_reports_ttl_drift_and_missing_keys() {
    let (vault, engine) = setup();
    vault.seed(
        "pki/roles/web",
        serde_json::json!({ "max_ttl": 604800, "ttl": 60 }),
    );

    let diff = engine.diff(&web_role()).await.unwrap();

    let keys = diff.change("keys_exist").unwrap();
    assert_eq!(keys.expected_value.as_deref(), Some("true"));
    assert_eq!(keys.actual_value.as_deref(), Some("false"));

    let ttl = diff.change("ttl").unwrap();
    assert!(ttl.changed);
    assert_eq!(ttl.actual_value.as_deref(), Some("60"));

    assert!(diff.change("max_ttl").is_none());
}

#[tokio::test]
async fn test_existing_ca_is_kept() {
    let (vault, engine) = setup();
    vault.seed_raw("pki/ca/pem", "-----BEGIN CERTIFICATE-----\nexisting\n");

    engine.apply(&web_role()).await.unwrap();

    assert_eq!(vault.ca_generations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lookup_and_destroy() {
    let (vault, engine) = setup();
    let role = web_role();
    engine.apply(&role).await.unwrap();

    let runtime = engine
        .lookup(&PkiBackendRoleLookup::new("web", "pki"))
        .await
        .unwrap()
        .unwrap();
    assert!(runtime.keys_exist);

    assert!(engine.destroy(&role).await.unwrap());
    assert!(vault.logical("pki/roles/web").is_none());
    assert!(!engine.destroy(&role).await.unwrap());
}

#[tokio::test]
async fn test_destroy_all_removes_every_role_in_the_mount() {
    let (vault, engine) = setup();
    engine.apply(&web_role()).await.unwrap();
    engine.apply(&PkiBackendRole::new("db", "pki")).await.unwrap();
    vault.seed("other/roles/keep", serde_json::json!({ "ttl": 60 }));

    let result = engine.destroy_all::<PkiBackendRole>().await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.succeeded.len(), 2);
    assert!(vault.logical("pki/roles/web").is_none());
    assert!(vault.logical("pki/roles/db").is_none());
    assert!(vault.logical("other/roles/keep").is_some());
}
