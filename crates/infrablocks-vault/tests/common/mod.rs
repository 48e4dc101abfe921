use async_trait::async_trait;
use infrablocks_vault::{InitOptions, InitResponse, Result, SealStatus, VaultApi, VaultError, parse_ttl};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const ROOT_TOKEN: &str = "s.fake-root-token";

#[derive(Default)]
struct ServerState {
    initialized: bool,
    sealed: bool,
    threshold: usize,
    keys: Vec<String>,
    submitted: Vec<String>,
    logical: BTreeMap<String, Value>,
    raw: BTreeMap<String, String>,
}

/// In-memory Vault server speaking the subset of the API the crate uses
pub struct FakeVault {
    state: Mutex<ServerState>,
    pub init_calls: AtomicUsize,
    pub unseal_calls: AtomicUsize,
    pub remote_calls: AtomicUsize,
    pub ca_generations: AtomicUsize,
    init_delay: Option<Duration>,
}

impl FakeVault {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            init_calls: AtomicUsize::new(0),
            unseal_calls: AtomicUsize::new(0),
            remote_calls: AtomicUsize::new(0),
            ca_generations: AtomicUsize::new(0),
            init_delay: None,
        }
    }

    /// Server whose `sys/init` takes a while, to widen race windows
    pub fn slow_init(delay: Duration) -> Self {
        Self {
            init_delay: Some(delay),
            ..Self::new()
        }
    }

    /// Server that was initialized earlier with `keys` and is now sealed
    pub fn initialized_and_sealed(keys: &[&str], threshold: usize) -> Self {
        let fake = Self::new();
        {
            let mut state = fake.state.lock().unwrap();
            state.initialized = true;
            state.sealed = true;
            state.threshold = threshold;
            state.keys = keys.iter().map(|k| k.to_string()).collect();
        }
        fake
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().unwrap().sealed
    }

    pub fn submitted_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn seed(&self, path: &str, data: Value) {
        self.state
            .lock()
            .unwrap()
            .logical
            .insert(path.to_string(), data);
    }

    pub fn seed_raw(&self, path: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .raw
            .insert(path.to_string(), body.to_string());
    }

    pub fn logical(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().logical.get(path).cloned()
    }

    fn authorize(&self, token: &str, path: &str) -> Result<()> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        if token != ROOT_TOKEN {
            return Err(VaultError::Api {
                status: 403,
                path: path.to_string(),
                message: "permission denied".to_string(),
            });
        }
        Ok(())
    }
}

// Vault stores role TTLs as seconds.
fn normalize_role(mut body: Value) -> Value {
    for field in ["ttl", "max_ttl"] {
        if let Some(seconds) = body
            .get(field)
            .and_then(Value::as_str)
            .and_then(|ttl| parse_ttl(ttl).ok())
        {
            body[field] = Value::from(seconds);
        }
    }
    body
}

#[async_trait]
impl VaultApi for FakeVault {
    fn address(&self) -> &str {
        "https://vault.test.local:8200"
    }

    async fn is_initialized(&self) -> Result<bool> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().initialized)
    }

    async fn initialize(&self, options: InitOptions) -> Result<InitResponse> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.init_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.initialized {
            return Err(VaultError::Api {
                status: 400,
                path: "sys/init".to_string(),
                message: "Vault is already initialized".to_string(),
            });
        }
        state.initialized = true;
        state.sealed = true;
        state.threshold = options.secret_threshold as usize;
        state.keys = (0..options.secret_shares)
            .map(|i| format!("unseal-key-{}", i))
            .collect();

        Ok(InitResponse {
            keys: state.keys.clone(),
            root_token: ROOT_TOKEN.to_string(),
        })
    }

    async fn seal_status(&self) -> Result<SealStatus> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(SealStatus {
            sealed: state.sealed,
            threshold: state.threshold as u32,
            shares: state.keys.len() as u32,
            progress: state.submitted.len() as u32,
        })
    }

    async fn unseal(&self, key: &str) -> Result<SealStatus> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        self.unseal_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        if state.keys.iter().any(|k| k == key) && !state.submitted.iter().any(|k| k == key) {
            state.submitted.push(key.to_string());
        }
        if state.submitted.len() >= state.threshold {
            state.sealed = false;
        }

        Ok(SealStatus {
            sealed: state.sealed,
            threshold: state.threshold as u32,
            shares: state.keys.len() as u32,
            progress: state.submitted.len() as u32,
        })
    }

    async fn read(&self, token: &str, path: &str) -> Result<Option<Value>> {
        self.authorize(token, path)?;
        Ok(self.state.lock().unwrap().logical.get(path).cloned())
    }

    async fn write(&self, token: &str, path: &str, body: &Value) -> Result<Option<Value>> {
        self.authorize(token, path)?;
        let mut state = self.state.lock().unwrap();

        if let Some(mount) = path.strip_suffix("/root/generate/internal") {
            self.ca_generations.fetch_add(1, Ordering::SeqCst);
            let common_name = body
                .get("common_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            state.raw.insert(
                format!("{}/ca/pem", mount),
                format!("-----BEGIN CERTIFICATE-----\n{}\n", common_name),
            );
            return Ok(Some(serde_json::json!({ "common_name": common_name })));
        }

        state
            .logical
            .insert(path.to_string(), normalize_role(body.clone()));
        Ok(None)
    }

    async fn list(&self, token: &str, path: &str) -> Result<Vec<String>> {
        self.authorize(token, path)?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .state
            .lock()
            .unwrap()
            .logical
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    async fn delete(&self, token: &str, path: &str) -> Result<()> {
        self.authorize(token, path)?;
        self.state.lock().unwrap().logical.remove(path);
        Ok(())
    }

    async fn get_raw(&self, token: &str, path: &str) -> Result<Option<String>> {
        self.authorize(token, path)?;
        Ok(self.state.lock().unwrap().raw.get(path).cloned())
    }
}
