//! Hetzner Cloud networks API client
//!
//! Talks to the `/v1/networks` endpoints with Bearer token authentication.

use crate::error::{HetznerError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const HETZNER_API_BASE: &str = "https://api.hetzner.cloud/v1";

/// Upper bound for one HTTP request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PER_PAGE: u32 = 50;

/// Network as reported by the Hetzner API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiNetwork {
    pub id: u64,
    pub name: String,
    pub ip_range: String,
}

/// Network operations the provisioner needs
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Networks whose name matches exactly
    async fn networks_by_name(&self, name: &str) -> Result<Vec<ApiNetwork>>;

    /// Every network visible to the token
    async fn networks(&self) -> Result<Vec<ApiNetwork>>;

    async fn create_network(&self, name: &str, ip_range: &str) -> Result<ApiNetwork>;

    async fn delete_network(&self, id: u64) -> Result<()>;
}

/// Configuration for the Hetzner API client
#[derive(Clone)]
pub struct HetznerConfig {
    pub endpoint: String,
    pub api_token: String,
    pub timeout: Duration,
}

impl HetznerConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            endpoint: HETZNER_API_BASE.to_string(),
            api_token: api_token.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create HetznerConfig from environment variables
    ///
    /// `HCLOUD_TOKEN` is required; `HCLOUD_ENDPOINT` overrides the API base.
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var("HCLOUD_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or(HetznerError::MissingToken)?;
        let endpoint =
            std::env::var("HCLOUD_ENDPOINT").unwrap_or_else(|_| HETZNER_API_BASE.to_string());

        Ok(Self {
            endpoint,
            api_token,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for HetznerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerConfig")
            .field("endpoint", &self.endpoint)
            .field("api_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// reqwest-backed [`NetworkApi`]
pub struct HetznerNetworkApi {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
}

impl HetznerNetworkApi {
    pub fn new(config: HetznerConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn list_page(&self, name: Option<&str>, page: u32) -> Result<ListNetworksResponse> {
        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", PER_PAGE.to_string()),
        ];
        if let Some(name) = name {
            query.push(("name", name.to_string()));
        }

        let response = self
            .client
            .get(self.url("networks"))
            .bearer_auth(&self.api_token)
            .query(&query)
            .send()
            .await?;

        parse_response(response).await
    }

    async fn list_all(&self, name: Option<&str>) -> Result<Vec<ApiNetwork>> {
        let mut networks = Vec::new();
        let mut page = 1;

        loop {
            let response = self.list_page(name, page).await?;
            networks.extend(response.networks);

            match response
                .meta
                .and_then(|m| m.pagination)
                .and_then(|p| p.next_page)
            {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(networks)
    }
}

#[async_trait]
impl NetworkApi for HetznerNetworkApi {
    async fn networks_by_name(&self, name: &str) -> Result<Vec<ApiNetwork>> {
        self.list_all(Some(name)).await
    }

    async fn networks(&self) -> Result<Vec<ApiNetwork>> {
        self.list_all(None).await
    }

    async fn create_network(&self, name: &str, ip_range: &str) -> Result<ApiNetwork> {
        let request_body = CreateNetworkRequest {
            name: name.to_string(),
            ip_range: ip_range.to_string(),
        };

        let response = self
            .client
            .post(self.url("networks"))
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await?;

        let created: CreateNetworkResponse = parse_response(response).await?;
        Ok(created.network)
    }

    async fn delete_network(&self, id: u64) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("networks/{}", id)))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        // removed by someone else since it was looked up
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("Network {} is already gone", id);
            return Ok(());
        }
        let body = response.text().await?;
        Err(api_error(status.as_u16(), &body))
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }

    Ok(serde_json::from_str(&body)?)
}

fn api_error(status: u16, body: &str) -> HetznerError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { error }) => HetznerError::Api {
            status,
            code: error.code,
            message: error.message,
        },
        Err(_) => HetznerError::Api {
            status,
            code: "unknown".to_string(),
            message: body.chars().take(200).collect(),
        },
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ListNetworksResponse {
    networks: Vec<ApiNetwork>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next_page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CreateNetworkRequest {
    name: String,
    ip_range: String,
}

#[derive(Debug, Deserialize)]
struct CreateNetworkResponse {
    network: ApiNetwork,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_list_response_parsing() {
        let body = r#"{
            "networks": [
                {"id": 4711, "name": "net-1", "ip_range": "10.0.0.0/16", "subnets": [], "labels": {}}
            ],
            "meta": {"pagination": {"page": 1, "per_page": 50, "next_page": null, "last_page": 1}}
        }"#;

        let parsed: ListNetworksResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.networks,
            vec![ApiNetwork {
                id: 4711,
                name: "net-1".to_string(),
                ip_range: "10.0.0.0/16".to_string(),
            }]
        );
        assert_eq!(parsed.meta.unwrap().pagination.unwrap().next_page, None);
    }

    #[test]
    fn test_api_error_parsing() {
        let err = api_error(
            409,
            r#"{"error": {"code": "uniqueness_error", "message": "name is already used"}}"#,
        );
        assert!(matches!(
            err,
            HetznerError::Api { status: 409, ref code, .. } if code == "uniqueness_error"
        ));

        let err = api_error(502, "<html>bad gateway</html>");
        assert!(matches!(err, HetznerError::Api { status: 502, ref code, .. } if code == "unknown"));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("HCLOUD_TOKEN", Some("secret-token")),
                ("HCLOUD_ENDPOINT", Some("http://localhost:8080/v1")),
            ],
            || {
                let config = HetznerConfig::from_env().unwrap();
                assert_eq!(config.api_token, "secret-token");
                assert_eq!(config.endpoint, "http://localhost:8080/v1");
                assert!(!format!("{:?}", config).contains("secret-token"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_config_without_token() {
        temp_env::with_vars(
            [("HCLOUD_TOKEN", None::<&str>), ("HCLOUD_ENDPOINT", None)],
            || {
                assert!(matches!(
                    HetznerConfig::from_env(),
                    Err(HetznerError::MissingToken)
                ));
            },
        );
    }

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer the first request on a local port with `status` and `body`
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/v1", addr)
    }

    fn api_at(endpoint: String) -> HetznerNetworkApi {
        HetznerNetworkApi::new(HetznerConfig::new("token").with_endpoint(endpoint)).unwrap()
    }

    #[tokio::test]
    async fn test_delete_of_vanished_network_succeeds() {
        let endpoint = serve_once(
            "404 Not Found",
            r#"{"error": {"code": "not_found", "message": "network with ID '42' not found"}}"#,
        )
        .await;

        api_at(endpoint).delete_network(42).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_conflict_is_an_error() {
        let endpoint = serve_once(
            "409 Conflict",
            r#"{"error": {"code": "conflict", "message": "network is still attached"}}"#,
        )
        .await;

        let err = api_at(endpoint).delete_network(42).await.unwrap_err();
        assert!(matches!(err, HetznerError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_hanging_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let config = HetznerConfig::new("token")
            .with_endpoint(format!("http://{}/v1", addr))
            .with_timeout(Duration::from_millis(200));
        let api = HetznerNetworkApi::new(config).unwrap();

        let err = api.networks().await.unwrap_err();
        assert!(matches!(err, HetznerError::Http(ref e) if e.is_timeout()), "{}", err);
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let api =
            HetznerNetworkApi::new(HetznerConfig::new("t").with_endpoint("http://x/v1/")).unwrap();
        assert_eq!(api.url("networks"), "http://x/v1/networks");
    }
}
