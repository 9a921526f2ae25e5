//! Consul API client
//!
//! Implements the subset of the Consul HTTP API needed for lease storage.
//! Based on the Consul API structure: /v1/kv/:key and /v1/status/leader

use crate::consul_trait::ConsulKvTrait;
use crate::error::ConsulError;
use crate::models::KvPair;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// Request timeout for every call to the agent
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable holding the ACL token, as used by the Consul CLI
pub const TOKEN_ENV: &str = "CONSUL_HTTP_TOKEN";

/// Consul API client
#[derive(Debug, Clone)]
pub struct ConsulClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ConsulClient {
    /// Create a new Consul client
    ///
    /// # Arguments
    /// * `address` - Agent address, either `host:port` (http assumed) or a full URL
    /// * `token` - Optional ACL token sent as `X-Consul-Token`
    pub fn new(address: String, token: Option<String>) -> Result<Self, ConsulError> {
        let base_url = normalize_address(&address)?;
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ConsulError::Http)?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Create a client whose ACL token comes from `CONSUL_HTTP_TOKEN`
    pub fn from_env(address: String) -> Result<Self, ConsulError> {
        Self::new(address, std::env::var(TOKEN_ENV).ok())
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url).header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.header("X-Consul-Token", token),
            None => builder,
        }
    }

    fn kv_url(&self, key: &str) -> String {
        format!("{}/v1/kv/{}", self.base_url, kv_path(key))
    }

    /// Query the current raft leader.
    ///
    /// A lightweight request that confirms the agent is reachable and the
    /// token (if any) is accepted.
    ///
    /// # Returns
    /// * `Ok(String)` - Leader address, e.g. `"10.0.0.5:8300"`
    /// * `Err(ConsulError)` - Agent unreachable, or no leader elected
    pub async fn check_leader(&self) -> Result<String, ConsulError> {
        let url = format!("{}/v1/status/leader", self.base_url);
        debug!("Checking Consul leader at {}", url);

        let response = self.request(Method::GET, &url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::FORBIDDEN {
            return Err(ConsulError::PermissionDenied(body));
        }

        if !status.is_success() {
            return Err(ConsulError::Api(format!(
                "Failed to query leader: {} - {}",
                status, body
            )));
        }

        let leader: String = serde_json::from_str(&body)?;
        if leader.is_empty() {
            return Err(ConsulError::Api("Cluster has no leader".to_string()));
        }

        debug!("Consul leader is {}", leader);
        Ok(leader)
    }

    /// List every key/value pair below a prefix
    ///
    /// # Arguments
    /// * `prefix` - Key prefix; include a trailing `/` to match a folder only
    ///
    /// # Returns
    /// * `Ok(Vec<KvPair>)` - Matching pairs (empty when nothing matches)
    /// * `Err(ConsulError)` - If the request fails
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<KvPair>, ConsulError> {
        let url = format!("{}?recurse=true", self.kv_url(prefix));
        debug!("Listing Consul keys under {}", prefix);

        let response = self.request(Method::GET, &url).send().await?;

        // Consul answers 404 for a prefix with no keys
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if response.status() == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ConsulError::PermissionDenied(body));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConsulError::Api(format!(
                "Failed to list prefix {}: {} - {}",
                prefix, status, body
            )));
        }

        let response_text = response.text().await?;
        let pairs: Vec<KvPair> = serde_json::from_str(&response_text).map_err(|e| {
            ConsulError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                response_text.chars().take(500).collect::<String>()
            ))
        })?;
        Ok(pairs)
    }

    /// Create or replace a key
    ///
    /// # Arguments
    /// * `key` - Full key path
    /// * `value` - Raw value bytes (stored as-is, Consul base64-encodes on read)
    pub async fn put_key(&self, key: &str, value: &[u8]) -> Result<(), ConsulError> {
        let url = self.kv_url(key);
        debug!("Writing Consul key {} ({} bytes)", key, value.len());

        let response = self
            .request(Method::PUT, &url)
            .body(value.to_vec())
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ConsulError::PermissionDenied(body));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConsulError::Api(format!(
                "Failed to write key {}: {} - {}",
                key, status, body
            )));
        }

        // Consul answers with a bare JSON boolean
        let written: bool = response.json().await?;
        if !written {
            return Err(ConsulError::Api(format!("Write to key {} was rejected", key)));
        }

        Ok(())
    }
}

/// Turn an agent address into a base URL without a trailing slash
fn normalize_address(address: &str) -> Result<String, ConsulError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ConsulError::InvalidAddress("address cannot be empty".to_string()));
    }

    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ConsulError::InvalidAddress(format!("{}: {}", address, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConsulError::InvalidAddress(format!(
            "{}: unsupported scheme {}",
            address,
            url.scheme()
        )));
    }

    Ok(candidate.trim_end_matches('/').to_string())
}

/// Percent-encode each key segment while keeping the `/` separators
fn kv_path(key: &str) -> String {
    key.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait::async_trait]
impl ConsulKvTrait for ConsulClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_leader(&self) -> Result<String, ConsulError> {
        self.check_leader().await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KvPair>, ConsulError> {
        self.list_prefix(prefix).await
    }

    async fn put_key(&self, key: &str, value: &[u8]) -> Result<(), ConsulError> {
        self.put_key(key, value).await
    }
}
