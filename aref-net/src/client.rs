//! HTTP client construction
//!
//! Creates HTTP clients for the recon stages, optionally routed through a proxy.

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

use aref_core::Profile;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Proxy URL (e.g. socks5h://127.0.0.1:9050), if any
    pub proxy: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Accept self-signed certificates (active probing only)
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Duration::from_secs(aref_core::DEFAULT_TIMEOUT_SECS),
            accept_invalid_certs: false,
        }
    }
}

impl HttpConfig {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            proxy: profile.proxy.clone(),
            timeout: profile.timeout,
            ..Default::default()
        }
    }

    pub fn accept_invalid_certs(mut self) -> Self {
        self.accept_invalid_certs = true;
        self
    }
}

/// Errors from network primitives
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("DNS lookup failed: {0}")]
    Dns(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Create an HTTP client for the given configuration
pub fn create_http_client(config: &HttpConfig) -> Result<Client, NetError> {
    let mut builder = Client::builder()
        .timeout(config.timeout)
        .user_agent(random_user_agent())
        .danger_accept_invalid_certs(config.accept_invalid_certs);

    if let Some(proxy) = &config.proxy {
        let proxy = Proxy::all(proxy).map_err(|e| NetError::ClientBuild(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| NetError::ClientBuild(e.to_string()))
}
