//! Active recon stage
//!
//! Touches the target directly:
//! - TCP connect probing over ports 22-443
//! - A crawl of `http://<target>` for its title and links
//!
//! A failed port scan is logged and leaves `ports` empty; a failed crawl is
//! recorded as `web.error`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{error, info};

use aref_core::{Profile, StageResult, Target};
use aref_net::{
    scan_ports, summarize_html, DnsResolver, PageSummary, DEFAULT_PORT_RANGE,
    DEFAULT_PROBE_CONCURRENCY,
};

use crate::{Stage, StageError};

/// Finds open TCP ports on a target
#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn open_ports(&self, target: &Target, profile: &Profile) -> Result<Vec<u16>, StageError>;
}

/// Fetches and summarizes a target's web root
#[async_trait]
pub trait WebCrawler: Send + Sync {
    async fn crawl(&self, target: &Target, profile: &Profile) -> Result<PageSummary, StageError>;
}

/// Connect-scan over a port range
pub struct TcpPortScanner {
    resolver: DnsResolver,
    ports: RangeInclusive<u16>,
    max_concurrent: usize,
}

impl TcpPortScanner {
    pub fn new(resolver: DnsResolver) -> Self {
        Self {
            resolver,
            ports: DEFAULT_PORT_RANGE,
            max_concurrent: DEFAULT_PROBE_CONCURRENCY,
        }
    }

    pub fn with_ports(mut self, ports: RangeInclusive<u16>) -> Self {
        self.ports = ports;
        self
    }
}

#[async_trait]
impl PortScanner for TcpPortScanner {
    async fn open_ports(&self, target: &Target, profile: &Profile) -> Result<Vec<u16>, StageError> {
        let ip = match target.ipv4() {
            Some(ip) => IpAddr::V4(ip),
            None => self
                .resolver
                .resolve_ipv4(target.as_str())
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| StageError::Network(format!("{target} has no A record")))?,
        };

        Ok(scan_ports(ip, self.ports.clone(), profile.timeout, self.max_concurrent).await)
    }
}

/// Plain HTTP crawler for the target's web root
pub struct HttpCrawler {
    http: Client,
}

impl HttpCrawler {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl WebCrawler for HttpCrawler {
    async fn crawl(&self, target: &Target, profile: &Profile) -> Result<PageSummary, StageError> {
        let url = format!("http://{target}");
        let response = self.http.get(&url).timeout(profile.timeout).send().await?;
        let html = response.text().await?;
        Ok(summarize_html(&html))
    }
}

#[derive(Debug, Default, Serialize)]
struct ActiveReport {
    ports: Vec<u16>,
    web: WebSection,
}

#[derive(Debug, Default, Serialize)]
struct WebSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    links: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// The active recon stage
pub struct ActiveRecon {
    scanner: Arc<dyn PortScanner>,
    crawler: Arc<dyn WebCrawler>,
}

impl ActiveRecon {
    pub fn new(scanner: Arc<dyn PortScanner>, crawler: Arc<dyn WebCrawler>) -> Self {
        Self { scanner, crawler }
    }
}

#[async_trait]
impl Stage for ActiveRecon {
    fn name(&self) -> &str {
        "active"
    }

    async fn run(&self, target: &Target, profile: &Profile) -> Result<StageResult, StageError> {
        let (ports, page) = tokio::join!(
            self.scanner.open_ports(target, profile),
            self.crawler.crawl(target, profile),
        );

        let mut report = ActiveReport::default();

        match ports {
            Ok(ports) => {
                info!("{} open ports on {}", ports.len(), target);
                report.ports = ports;
            }
            Err(e) => error!("Port scan failed for {}: {}", target, e),
        }

        match page {
            Ok(summary) => {
                report.web.links = Some(summary.links);
                report.web.title = Some(summary.title.unwrap_or_else(|| "No title".to_string()));
            }
            Err(e) => {
                error!("Web crawl failed for {}: {}", target, e);
                report.web.error = Some(e.to_string());
            }
        }

        Ok(StageResult::from_serialize(&report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedScanner(Result<Vec<u16>, String>);

    #[async_trait]
    impl PortScanner for FixedScanner {
        async fn open_ports(&self, _: &Target, _: &Profile) -> Result<Vec<u16>, StageError> {
            self.0.clone().map_err(StageError::Network)
        }
    }

    struct FixedCrawler(Result<PageSummary, String>);

    #[async_trait]
    impl WebCrawler for FixedCrawler {
        async fn crawl(&self, _: &Target, _: &Profile) -> Result<PageSummary, StageError> {
            self.0.clone().map_err(StageError::Network)
        }
    }

    #[tokio::test]
    async fn test_full_success() {
        let stage = ActiveRecon::new(
            Arc::new(FixedScanner(Ok(vec![22, 80]))),
            Arc::new(FixedCrawler(Ok(PageSummary {
                title: None,
                links: vec!["/about".to_string()],
            }))),
        );
        let target = Target::parse("example.com").unwrap();
        let result = stage.run(&target, &Profile::default()).await.unwrap();

        assert_eq!(
            result.into_value(),
            json!({"ports": [22, 80], "web": {"links": ["/about"], "title": "No title"}})
        );
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let stage = ActiveRecon::new(
            Arc::new(FixedScanner(Err("no route".to_string()))),
            Arc::new(FixedCrawler(Err("connection refused".to_string()))),
        );
        let target = Target::parse("10.0.0.1").unwrap();
        let result = stage.run(&target, &Profile::default()).await.unwrap();

        assert_eq!(result.get("ports"), Some(&json!([])));
        assert_eq!(
            result.pointer("web.error"),
            Some(&json!("Network error: connection refused"))
        );
    }
}
