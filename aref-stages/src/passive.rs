//! Passive recon stage
//!
//! Collects third-party intelligence without touching the target:
//! - Shodan host data (cached per target for the profile's TTL)
//! - WHOIS registration data
//! - DNS A/MX/NS/TXT records
//!
//! Each sub-lookup fails on its own. A failed Shodan or WHOIS lookup becomes
//! an `{"error": ...}` entry; a failed DNS record type is skipped.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use aref_core::{Profile, StageCache, StageResult, Target};
use aref_net::{DnsResolver, RECON_RECORD_TYPES};

use crate::{Stage, StageError};

/// Host-level intelligence from Shodan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostIntel {
    pub os: String,
    pub ports: Vec<u16>,
    pub vulns: Vec<String>,
}

/// Source of host intelligence (Shodan in production)
#[async_trait]
pub trait HostIntelSource: Send + Sync {
    /// Short source name, also used to derive the cache key
    fn source(&self) -> &str;

    async fn host(&self, target: &Target, profile: &Profile) -> Result<HostIntel, StageError>;
}

/// Source of WHOIS data
#[async_trait]
pub trait WhoisSource: Send + Sync {
    async fn whois(&self, target: &Target, profile: &Profile) -> Result<Value, StageError>;
}

/// Source of DNS records
#[async_trait]
pub trait DnsSource: Send + Sync {
    async fn records(&self, target: &Target, record_type: &str) -> Result<Vec<String>, StageError>;
}

/// Shodan REST client
pub struct ShodanClient {
    http: Client,
    api_key: String,
    base_url: String,
    resolver: DnsResolver,
}

#[derive(Debug, Deserialize)]
struct ShodanHostResponse {
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    ports: Vec<u16>,
    #[serde(default)]
    vulns: Vec<String>,
}

impl ShodanClient {
    pub fn new(http: Client, api_key: &str, resolver: DnsResolver) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: "https://api.shodan.io".to_string(),
            resolver,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    // Shodan indexes hosts by address, so domains go through their first A record
    async fn host_address(&self, target: &Target) -> Result<IpAddr, StageError> {
        if let Some(ip) = target.ipv4() {
            return Ok(IpAddr::V4(ip));
        }
        self.resolver
            .resolve_ipv4(target.as_str())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StageError::Network(format!("{target} has no A record")))
    }
}

#[async_trait]
impl HostIntelSource for ShodanClient {
    fn source(&self) -> &str {
        "shodan"
    }

    async fn host(&self, target: &Target, profile: &Profile) -> Result<HostIntel, StageError> {
        let ip = self.host_address(target).await?;
        let url = format!("{}/shodan/host/{}", self.base_url, ip);

        let response = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(profile.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::Upstream { status, body });
        }

        let host: ShodanHostResponse = response.json().await?;
        Ok(HostIntel {
            os: host.os.unwrap_or_else(|| "unknown".to_string()),
            ports: host.ports,
            vulns: host.vulns,
        })
    }
}

/// WHOIS JSON API client
pub struct WhoisClient {
    http: Client,
    base_url: String,
}

impl WhoisClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: "https://api.whois.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl WhoisSource for WhoisClient {
    async fn whois(&self, target: &Target, profile: &Profile) -> Result<Value, StageError> {
        let url = format!("{}/{}", self.base_url, target);
        let response = self.http.get(&url).timeout(profile.timeout).send().await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DnsSource for DnsResolver {
    async fn records(&self, target: &Target, record_type: &str) -> Result<Vec<String>, StageError> {
        Ok(self.lookup(target.as_str(), record_type).await?)
    }
}

#[derive(Debug, Serialize)]
struct PassiveReport {
    osint: OsintSection,
    dns: Vec<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Serialize)]
struct OsintSection {
    shodan: Value,
    whois: Value,
}

/// The passive recon stage
pub struct PassiveRecon {
    intel: Arc<dyn HostIntelSource>,
    whois: Arc<dyn WhoisSource>,
    dns: Arc<dyn DnsSource>,
    cache: StageCache,
}

impl PassiveRecon {
    pub fn new(
        intel: Arc<dyn HostIntelSource>,
        whois: Arc<dyn WhoisSource>,
        dns: Arc<dyn DnsSource>,
        cache: StageCache,
    ) -> Self {
        Self {
            intel,
            whois,
            dns,
            cache,
        }
    }

    async fn host_intel(&self, target: &Target, profile: &Profile) -> Value {
        let key = StageCache::key(self.intel.source(), target.as_str());

        if let Some(cached) = self.cache.get(&key).await {
            info!("Loaded cached {} data for {}", self.intel.source(), target);
            return cached;
        }

        match self.intel.host(target, profile).await {
            Ok(host) => {
                let value = serde_json::to_value(&host).unwrap_or(Value::Null);
                if let Err(e) = self.cache.put(&key, &value, profile.cache_ttl).await {
                    warn!("Could not cache {} data for {}: {}", self.intel.source(), target, e);
                }
                value
            }
            Err(e) => {
                error!("{} failed for {}: {}", self.intel.source(), target, e);
                StageResult::error(e.to_string()).into_value()
            }
        }
    }

    async fn whois(&self, target: &Target, profile: &Profile) -> Value {
        match self.whois.whois(target, profile).await {
            Ok(whois) => whois,
            Err(e) => {
                error!("WHOIS failed for {}: {}", target, e);
                StageResult::error(e.to_string()).into_value()
            }
        }
    }

    async fn dns(&self, target: &Target) -> Vec<BTreeMap<String, Vec<String>>> {
        let mut records = Vec::new();
        for rtype in RECON_RECORD_TYPES {
            match self.dns.records(target, rtype).await {
                Ok(answers) => {
                    records.push(BTreeMap::from([(rtype.to_string(), answers)]));
                }
                Err(e) => warn!("DNS {} lookup failed for {}: {}", rtype, target, e),
            }
        }
        records
    }
}

#[async_trait]
impl Stage for PassiveRecon {
    fn name(&self) -> &str {
        "passive"
    }

    async fn run(&self, target: &Target, profile: &Profile) -> Result<StageResult, StageError> {
        let (shodan, whois, dns) = tokio::join!(
            self.host_intel(target, profile),
            self.whois(target, profile),
            self.dns(target),
        );

        let report = PassiveReport {
            osint: OsintSection { shodan, whois },
            dns,
        };
        Ok(StageResult::from_serialize(&report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingIntel;

    #[async_trait]
    impl HostIntelSource for FailingIntel {
        fn source(&self) -> &str {
            "shodan"
        }

        async fn host(&self, _: &Target, _: &Profile) -> Result<HostIntel, StageError> {
            Err(StageError::Network("API error".to_string()))
        }
    }

    struct CountingIntel(AtomicUsize);

    #[async_trait]
    impl HostIntelSource for CountingIntel {
        fn source(&self) -> &str {
            "shodan"
        }

        async fn host(&self, _: &Target, _: &Profile) -> Result<HostIntel, StageError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(HostIntel {
                os: "Linux".to_string(),
                ports: vec![22, 443],
                vulns: vec!["CVE-2023-12345".to_string()],
            })
        }
    }

    struct StaticWhois;

    #[async_trait]
    impl WhoisSource for StaticWhois {
        async fn whois(&self, _: &Target, _: &Profile) -> Result<Value, StageError> {
            Ok(json!({"registrar": "Example Registrar"}))
        }
    }

    struct PartialDns;

    #[async_trait]
    impl DnsSource for PartialDns {
        async fn records(&self, _: &Target, record_type: &str) -> Result<Vec<String>, StageError> {
            match record_type {
                "A" => Ok(vec!["93.184.216.34".to_string()]),
                "NS" => Ok(vec!["a.iana-servers.net.".to_string()]),
                _ => Err(StageError::Network("NXDOMAIN".to_string())),
            }
        }
    }

    fn profile() -> Profile {
        Profile {
            timeout: std::time::Duration::from_secs(5),
            threads: 4,
            cache_ttl: std::time::Duration::from_secs(3600),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_shodan_failure_is_recorded_inline() {
        let dir = tempfile::tempdir().unwrap();
        let stage = PassiveRecon::new(
            Arc::new(FailingIntel),
            Arc::new(StaticWhois),
            Arc::new(PartialDns),
            StageCache::new(dir.path()),
        );
        let target = Target::parse("example.com").unwrap();

        let result = stage.run(&target, &profile()).await.unwrap();

        assert_eq!(result.pointer("osint.shodan"), Some(&json!({"error": "Network error: API error"})));
        assert_eq!(result.pointer("osint.whois.registrar"), Some(&json!("Example Registrar")));
        assert_eq!(
            result.get("dns"),
            Some(&json!([{"A": ["93.184.216.34"]}, {"NS": ["a.iana-servers.net."]}]))
        );
    }

    #[tokio::test]
    async fn test_shodan_result_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let intel = Arc::new(CountingIntel(AtomicUsize::new(0)));
        let stage = PassiveRecon::new(
            intel.clone(),
            Arc::new(StaticWhois),
            Arc::new(PartialDns),
            StageCache::new(dir.path()),
        );
        let target = Target::parse("8.8.8.8").unwrap();

        let first = stage.run(&target, &profile()).await.unwrap();
        let second = stage.run(&target, &profile()).await.unwrap();

        assert_eq!(intel.0.load(Ordering::SeqCst), 1);
        assert_eq!(first.pointer("osint.shodan"), second.pointer("osint.shodan"));
        assert_eq!(first.pointer("osint.shodan.ports"), Some(&json!([22, 443])));
        assert!(dir.path().join("shodan_8.8.8.8.json").exists());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let stage = PassiveRecon::new(
            Arc::new(FailingIntel),
            Arc::new(StaticWhois),
            Arc::new(PartialDns),
            StageCache::new(dir.path()),
        );
        let target = Target::parse("example.com").unwrap();
        stage.run(&target, &profile()).await.unwrap();

        assert!(!dir.path().join("shodan_example.com.json").exists());
    }
}
