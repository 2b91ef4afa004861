//! Vulnerability scoring
//!
//! Runs after the passive stage and reads its `osint.shodan` section. Produces:
//! - `threat_intel`: latest entries from the profile's `ml_feeds`
//! - `features`: port and vulnerability counts plus a text summary
//! - `prediction`: a vulnerability score in [0.1, 0.9]

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::{error, info};

use aref_core::{Profile, StageResult};

use crate::StageError;

const CVE_LIMIT: usize = 10;
const EXPLOIT_LIMIT: usize = 5;

static RSS_ITEM_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<item\b.*?<title>(.*?)</title>").unwrap());

/// A threat-intel feed selected by name in `ml_feeds`
#[async_trait]
pub trait ThreatFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn latest(&self, profile: &Profile) -> Result<Vec<String>, StageError>;
}

/// Latest CVE identifiers from CIRCL
pub struct CveFeed {
    http: Client,
    url: String,
}

impl CveFeed {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            url: "https://cve.circl.lu/api/last".to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

fn cve_id(entry: &Value) -> Option<String> {
    entry
        .get("id")
        .or_else(|| entry.pointer("/cveMetadata/cveId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl ThreatFeed for CveFeed {
    fn name(&self) -> &str {
        "cve"
    }

    async fn latest(&self, profile: &Profile) -> Result<Vec<String>, StageError> {
        let entries: Vec<Value> = self
            .http
            .get(&self.url)
            .timeout(profile.timeout)
            .send()
            .await?
            .json()
            .await?;

        Ok(entries.iter().take(CVE_LIMIT).filter_map(cve_id).collect())
    }
}

/// Latest Exploit-DB entries from its RSS feed
pub struct ExploitDbFeed {
    http: Client,
    url: String,
}

impl ExploitDbFeed {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            url: "https://www.exploit-db.com/rss.xml".to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

/// Titles of the first `limit` RSS items
pub fn rss_item_titles(xml: &str, limit: usize) -> Vec<String> {
    RSS_ITEM_TITLE
        .captures_iter(xml)
        .filter_map(|cap| cap.get(1))
        .map(|title| {
            let title = title.as_str().trim();
            title
                .strip_prefix("<![CDATA[")
                .and_then(|t| t.strip_suffix("]]>"))
                .unwrap_or(title)
                .trim()
                .to_string()
        })
        .take(limit)
        .collect()
}

#[async_trait]
impl ThreatFeed for ExploitDbFeed {
    fn name(&self) -> &str {
        "exploitdb"
    }

    async fn latest(&self, profile: &Profile) -> Result<Vec<String>, StageError> {
        let xml = self
            .http
            .get(&self.url)
            .timeout(profile.timeout)
            .send()
            .await?
            .text()
            .await?;

        Ok(rss_item_titles(&xml, EXPLOIT_LIMIT))
    }
}

/// Inputs to the scoring model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Features {
    pub port_count: usize,
    pub vuln_count: usize,
    pub summary: String,
}

impl Features {
    /// Extract features from a passive stage result.
    ///
    /// Returns `None` only when the Shodan section is missing. An error marker
    /// carries no ports or vulns, so it scores as an unexposed host.
    pub fn from_passive(passive: &StageResult) -> Option<Self> {
        let shodan = passive.pointer("osint.shodan")?;

        let os = shodan.get("os").and_then(Value::as_str).unwrap_or("unknown");
        let ports: Vec<String> = shodan
            .get("ports")
            .and_then(Value::as_array)
            .map(|ports| ports.iter().map(|p| p.to_string()).collect())
            .unwrap_or_default();
        let vulns: Vec<&str> = shodan
            .get("vulns")
            .and_then(Value::as_array)
            .map(|vulns| vulns.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        Some(Self {
            port_count: ports.len(),
            vuln_count: vulns.len(),
            summary: format!(
                "OS: {}, Ports: {}, Vulns: {}",
                os,
                ports.join(", "),
                vulns.join(", ")
            ),
        })
    }
}

/// Turns features into a vulnerability score
pub trait ScoringModel: Send + Sync {
    fn score(&self, features: &Features) -> f64;
}

/// Weighted exposure score: 30% open ports, 70% known vulnerabilities
#[derive(Debug, Clone)]
pub struct LinearScorer {
    pub port_weight: f64,
    pub vuln_weight: f64,
    /// Port count treated as full exposure
    pub port_ceiling: f64,
    /// Vulnerability count treated as full exposure
    pub vuln_ceiling: f64,
}

impl Default for LinearScorer {
    fn default() -> Self {
        Self {
            port_weight: 0.3,
            vuln_weight: 0.7,
            port_ceiling: 20.0,
            vuln_ceiling: 10.0,
        }
    }
}

impl ScoringModel for LinearScorer {
    fn score(&self, features: &Features) -> f64 {
        let ports = (features.port_count as f64 / self.port_ceiling).min(1.0);
        let vulns = (features.vuln_count as f64 / self.vuln_ceiling).min(1.0);
        (ports * self.port_weight + vulns * self.vuln_weight).clamp(0.1, 0.9)
    }
}

/// The ML analysis step
pub struct MlAnalyzer {
    feeds: Vec<Arc<dyn ThreatFeed>>,
    model: Arc<dyn ScoringModel>,
}

impl MlAnalyzer {
    pub fn new(feeds: Vec<Arc<dyn ThreatFeed>>, model: Arc<dyn ScoringModel>) -> Self {
        Self { feeds, model }
    }

    /// CVE and Exploit-DB feeds with the linear scorer
    pub fn with_default_feeds(http: Client) -> Self {
        Self::new(
            vec![
                Arc::new(CveFeed::new(http.clone())),
                Arc::new(ExploitDbFeed::new(http)),
            ],
            Arc::new(LinearScorer::default()),
        )
    }

    async fn threat_intel(&self, profile: &Profile) -> Map<String, Value> {
        let selected: Vec<_> = self
            .feeds
            .iter()
            .filter(|feed| profile.ml_feeds.contains(feed.name()))
            .collect();
        let results = join_all(selected.iter().map(|feed| feed.latest(profile))).await;

        let mut intel = Map::new();
        for (feed, result) in selected.iter().zip(results) {
            match result {
                Ok(entries) => {
                    intel.insert(feed.name().to_string(), entries.into());
                }
                Err(e) => error!("{} feed failed: {}", feed.name(), e),
            }
        }
        intel
    }

    /// Score a target from its passive stage result
    pub async fn analyze(&self, passive: &StageResult, profile: &Profile) -> StageResult {
        let intel = self.threat_intel(profile).await;
        let features = Features::from_passive(passive);

        let (features, prediction) = match features {
            Some(features) => {
                let score = self.model.score(&features);
                info!("Vulnerability score {:.2}", score);
                let prediction = StageResult::new().with("vulnerability_score", score);
                (
                    serde_json::to_value(&features).unwrap_or(Value::Null),
                    prediction.into_value(),
                )
            }
            None => (
                Value::Object(Map::new()),
                StageResult::error("No features extracted").into_value(),
            ),
        };

        StageResult::new()
            .with("threat_intel", intel)
            .with("features", features)
            .with("prediction", prediction)
    }
}
