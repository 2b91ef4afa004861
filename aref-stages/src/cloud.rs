//! Cloud inventory stage
//!
//! Counts compute instances in each provider listed in the profile's
//! `cloud_providers`. Providers fail independently: a failure is recorded as
//! `{"error": msg}` under the provider's key.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use aref_core::{Profile, StageResult, Target};

use crate::sigv4::{canonical_query, sign_get, SigningParams};
use crate::{Stage, StageError};

/// Counts compute resources in one cloud provider
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Provider name as used in `cloud_providers` (aws, gcp, azure)
    fn provider(&self) -> &str;

    /// Key the count is reported under (`instances`, `vms`)
    fn count_key(&self) -> &str;

    async fn count(&self, profile: &Profile) -> Result<usize, StageError>;
}

fn credential<'a>(profile: &'a Profile, provider: &str, field: &str) -> Result<&'a str, StageError> {
    profile
        .credentials
        .get(provider, field)
        .ok_or_else(|| StageError::Config(format!("Missing {field} in {provider} creds")))
}

/// Bearer token from the credential set, falling back to an env var
fn bearer_token(profile: &Profile, provider: &str, env_var: &str) -> Result<String, StageError> {
    if let Some(token) = profile.credentials.get(provider, "access_token") {
        return Ok(token.to_string());
    }
    std::env::var(env_var)
        .ok()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            StageError::Config(format!(
                "No access token for {provider}: set access_token or {env_var}"
            ))
        })
}

async fn checked_text(response: reqwest::Response) -> Result<String, StageError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(StageError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// EC2 `DescribeInstances`, signed with SigV4
pub struct AwsInventory {
    http: Client,
    default_region: String,
    endpoint: Option<String>,
}

impl AwsInventory {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            default_region: "us-east-1".to_string(),
            endpoint: None,
        }
    }

    /// Send requests to a fixed endpoint instead of the regional EC2 host
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.trim_end_matches('/').to_string());
        self
    }
}

/// One `<reservationId>` per reservation in the EC2 XML response
pub fn count_reservations(xml: &str) -> usize {
    xml.matches("<reservationId>").count()
}

#[async_trait]
impl InventoryClient for AwsInventory {
    fn provider(&self) -> &str {
        "aws"
    }

    fn count_key(&self) -> &str {
        "instances"
    }

    async fn count(&self, profile: &Profile) -> Result<usize, StageError> {
        let access_key = credential(profile, "aws", "access_key")?;
        let secret_key = credential(profile, "aws", "secret_key")?;
        let region = profile
            .credentials
            .get("aws", "region")
            .unwrap_or(self.default_region.as_str());

        let host = format!("ec2.{region}.amazonaws.com");
        let query = canonical_query(&[("Action", "DescribeInstances"), ("Version", "2016-11-15")]);
        let signed = sign_get(
            &SigningParams {
                access_key,
                secret_key,
                region,
                service: "ec2",
                host: &host,
            },
            &query,
            Utc::now(),
        )?;

        let base = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{host}"));
        let url = format!("{base}/?{query}");
        debug!("AWS DescribeInstances in {}", region);

        let response = self
            .http
            .get(&url)
            .header("x-amz-date", signed.amz_date)
            .header("authorization", signed.authorization)
            .timeout(profile.timeout)
            .send()
            .await?;

        Ok(count_reservations(&checked_text(response).await?))
    }
}

/// GCP Compute aggregated instance list
pub struct GcpInventory {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GcpAggregatedList {
    #[serde(default)]
    items: BTreeMap<String, GcpScopedList>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcpScopedList {
    #[serde(default)]
    instances: Vec<Value>,
}

impl GcpInventory {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: "https://compute.googleapis.com/compute/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl InventoryClient for GcpInventory {
    fn provider(&self) -> &str {
        "gcp"
    }

    fn count_key(&self) -> &str {
        "instances"
    }

    async fn count(&self, profile: &Profile) -> Result<usize, StageError> {
        let project = credential(profile, "gcp", "project_id")?;
        let token = bearer_token(profile, "gcp", "GOOGLE_OAUTH_ACCESS_TOKEN")?;
        let url = format!("{}/projects/{}/aggregated/instances", self.base_url, project);

        let mut total = 0;
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .timeout(profile.timeout);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page)]);
            }

            let body = checked_text(request.send().await?).await?;
            let page: GcpAggregatedList = serde_json::from_str(&body)?;
            total += page
                .items
                .values()
                .map(|scope| scope.instances.len())
                .sum::<usize>();

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(total)
    }
}

/// Azure Resource Manager VM list across the subscription
pub struct AzureInventory {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AzureVmList {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

impl AzureInventory {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: "https://management.azure.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl InventoryClient for AzureInventory {
    fn provider(&self) -> &str {
        "azure"
    }

    fn count_key(&self) -> &str {
        "vms"
    }

    async fn count(&self, profile: &Profile) -> Result<usize, StageError> {
        let subscription = credential(profile, "azure", "subscription_id")?;
        let token = bearer_token(profile, "azure", "AZURE_ACCESS_TOKEN")?;

        let mut url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Compute/virtualMachines?api-version=2023-03-01",
            self.base_url, subscription
        );
        let mut total = 0;
        loop {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .timeout(profile.timeout)
                .send()
                .await?;
            let page: AzureVmList = serde_json::from_str(&checked_text(response).await?)?;
            total += page.value.len();

            match page.next_link {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        Ok(total)
    }
}

/// The cloud inventory stage
pub struct CloudRecon {
    clients: Vec<Arc<dyn InventoryClient>>,
}

impl CloudRecon {
    pub fn new(clients: Vec<Arc<dyn InventoryClient>>) -> Self {
        Self { clients }
    }

    /// AWS, GCP and Azure clients sharing one HTTP client
    pub fn with_default_clients(http: Client) -> Self {
        Self::new(vec![
            Arc::new(AwsInventory::new(http.clone())),
            Arc::new(GcpInventory::new(http.clone())),
            Arc::new(AzureInventory::new(http)),
        ])
    }
}

#[async_trait]
impl Stage for CloudRecon {
    fn name(&self) -> &str {
        "cloud"
    }

    async fn run(&self, target: &Target, profile: &Profile) -> Result<StageResult, StageError> {
        let enabled: Vec<_> = self
            .clients
            .iter()
            .filter(|client| profile.uses_provider(client.provider()))
            .collect();

        let counts = join_all(enabled.iter().map(|client| client.count(profile))).await;

        let mut providers = Map::new();
        for (client, count) in enabled.iter().zip(counts) {
            let entry = match count {
                Ok(n) => {
                    info!("{}: {} {} for {}", client.provider(), n, client.count_key(), target);
                    StageResult::new().with(client.count_key(), n).into_value()
                }
                Err(e) => {
                    error!("{} recon failed: {}", client.provider(), e);
                    StageResult::error(e.to_string()).into_value()
                }
            };
            providers.insert(client.provider().to_string(), entry);
        }

        Ok(StageResult::from(providers))
    }
}
