//! Built-in plugins
//!
//! - `http_headers`: security header audit of the target's web root
//! - `reverse_dns`: PTR names for each of the target's IPv4 addresses

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use aref_core::{Profile, StageResult, Target};
use aref_net::{fetch_page, DnsResolver};

use crate::{Stage, StageError};

/// Response headers a hardened site is expected to send
pub const SECURITY_HEADERS: &[&str] = &[
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
    "referrer-policy",
    "permissions-policy",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderAudit {
    pub url: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

/// Split [`SECURITY_HEADERS`] into present and missing for a header list
pub fn audit_headers(url: &str, status: u16, headers: &[(String, String)]) -> HeaderAudit {
    let has = |name: &str| headers.iter().any(|(h, _)| h.eq_ignore_ascii_case(name));
    let (present, missing): (Vec<&str>, Vec<&str>) =
        SECURITY_HEADERS.iter().copied().partition(|name| has(*name));

    HeaderAudit {
        url: url.to_string(),
        status,
        server: headers
            .iter()
            .find(|(h, _)| h.eq_ignore_ascii_case("server"))
            .map(|(_, v)| v.clone()),
        present: present.into_iter().map(str::to_string).collect(),
        missing: missing.into_iter().map(str::to_string).collect(),
    }
}

pub struct HttpHeadersPlugin {
    http: Client,
}

impl HttpHeadersPlugin {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Stage for HttpHeadersPlugin {
    fn name(&self) -> &str {
        "http_headers"
    }

    async fn run(&self, target: &Target, _profile: &Profile) -> Result<StageResult, StageError> {
        let url = format!("http://{target}");
        let page = fetch_page(&self.http, &url).await?;
        let audit = audit_headers(&page.url, page.status, &page.headers);
        debug!("{}: {} security headers missing", target, audit.missing.len());
        Ok(StageResult::from_serialize(&audit)?)
    }
}

pub struct ReverseDnsPlugin {
    resolver: DnsResolver,
}

impl ReverseDnsPlugin {
    pub fn new(resolver: DnsResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for ReverseDnsPlugin {
    fn name(&self) -> &str {
        "reverse_dns"
    }

    async fn run(&self, target: &Target, _profile: &Profile) -> Result<StageResult, StageError> {
        let addresses = match target.ipv4() {
            Some(ip) => vec![IpAddr::V4(ip)],
            None => self.resolver.resolve_ipv4(target.as_str()).await?,
        };

        let mut ptr: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for ip in addresses {
            let names = match self.resolver.reverse(ip).await {
                Ok(names) => names,
                Err(e) => {
                    warn!("PTR lookup failed for {}: {}", ip, e);
                    Vec::new()
                }
            };
            ptr.insert(ip.to_string(), names);
        }

        Ok(StageResult::new().with("addresses", serde_json::to_value(ptr)?))
    }
}

/// The plugins shipped with the binary
pub fn builtin_plugins(http: Client, resolver: DnsResolver) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(HttpHeadersPlugin::new(http)),
        Arc::new(ReverseDnsPlugin::new(resolver)),
    ]
}
