//! DNS lookups
//!
//! Thin wrapper over the tokio resolver with a per-query timeout.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    proto::rr::RecordType,
    TokioAsyncResolver,
};

use crate::NetError;

/// Record types collected for a target, in lookup order
pub const RECON_RECORD_TYPES: &[&str] = &["A", "MX", "NS", "TXT"];

/// Async DNS resolver with a fixed query timeout
#[derive(Clone)]
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
            timeout,
        }
    }

    /// Resolve one record type (`A`, `MX`, `NS`, `TXT`, ...) to its string forms
    pub async fn lookup(&self, name: &str, record_type: &str) -> Result<Vec<String>, NetError> {
        let rtype = RecordType::from_str(record_type)
            .map_err(|e| NetError::Invalid(format!("record type {record_type}: {e}")))?;

        let answer = tokio::time::timeout(self.timeout, self.resolver.lookup(name, rtype))
            .await
            .map_err(|_| NetError::Timeout(self.timeout))?
            .map_err(|e| NetError::Dns(e.to_string()))?;

        let records: Vec<String> = answer.iter().map(|rdata| rdata.to_string()).collect();
        debug!("{} {} -> {} records", name, record_type, records.len());
        Ok(records)
    }

    /// IPv4 addresses for a name
    pub async fn resolve_ipv4(&self, name: &str) -> Result<Vec<IpAddr>, NetError> {
        let answer = tokio::time::timeout(self.timeout, self.resolver.ipv4_lookup(name))
            .await
            .map_err(|_| NetError::Timeout(self.timeout))?
            .map_err(|e| NetError::Dns(e.to_string()))?;

        Ok(answer.iter().map(|a| IpAddr::V4(a.0)).collect())
    }

    /// PTR names for an address
    pub async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, NetError> {
        let answer = tokio::time::timeout(self.timeout, self.resolver.reverse_lookup(ip))
            .await
            .map_err(|_| NetError::Timeout(self.timeout))?
            .map_err(|e| NetError::Dns(e.to_string()))?;

        Ok(answer
            .iter()
            .map(|name| name.to_string().trim_end_matches('.').to_string())
            .collect())
    }
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver")
            .field("timeout", &self.timeout)
            .finish()
    }
}
