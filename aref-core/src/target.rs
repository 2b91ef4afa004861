//! Recon targets and the syntactic target gate
//!
//! A [`Target`] can only be built through [`Target::parse`], so holding one
//! means the string already passed validation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use crate::{CoreError, Result};

// Labels of 1-62 alphanumerics/hyphens without edge hyphens, alphabetic TLD
static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,60}[A-Za-z0-9])?\.)+[A-Za-z]{2,}$").unwrap()
});

static IPV4_SHAPE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{1,3}(?:\.[0-9]{1,3}){3}$").unwrap()
});

/// Kind of a validated target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Domain,
    Ipv4,
}

/// A validated recon target (domain name or IPv4 address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct Target {
    value: String,
    kind: TargetKind,
}

impl Target {
    /// Validate a raw string as a domain or IPv4 target
    pub fn parse(raw: &str) -> Result<Self> {
        if IPV4_SHAPE_REGEX.is_match(raw) {
            // Octets are range-checked, not just shape-matched
            if raw.split('.').all(|octet| octet.parse::<u8>().is_ok()) {
                return Ok(Self {
                    value: raw.to_string(),
                    kind: TargetKind::Ipv4,
                });
            }
            return Err(CoreError::InvalidTarget(raw.to_string()));
        }

        if DOMAIN_REGEX.is_match(raw) {
            return Ok(Self {
                value: raw.to_string(),
                kind: TargetKind::Domain,
            });
        }

        Err(CoreError::InvalidTarget(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn is_ip(&self) -> bool {
        self.kind == TargetKind::Ipv4
    }

    /// The target as an address, when it is an IPv4 literal
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if self.kind != TargetKind::Ipv4 {
            return None;
        }
        let octets: Vec<u8> = self
            .value
            .split('.')
            .filter_map(|octet| octet.parse().ok())
            .collect();
        match octets[..] {
            [a, b, c, d] => Some(Ipv4Addr::new(a, b, c, d)),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.value
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl std::str::FromStr for Target {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
