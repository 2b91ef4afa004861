//! Run profiles
//!
//! Profiles are loaded from `config/profiles.json`, a map of profile name to
//! settings. The resolved [`Profile`] is immutable for the whole run and is
//! shared read-only between concurrent stage executions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::{
    CoreError, CredentialSet, Result, DEFAULT_CACHE_TTL_SECS, DEFAULT_THREADS,
    DEFAULT_TIMEOUT_SECS,
};

/// Name of the fallback profile
pub const DEFAULT_PROFILE: &str = "default";

/// Profile settings as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Per-call network timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Worker count per scheduler invocation
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Cloud providers to enumerate (aws, gcp, azure)
    #[serde(default)]
    pub cloud_providers: BTreeSet<String>,
    /// Threat-intel feeds for the scoring stage (cve, exploitdb)
    #[serde(default)]
    pub ml_feeds: BTreeSet<String>,
    /// Optional proxy URL for outbound HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            threads: DEFAULT_THREADS,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
            cloud_providers: BTreeSet::new(),
            ml_feeds: BTreeSet::new(),
            proxy: None,
        }
    }
}

/// Every profile defined in `profiles.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileSet {
    profiles: BTreeMap<String, ProfileConfig>,
}

impl ProfileSet {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| CoreError::Config(format!("Failed to parse profiles: {e}")))
    }

    pub fn insert(&mut self, name: &str, config: ProfileConfig) {
        self.profiles.insert(name.to_string(), config);
    }

    /// Resolve a profile by name, falling back to `default`, then to built-in defaults
    pub fn resolve(&self, name: &str) -> ProfileConfig {
        if let Some(config) = self.profiles.get(name) {
            return config.clone();
        }
        warn!("Profile '{}' not found, using '{}'", name, DEFAULT_PROFILE);
        self.profiles
            .get(DEFAULT_PROFILE)
            .cloned()
            .unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

/// The resolved, immutable profile for one run
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub timeout: Duration,
    pub threads: usize,
    pub cache_ttl: Duration,
    pub cloud_providers: BTreeSet<String>,
    pub ml_feeds: BTreeSet<String>,
    pub proxy: Option<String>,
    pub credentials: CredentialSet,
}

impl Profile {
    /// Build a run profile, checking credentials before any stage sees them
    pub fn new(name: &str, config: ProfileConfig, credentials: CredentialSet) -> Result<Self> {
        if config.threads == 0 {
            return Err(CoreError::Config(format!(
                "Profile '{name}' must use at least one thread"
            )));
        }
        credentials.validate(&config.cloud_providers)?;

        Ok(Self {
            name: name.to_string(),
            timeout: Duration::from_secs(config.timeout),
            threads: config.threads,
            cache_ttl: Duration::from_secs(config.cache_ttl),
            cloud_providers: config.cloud_providers,
            ml_feeds: config.ml_feeds,
            proxy: config.proxy,
            credentials,
        })
    }

    pub fn uses_provider(&self, provider: &str) -> bool {
        self.cloud_providers.contains(provider)
    }
}

impl Default for Profile {
    fn default() -> Self {
        let config = ProfileConfig::default();
        Self {
            name: DEFAULT_PROFILE.to_string(),
            timeout: Duration::from_secs(config.timeout),
            threads: config.threads,
            cache_ttl: Duration::from_secs(config.cache_ttl),
            cloud_providers: config.cloud_providers,
            ml_feeds: config.ml_feeds,
            proxy: config.proxy,
            credentials: CredentialSet::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: &str = r#"{
        "default": {"timeout": 5, "threads": 4, "cache_ttl": 3600},
        "stealth": {"timeout": 10, "threads": 1, "cache_ttl": 86400,
                    "cloud_providers": ["aws"], "ml_feeds": ["cve"]}
    }"#;

    #[test]
    fn test_resolve_named_profile() {
        let set = ProfileSet::from_json(PROFILES).unwrap();
        let stealth = set.resolve("stealth");
        assert_eq!(stealth.threads, 1);
        assert!(stealth.cloud_providers.contains("aws"));
        assert!(stealth.ml_feeds.contains("cve"));
    }

    #[test]
    fn test_unknown_profile_falls_back_to_default() {
        let set = ProfileSet::from_json(PROFILES).unwrap();
        assert_eq!(set.resolve("missing").timeout, 5);

        let empty = ProfileSet::default();
        assert_eq!(empty.resolve("missing"), ProfileConfig::default());
    }

    #[test]
    fn test_field_defaults() {
        let set = ProfileSet::from_json(r#"{"default": {}}"#).unwrap();
        let config = set.resolve("default");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.threads, DEFAULT_THREADS);
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL_SECS);
    }

    #[test]
    fn test_profile_checks_credentials() {
        let set = ProfileSet::from_json(PROFILES).unwrap();
        let err = Profile::new("stealth", set.resolve("stealth"), CredentialSet::new()).unwrap_err();
        assert!(matches!(err, CoreError::MissingCredential { .. }));

        let creds = CredentialSet::new()
            .with_field("aws", "access_key", "AKIA")
            .with_field("aws", "secret_key", "s3cr3t");
        let profile = Profile::new("stealth", set.resolve("stealth"), creds).unwrap();
        assert_eq!(profile.timeout, Duration::from_secs(10));
        assert!(profile.uses_provider("aws"));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = ProfileConfig {
            threads: 0,
            ..Default::default()
        };
        assert!(Profile::new("broken", config, CredentialSet::new()).is_err());
    }
}
