//! Provider credentials handed to stages through the profile

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{CoreError, Result};

/// Fields each known cloud provider must carry
pub const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    ("aws", &["access_key", "secret_key"]),
    ("gcp", &["project_id"]),
    ("azure", &["subscription_id"]),
];

/// Required fields for a provider, if it is a known one
pub fn required_fields(provider: &str) -> Option<&'static [&'static str]> {
    REQUIRED_FIELDS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, fields)| *fields)
}

/// Provider name -> field name -> value
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet {
    providers: BTreeMap<String, BTreeMap<String, String>>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the plaintext credentials document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CoreError::Config(format!("Malformed credentials document: {e}")))
    }

    pub fn with_field(mut self, provider: &str, field: &str, value: &str) -> Self {
        self.providers
            .entry(provider.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        self
    }

    pub fn provider(&self, provider: &str) -> Option<&BTreeMap<String, String>> {
        self.providers.get(provider)
    }

    /// Non-empty field value for a provider
    pub fn get(&self, provider: &str, field: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Fail fast on incomplete credentials.
    ///
    /// Every enabled provider must be present and complete, and every known
    /// provider that is present at all must be complete too.
    pub fn validate(&self, enabled: &BTreeSet<String>) -> Result<()> {
        let present: BTreeSet<&str> = self.providers().collect();
        let to_check: BTreeSet<&str> = enabled
            .iter()
            .map(String::as_str)
            .chain(present.iter().copied())
            .collect();

        for provider in to_check {
            let Some(fields) = required_fields(provider) else {
                continue;
            };
            for field in fields {
                if self.get(provider, field).is_none() {
                    return Err(CoreError::MissingCredential {
                        provider: provider.to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

// Secrets never reach logs
impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.providers
                    .iter()
                    .map(|(provider, fields)| (provider, fields.keys().collect::<Vec<_>>())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_parse_and_get() {
        let creds = CredentialSet::from_json(
            br#"{"aws": {"access_key": "AKIA", "secret_key": "s3cr3t"}, "gcp": {"project_id": ""}}"#,
        )
        .unwrap();

        assert_eq!(creds.get("aws", "access_key"), Some("AKIA"));
        assert_eq!(creds.get("gcp", "project_id"), None);
        assert!(creds.contains("gcp"));
    }

    #[test]
    fn test_validate_enabled_provider_missing() {
        let creds = CredentialSet::new().with_field("aws", "access_key", "AKIA");
        let err = creds.validate(&enabled(&["aws"])).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingCredential { ref provider, ref field } if provider == "aws" && field == "secret_key"
        ));

        let err = CredentialSet::new().validate(&enabled(&["azure"])).unwrap_err();
        assert_eq!(err.to_string(), "Missing subscription_id in azure creds");
    }

    #[test]
    fn test_validate_present_but_disabled_provider() {
        let creds = CredentialSet::new().with_field("gcp", "project_id", "");
        assert!(creds.validate(&enabled(&[])).is_err());
    }

    #[test]
    fn test_validate_complete() {
        let creds = CredentialSet::new()
            .with_field("aws", "access_key", "AKIA")
            .with_field("aws", "secret_key", "s3cr3t")
            .with_field("custom", "token", "");
        assert!(creds.validate(&enabled(&["aws"])).is_ok());
    }

    #[test]
    fn test_debug_hides_values() {
        let creds = CredentialSet::new().with_field("aws", "secret_key", "s3cr3t");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("secret_key"));
        assert!(!rendered.contains("s3cr3t"));
    }
}
