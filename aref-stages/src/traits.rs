//! Common traits for recon stages

use async_trait::async_trait;
use aref_core::{Profile, StageResult, Target};
use aref_net::NetError;
use thiserror::Error;

/// Errors a stage can raise out of `run`
///
/// A raised error means "this stage failed for this target": the scheduler
/// logs it and leaves the target out of that stage's results.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Stage unavailable: {0}")]
    Unavailable(String),
}

impl From<NetError> for StageError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::ClientBuild(msg) => Self::Config(msg),
            NetError::Status(status) => Self::Upstream {
                status,
                body: String::new(),
            },
            other => Self::Network(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StageError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Common interface for every recon, plugin and scoring stage
#[async_trait]
pub trait Stage: Send + Sync {
    /// Logical stage name (the key used in the aggregate record or registry)
    fn name(&self) -> &str;

    /// Run the stage against one target
    async fn run(&self, target: &Target, profile: &Profile) -> Result<StageResult, StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_error_mapping() {
        assert!(matches!(
            StageError::from(NetError::ClientBuild("bad proxy".into())),
            StageError::Config(_)
        ));
        assert!(matches!(
            StageError::from(NetError::Status(503)),
            StageError::Upstream { status: 503, .. }
        ));
        assert!(matches!(
            StageError::from(NetError::Dns("NXDOMAIN".into())),
            StageError::Network(_)
        ));
    }
}
