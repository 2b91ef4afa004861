//! AREF Core - Domain model for the recon orchestrator
//!
//! This crate provides the foundational primitives:
//! - Validated recon targets (domain or IPv4)
//! - Run profiles and provider credential sets
//! - Stage results and the per-target aggregate record
//! - A time-boxed on-disk cache for expensive lookups
//! - The encrypted credential vault

pub mod error;
pub mod target;
pub mod credentials;
pub mod profile;
pub mod record;
pub mod cache;
pub mod vault;
pub mod workspace;

pub use error::*;
pub use target::*;
pub use credentials::*;
pub use profile::*;
pub use record::*;
pub use cache::*;
pub use vault::*;
pub use workspace::*;

/// Default per-call network timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default worker count per scheduler invocation
pub const DEFAULT_THREADS: usize = 4;

/// Default cache TTL in seconds (one hour)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Environment variable holding the credential vault passphrase
pub const PASSPHRASE_ENV: &str = "CREDS_PASSPHRASE";

/// Environment variable holding the Shodan API key
pub const SHODAN_KEY_ENV: &str = "SHODAN_API_KEY";
