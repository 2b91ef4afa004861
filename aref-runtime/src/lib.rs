//! AREF Runtime
//!
//! Runs recon stages over a target set and merges their output:
//! - [`run_parallel`]: bounded worker pool with per-target error isolation
//! - [`Orchestrator`]: stage gating and the per-target aggregate record
//! - [`StatusPrinter`]: terse console status lines

pub mod scheduler;
pub mod status;
pub mod orchestrator;

pub use scheduler::*;
pub use status::*;
pub use orchestrator::*;
