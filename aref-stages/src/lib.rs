//! AREF Stages
//!
//! Independently fallible recon stages behind one [`Stage`] interface:
//! - **Passive**: Shodan host intel (cached), WHOIS, DNS records
//! - **Active**: TCP port probing and a web crawl of the target
//! - **Cloud**: instance inventory counts per cloud provider
//! - **ML**: threat-intel feeds plus a vulnerability score from passive data
//! - **Plugins**: extra stages registered by name in a [`PluginRegistry`]
//!
//! The [`ReportEmitter`] renders the aggregate record once the run is over.

pub mod traits;
pub mod passive;
pub mod active;
pub mod cloud;
pub mod sigv4;
pub mod ml;
pub mod registry;
pub mod plugins;
pub mod report;

pub use traits::*;
pub use passive::*;
pub use active::*;
pub use cloud::*;
pub use ml::*;
pub use registry::*;
pub use plugins::*;
pub use report::*;
