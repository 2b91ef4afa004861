//! AREF Network Layer
//!
//! Network primitives shared by the recon stages:
//! - HTTP client construction (timeouts, optional proxy, user agent rotation)
//! - DNS record and reverse lookups
//! - TCP connect probing over a port range
//! - Web page fetching with link and title extraction

pub mod client;
pub mod dns;
pub mod ports;
pub mod page;

pub use client::*;
pub use dns::*;
pub use ports::*;
pub use page::*;
