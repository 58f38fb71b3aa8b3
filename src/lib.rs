// Allow dead code for public API functions that may not be used internally
// but are part of the library's exposed interface
#![allow(dead_code)]

pub mod asn_db;
pub mod browser;
pub mod config;
pub mod dns;
pub mod net_info;
pub mod orchestrator;
pub mod rdap;
pub mod store;

pub use asn_db::{AsnDatabase, MatchPolicy};
pub use browser::{BrowserDiscovery, Discovery};
pub use config::AppConfig;
pub use dns::{DnsResolver, Resolver};
pub use net_info::{CidrSource, NetworkInfoLookup};
pub use orchestrator::{Orchestrator, RunSummary};
pub use rdap::RdapClient;
pub use store::{OwnershipRecord, OwnershipReport, SnapshotStore};
