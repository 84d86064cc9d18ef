//! Core traits for cfddns
//!
//! - [`IpSource`]: Ask one external service for the public address
//! - [`DnsProvider`]: Read and update records via a provider API
//! - [`StateStore`]: Advisory cache of confirmed addresses

pub mod ip_source;
pub mod dns_provider;
pub mod state_store;

pub use ip_source::{IpSource, IpFamily};
pub use dns_provider::{DnsProvider, RecordSnapshot, UpdateRequest};
pub use state_store::{StateStore, CacheEntry, RecordKey};
