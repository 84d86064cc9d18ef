// # DNS Provider Trait
//
// Defines the interface for reading and updating existing address records
// via a provider API.
//
// ## Implementations
//
// - Cloudflare: `cfddns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::traits::{DnsProvider, UpdateRequest};
// use cfddns_core::config::RecordType;
//
// let snapshot = provider.get_record("zone", "vpn.example.com", RecordType::A).await?;
// provider.update_record("zone", &UpdateRequest {
//     record_id: snapshot.record_id,
//     fqdn: "vpn.example.com".to_string(),
//     record_type: RecordType::A,
//     address: "1.2.3.4".parse()?,
//     ttl: None,
//     proxied: None,
// }).await?;
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::RecordType;

/// Provider-side state of a record at read time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSnapshot {
    /// The record ID (provider-specific)
    pub record_id: String,
    /// Record content exactly as the provider returned it
    pub current_address: String,
    /// Time-to-live currently set
    pub current_ttl: u32,
    /// Proxy flag currently set
    pub current_proxied: bool,
}

impl RecordSnapshot {
    /// Current content parsed as an address, if it is one
    pub fn parsed_address(&self) -> Option<IpAddr> {
        self.current_address.trim().parse().ok()
    }
}

/// A single record update
///
/// `ttl` and `proxied` are only sent when set; omitted fields keep the
/// provider's current values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Provider record ID from the preceding read
    pub record_id: String,
    /// Fully-qualified record name
    pub fqdn: String,
    /// A or AAAA
    pub record_type: RecordType,
    /// New record content
    pub address: IpAddr,
    /// TTL override
    pub ttl: Option<u32>,
    /// Proxy flag override
    pub proxied: Option<bool>,
}

/// Trait for DNS provider implementations
///
/// Implementations are single-shot: one API call per method invocation.
/// Errors must be classified so the engine can decide what to retry:
///
/// - `Error::Authentication`: bad token or missing permission
/// - `Error::NotFound`: zone or record does not exist
/// - `Error::Transient` / `Error::RateLimited`: network failure, 5xx, 429
/// - `Error::Provider`: any other rejection
///
/// Retry, backoff, caching and the decision whether to update are owned by
/// the `Reconciler`.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Read the current state of an existing record
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Provider zone ID
    /// - `fqdn`: Fully-qualified record name
    /// - `record_type`: A or AAAA
    ///
    /// # Returns
    ///
    /// - `Ok(RecordSnapshot)`: The record's current state
    /// - `Err(Error::NotFound)`: The record does not exist
    async fn get_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: RecordType,
    ) -> Result<RecordSnapshot, crate::Error>;

    /// Update an existing record
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Provider zone ID
    /// - `request`: Record ID, new address and optional overrides
    async fn update_record(&self, zone_id: &str, request: &UpdateRequest)
    -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
