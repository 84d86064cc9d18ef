// # IP Source Trait
//
// Defines the interface for asking one external service for the host's
// public address.
//
// ## Implementations
//
// - HTTP echo services: `cfddns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::traits::{IpFamily, IpSource};
//
// let source = /* IpSource implementation */;
// if source.supports(IpFamily::V4) {
//     let ip = source.fetch(IpFamily::V4).await?;
// }
// ```
//
// Sources are polled in order by `IpResolver`; a source only answers for
// the families it declares.

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Family of a concrete address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    /// Whether `ip` belongs to this family
    pub fn matches(self, ip: &IpAddr) -> bool {
        Self::of(ip) == self
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => f.write_str("IPv4"),
            IpFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Trait for IP source implementations
///
/// One implementation wraps one external service. It performs a single
/// bounded request per call and reports failure as an error; fallback to the
/// next service and the per-service timeout are owned by `IpResolver`.
///
/// # Forbidden
///
/// - Retrying internally
/// - Caching answers across calls
/// - Returning an address of a family other than the one requested
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Fetch the current public address for `family`
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The address reported by the service
    /// - `Err(Error)`: Request failure, bad status, or malformed body
    async fn fetch(&self, family: IpFamily) -> Result<IpAddr, crate::Error>;

    /// Whether this source can answer for `family`
    fn supports(&self, family: IpFamily) -> bool;

    /// Name used in logs and in `ResolvedAddress::source`
    fn name(&self) -> &str;
}
