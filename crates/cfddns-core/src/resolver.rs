//! Public address resolution with echo-service fallback
//!
//! [`IpResolver`] polls its sources in order, skipping those that do not
//! support the requested family, and returns the first valid answer. Each
//! poll is bounded by a timeout. When every source fails the family is
//! unreachable for this run.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::traits::{IpFamily, IpSource};

/// Default per-source timeout
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Address resolved for one family during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// Address family
    pub family: IpFamily,
    /// The public address
    pub address: IpAddr,
    /// Name of the source that answered
    pub source: String,
}

/// Ordered list of IP sources polled with fallback
pub struct IpResolver {
    sources: Vec<Box<dyn IpSource>>,
    timeout: Duration,
}

impl fmt::Debug for IpResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("IpResolver")
            .field("sources", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl IpResolver {
    /// Create a resolver over `sources`, polled in the given order
    pub fn new(sources: Vec<Box<dyn IpSource>>) -> Self {
        Self {
            sources,
            timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    /// Set the per-source timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of configured sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources are configured
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Resolve the public address for `family`
    ///
    /// # Errors
    ///
    /// `Error::NoProviderReachable` when no supporting source returned a
    /// valid address of the requested family.
    pub async fn resolve(&self, family: IpFamily) -> Result<ResolvedAddress> {
        for source in self.sources.iter().filter(|s| s.supports(family)) {
            debug!(source = source.name(), %family, "Querying IP source");

            let outcome = tokio::time::timeout(self.timeout, source.fetch(family)).await;
            let address = match outcome {
                Ok(Ok(address)) => address,
                Ok(Err(e)) => {
                    warn!(source = source.name(), %family, error = %e, "Failed to get IP from source");
                    continue;
                }
                Err(_) => {
                    warn!(
                        source = source.name(),
                        %family,
                        timeout = ?self.timeout,
                        "IP source timed out"
                    );
                    continue;
                }
            };

            if !family.matches(&address) {
                warn!(
                    source = source.name(),
                    %family,
                    address = %address,
                    "IP source returned an address of the wrong family"
                );
                continue;
            }

            info!(source = source.name(), %family, address = %address, "Resolved public address");
            return Ok(ResolvedAddress {
                family,
                address,
                source: source.name().to_string(),
            });
        }

        Err(Error::NoProviderReachable { family })
    }
}
