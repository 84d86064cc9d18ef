// # HTTP IP Source
//
// This crate provides HTTP echo-service IP sources for cfddns.
//
// ## Purpose
//
// Each configured echo service becomes one `IpSource`. The resolver in
// `cfddns-core` polls them in order and takes the first valid answer.
//
// ## Address Family
//
// An echo service reports the address the request arrived from, so the
// family of the answer follows the family of the connection. Every source
// keeps one client per supported family with its local address bound to
// `0.0.0.0` or `::`, which pins the socket to that family.
//
// ## Response Formats
//
// - Plain text: the trimmed body is the address
// - JSON: the configured field of the top-level object is the address

use async_trait::async_trait;
use cfddns_core::config::IpServiceConfig;
use cfddns_core::traits::{IpFamily, IpSource};
use cfddns_core::{Error, Result};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Default request timeout for echo services
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One echo service
pub struct HttpEchoSource {
    /// Name for logs
    name: String,

    /// URL to fetch the address from
    url: String,

    /// Field holding the address for JSON services
    json_field: Option<String>,

    /// Client bound to IPv4, when supported
    v4_client: Option<reqwest::Client>,

    /// Client bound to IPv6, when supported
    v6_client: Option<reqwest::Client>,
}

impl std::fmt::Debug for HttpEchoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEchoSource")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("json_field", &self.json_field)
            .field("ipv4", &self.v4_client.is_some())
            .field("ipv6", &self.v6_client.is_some())
            .finish()
    }
}

impl HttpEchoSource {
    /// Create a source from its configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Echo service settings
    /// - `timeout`: Request timeout, applied per family client
    ///
    /// # Errors
    ///
    /// `Error::Config` if an HTTP client cannot be built.
    pub fn from_config(config: &IpServiceConfig, timeout: Duration) -> Result<Self> {
        let name = config.display_name();

        let v4_client = config
            .supports(IpFamily::V4)
            .then(|| build_client(IpAddr::V4(Ipv4Addr::UNSPECIFIED), timeout, &name))
            .transpose()?;
        let v6_client = config
            .supports(IpFamily::V6)
            .then(|| build_client(IpAddr::V6(Ipv6Addr::UNSPECIFIED), timeout, &name))
            .transpose()?;

        Ok(Self {
            name,
            url: config.url.clone(),
            json_field: config.json_field.clone(),
            v4_client,
            v6_client,
        })
    }

    fn client(&self, family: IpFamily) -> Option<&reqwest::Client> {
        match family {
            IpFamily::V4 => self.v4_client.as_ref(),
            IpFamily::V6 => self.v6_client.as_ref(),
        }
    }
}

fn build_client(local: IpAddr, timeout: Duration, name: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .local_address(local)
        .user_agent(concat!("cfddns/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client for {}: {}", name, e)))
}

#[async_trait]
impl IpSource for HttpEchoSource {
    async fn fetch(&self, family: IpFamily) -> Result<IpAddr> {
        let client = self.client(family).ok_or_else(|| {
            Error::ip_source(&self.name, format!("{} is not supported", family))
        })?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::ip_source(&self.name, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ip_source(
                &self.name,
                format!("HTTP error: {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ip_source(&self.name, format!("Failed to read response: {}", e)))?;

        let ip = parse_body(self.json_field.as_deref(), &body)
            .map_err(|msg| Error::ip_source(&self.name, msg))?;

        tracing::debug!(source = %self.name, %family, address = %ip, "Echo service answered");
        Ok(ip)
    }

    fn supports(&self, family: IpFamily) -> bool {
        self.client(family).is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Extract the address from an echo-service response body
pub fn parse_body(json_field: Option<&str>, body: &str) -> std::result::Result<IpAddr, String> {
    let text = match json_field {
        None => body.trim().to_string(),
        Some(field) => {
            let value: serde_json::Value = serde_json::from_str(body)
                .map_err(|e| format!("Invalid JSON response: {}", e))?;
            value
                .get(field)
                .and_then(serde_json::Value::as_str)
                .map(|s| s.trim().to_string())
                .ok_or_else(|| format!("Field `{}` missing or not a string", field))?
        }
    };

    text.parse()
        .map_err(|_| format!("Invalid IP address: {:?}", text.chars().take(64).collect::<String>()))
}

/// Build sources for every configured echo service, in order
pub fn sources_from_config(
    services: &[IpServiceConfig],
    timeout: Duration,
) -> Result<Vec<Box<dyn IpSource>>> {
    services
        .iter()
        .map(|service| {
            HttpEchoSource::from_config(service, timeout).map(|s| Box::new(s) as Box<dyn IpSource>)
        })
        .collect()
}
