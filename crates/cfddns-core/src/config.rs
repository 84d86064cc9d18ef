//! Configuration types for cfddns
//!
//! The configuration file comes in two shapes: the single-domain shorthand
//! (`domain`, `zone_id`, `subdomains` at the top level) and the multi-domain
//! form (a `domains` array). [`RawConfig`] accepts both, [`ConfigShape`] names
//! which one was found, and [`RawConfig::normalize`] turns either into one
//! canonical [`Config`]. Nothing past the normalizer looks at the shape.
//!
//! ```json
//! {
//!   "api_token": "...",
//!   "domains": [
//!     { "domain": "example.com", "zone_id": "abc", "subdomains": ["@", "vpn"], "ipv6": true }
//!   ],
//!   "engine": { "max_attempts": 4 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::BackoffPolicy;
use crate::traits::{IpFamily, RecordKey};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cloudflare-ddns/config.json";

/// Default cache file location
pub const DEFAULT_CACHE_PATH: &str = "/var/cache/cloudflare-ddns/state.json";

/// Cloudflare API base URL
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Subdomain label that denotes the zone apex
pub const APEX: &str = "@";

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A record (IPv4)
    #[serde(rename = "A")]
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Wire name used by DNS providers
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// Address family this record type carries
    pub fn family(self) -> IpFamily {
        match self {
            RecordType::A => IpFamily::V4,
            RecordType::Aaaa => IpFamily::V6,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain fields exactly as written in the file
///
/// Every field is optional here so that a missing one can be reported by
/// name instead of as a generic deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDomainConfig {
    pub domain: Option<String>,
    pub zone_id: Option<String>,
    pub subdomains: Option<Vec<String>>,
    pub ttl: Option<u32>,
    pub proxied: Option<bool>,
    pub ipv6: Option<bool>,
}

impl RawDomainConfig {
    fn is_empty(&self) -> bool {
        self.domain.is_none() && self.zone_id.is_none() && self.subdomains.is_none()
    }
}

/// Configuration file as deserialized, before normalization
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub api_token: Option<String>,

    /// Present only in the multi-domain shape
    #[serde(default)]
    pub domains: Option<Vec<RawDomainConfig>>,

    /// Top-level domain fields of the single-domain shape
    #[serde(flatten)]
    pub single: RawDomainConfig,

    /// Echo services to poll, in order; defaults when absent
    #[serde(default)]
    pub ip_services: Option<Vec<IpServiceConfig>>,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Which configuration shape the file used
#[derive(Debug, Clone)]
pub enum ConfigShape {
    /// Top-level `domain`/`zone_id`/`subdomains`
    Single(RawDomainConfig),
    /// `domains` array
    Multi(Vec<RawDomainConfig>),
}

impl RawConfig {
    /// Parse a configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Invalid JSON in config file: {}", e)))
    }

    /// Detect the configuration shape
    ///
    /// The presence of `domains` selects the multi-domain shape.
    pub fn shape(&self) -> ConfigShape {
        match &self.domains {
            Some(domains) => ConfigShape::Multi(domains.clone()),
            None => ConfigShape::Single(self.single.clone()),
        }
    }

    /// Validate and convert into the canonical [`Config`]
    ///
    /// # Errors
    ///
    /// `Error::Config` naming the first missing or invalid field.
    pub fn normalize(self) -> Result<Config> {
        let api_token = require(self.api_token.clone(), "api_token")?;

        let domains: Vec<(String, RawDomainConfig)> = match self.shape() {
            ConfigShape::Single(domain) => {
                tracing::info!("Using single-domain configuration format");
                vec![(String::new(), domain)]
            }
            ConfigShape::Multi(domains) => {
                tracing::info!("Using multi-domain configuration format");
                if !self.single.is_empty() {
                    tracing::warn!("Top-level domain fields are ignored because `domains` is set");
                }
                if domains.is_empty() {
                    return Err(Error::config("`domains` must contain at least one domain"));
                }
                domains
                    .into_iter()
                    .enumerate()
                    .map(|(i, d)| (format!("domains[{}].", i), d))
                    .collect()
            }
        };

        let domains = domains
            .into_iter()
            .map(|(prefix, raw)| DomainConfig::from_raw(raw, &prefix))
            .collect::<Result<Vec<_>>>()?;

        let ip_services = self.ip_services.unwrap_or_else(IpServiceConfig::defaults);

        let config = Config {
            api_token,
            domains,
            ip_services,
            engine: self.engine,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Normalize a raw configuration straight into its target records
pub fn normalize(raw: RawConfig) -> Result<Vec<TargetRecord>> {
    Ok(raw.normalize()?.target_records())
}

/// Canonical configuration, immutable after load
#[derive(Clone)]
pub struct Config {
    /// Provider API token; never logged
    pub api_token: String,

    /// Managed domains in source order
    pub domains: Vec<DomainConfig>,

    /// Echo services polled in order
    pub ip_services: Vec<IpServiceConfig>,

    /// Engine settings
    pub engine: EngineConfig,
}

// The token must not leak through `{:?}`
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &"<REDACTED>")
            .field("domains", &self.domains)
            .field("ip_services", &self.ip_services)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Config {
    /// Load and normalize a configuration file
    ///
    /// Any failure here is fatal and happens before network activity.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json_str(&content)
    }

    /// Parse and normalize a configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        RawConfig::from_json_str(json)?.normalize()
    }

    /// Expand domains into target records
    ///
    /// One A record per subdomain, plus one AAAA record when the domain has
    /// `ipv6` enabled. Order follows the source: domains, then subdomains,
    /// A before AAAA. Duplicate (fqdn, type) pairs keep their first
    /// occurrence.
    pub fn target_records(&self) -> Vec<TargetRecord> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for domain in &self.domains {
            for subdomain in &domain.subdomains {
                let fqdn = domain.fqdn(subdomain);
                let mut types = vec![RecordType::A];
                if domain.ipv6 {
                    types.push(RecordType::Aaaa);
                }

                for record_type in types {
                    if !seen.insert((fqdn.clone(), record_type)) {
                        tracing::debug!("Duplicate record {} ({}) ignored", fqdn, record_type);
                        continue;
                    }
                    targets.push(TargetRecord {
                        fqdn: fqdn.clone(),
                        zone_id: domain.zone_id.clone(),
                        record_type,
                        ttl: domain.ttl,
                        proxied: domain.proxied,
                    });
                }
            }
        }

        targets
    }

    /// Families that at least one domain needs
    pub fn required_families(&self) -> Vec<IpFamily> {
        let mut families = vec![IpFamily::V4];
        if self.domains.iter().any(|d| d.ipv6) {
            families.push(IpFamily::V6);
        }
        families
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(Error::config("missing required field `api_token`"));
        }

        if self.domains.is_empty() {
            return Err(Error::config("No domains configured"));
        }

        if self.ip_services.is_empty() {
            return Err(Error::config("`ip_services` cannot be empty"));
        }

        for (i, service) in self.ip_services.iter().enumerate() {
            service.validate(i)?;
        }

        for family in self.required_families() {
            if !self.ip_services.iter().any(|s| s.supports(family)) {
                return Err(Error::config(format!(
                    "No configured IP service supports {}",
                    family
                )));
            }
        }

        self.engine.validate()
    }
}

/// One managed domain after normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    /// Registered domain, lower-cased, without trailing dot
    pub domain: String,
    /// Provider zone ID
    pub zone_id: String,
    /// Subdomain labels in source order, deduplicated; `@` is the apex
    pub subdomains: Vec<String>,
    /// TTL override; `None` preserves the provider value
    pub ttl: Option<u32>,
    /// Proxy override; `None` preserves the provider value
    pub proxied: Option<bool>,
    /// Also manage AAAA records
    pub ipv6: bool,
}

impl DomainConfig {
    fn from_raw(raw: RawDomainConfig, prefix: &str) -> Result<Self> {
        let field = |name: &str| format!("{}{}", prefix, name);

        let domain = require(raw.domain, &field("domain"))?
            .trim()
            .trim_end_matches('.')
            .to_ascii_lowercase();
        validate_domain_name(&domain)
            .map_err(|e| Error::config(format!("{}: {}", field("domain"), e)))?;

        let zone_id = require(raw.zone_id, &field("zone_id"))?.trim().to_string();

        let raw_subdomains = raw.subdomains.unwrap_or_default();
        let mut subdomains: Vec<String> = Vec::new();
        for subdomain in raw_subdomains {
            let subdomain = subdomain.trim().trim_end_matches('.').to_ascii_lowercase();
            if subdomain.is_empty() {
                return Err(Error::config(format!(
                    "{} contains an empty entry",
                    field("subdomains")
                )));
            }
            if subdomain != APEX {
                validate_subdomain(&subdomain).map_err(|e| {
                    Error::config(format!("{}: {}", field("subdomains"), e))
                })?;
            }
            if !subdomains.contains(&subdomain) {
                subdomains.push(subdomain);
            }
        }
        if subdomains.is_empty() {
            return Err(Error::config(format!(
                "missing required field `{}` (must list at least one subdomain)",
                field("subdomains")
            )));
        }

        if let Some(ttl) = raw.ttl
            && ttl != 1
            && !(30..=86400).contains(&ttl)
        {
            return Err(Error::config(format!(
                "{} must be 1 (automatic) or between 30 and 86400 seconds. Got: {}",
                field("ttl"),
                ttl
            )));
        }

        Ok(Self {
            domain,
            zone_id,
            subdomains,
            ttl: raw.ttl,
            proxied: raw.proxied,
            ipv6: raw.ipv6.unwrap_or(false),
        })
    }

    /// Fully-qualified name for a subdomain of this domain
    pub fn fqdn(&self, subdomain: &str) -> String {
        if subdomain == APEX {
            self.domain.clone()
        } else {
            format!("{}.{}", subdomain, self.domain)
        }
    }
}

/// One record the reconciler manages
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetRecord {
    /// Fully-qualified name
    pub fqdn: String,
    /// Provider zone ID
    pub zone_id: String,
    /// A or AAAA
    pub record_type: RecordType,
    /// Desired TTL, `None` to keep the provider value
    pub ttl: Option<u32>,
    /// Desired proxy flag, `None` to keep the provider value
    pub proxied: Option<bool>,
}

impl TargetRecord {
    /// Cache key for this record
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.fqdn.clone(), self.record_type)
    }

    /// Family the record carries
    pub fn family(&self) -> IpFamily {
        self.record_type.family()
    }
}

/// An external IP echo service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpServiceConfig {
    /// Name for logs; defaults to the URL host
    #[serde(default)]
    pub name: Option<String>,

    /// Endpoint URL
    pub url: String,

    /// JSON field holding the address; plain-text body when absent
    #[serde(default)]
    pub json_field: Option<String>,

    /// Service can answer over IPv4
    #[serde(default = "default_true")]
    pub ipv4: bool,

    /// Service can answer over IPv6
    #[serde(default = "default_true")]
    pub ipv6: bool,
}

impl IpServiceConfig {
    fn new(url: &str, json_field: Option<&str>, ipv4: bool, ipv6: bool) -> Self {
        Self {
            name: None,
            url: url.to_string(),
            json_field: json_field.map(str::to_string),
            ipv4,
            ipv6,
        }
    }

    /// Built-in echo services, in polling order
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("https://api.ipify.org?format=json", Some("ip"), true, false),
            Self::new("https://ipinfo.io/json", Some("ip"), true, false),
            Self::new("https://api.ip.sb/ip", None, true, true),
            Self::new("https://checkip.amazonaws.com", None, true, false),
            Self::new("https://api64.ipify.org?format=json", Some("ip"), false, true),
            Self::new("https://ipv6.icanhazip.com", None, false, true),
        ]
    }

    /// Whether this service answers for `family`
    pub fn supports(&self, family: IpFamily) -> bool {
        match family {
            IpFamily::V4 => self.ipv4,
            IpFamily::V6 => self.ipv6,
        }
    }

    /// Name used in logs
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.url
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split(['/', '?']).next())
            .filter(|host| !host.is_empty())
            .unwrap_or(self.url.as_str())
            .to_string()
    }

    fn validate(&self, index: usize) -> Result<()> {
        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(Error::config(format!(
                "ip_services[{}].url must use HTTP or HTTPS scheme. Got: {}",
                index, self.url
            )));
        }
        if !self.ipv4 && !self.ipv6 {
            return Err(Error::config(format!(
                "ip_services[{}] must support at least one of ipv4/ipv6",
                index
            )));
        }
        Ok(())
    }
}

/// How far the reconciler may trust the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Always read the live record before deciding
    #[default]
    Always,
    /// Skip the read when a fresh cache entry matches the resolved address
    TrustCache,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Total attempts per provider call when errors are transient
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (in milliseconds); doubles per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single retry delay (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Randomization factor applied to each delay (0.2 = ±20%)
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Longest rate-limit `Retry-After` that is waited out (in seconds)
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,

    /// Pause between records that called the provider (in milliseconds)
    #[serde(default)]
    pub pace_ms: u64,

    /// Timeout for one echo-service request (in seconds)
    #[serde(default = "default_ip_timeout_secs")]
    pub ip_timeout_secs: u64,

    /// Timeout for one provider request (in seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Cache verification mode
    #[serde(default)]
    pub verify: VerifyMode,

    /// Oldest cache entry still trusted in `trust_cache` mode (in seconds)
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,

    /// Provider API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            max_retry_after_secs: default_max_retry_after_secs(),
            pace_ms: 0,
            ip_timeout_secs: default_ip_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            verify: VerifyMode::default(),
            cache_max_age_secs: default_cache_max_age_secs(),
            api_base: default_api_base(),
        }
    }
}

impl EngineConfig {
    /// Validate numeric ranges
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(Error::config(format!(
                "engine.max_attempts must be between 1 and 10. Got: {}",
                self.max_attempts
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::config(format!(
                "engine.max_delay_ms ({}) must not be below engine.base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::config(format!(
                "engine.jitter must be between 0.0 and 1.0. Got: {}",
                self.jitter
            )));
        }
        if self.max_retry_after_secs > 3600 {
            return Err(Error::config(format!(
                "engine.max_retry_after_secs must be at most 3600. Got: {}",
                self.max_retry_after_secs
            )));
        }
        if self.pace_ms > 60_000 {
            return Err(Error::config(format!(
                "engine.pace_ms must be at most 60000. Got: {}",
                self.pace_ms
            )));
        }
        if !(1..=60).contains(&self.ip_timeout_secs) {
            return Err(Error::config(format!(
                "engine.ip_timeout_secs must be between 1 and 60. Got: {}",
                self.ip_timeout_secs
            )));
        }
        if !(1..=300).contains(&self.http_timeout_secs) {
            return Err(Error::config(format!(
                "engine.http_timeout_secs must be between 1 and 300. Got: {}",
                self.http_timeout_secs
            )));
        }
        if !self.api_base.starts_with("https://") && !self.api_base.starts_with("http://") {
            return Err(Error::config(format!(
                "engine.api_base must use HTTP or HTTPS scheme. Got: {}",
                self.api_base
            )));
        }
        Ok(())
    }

    /// Retry policy for provider calls
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter,
        )
        .with_max_retry_after(Duration::from_secs(self.max_retry_after_secs))
    }

    /// Pause between records that called the provider
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }

    /// Timeout for one echo-service request
    pub fn ip_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_timeout_secs)
    }

    /// Timeout for one provider request
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Cache age limit in `trust_cache` mode
    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.cache_max_age_secs).unwrap_or(i64::MAX))
    }
}

fn require(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::config(format!("missing required field `{}`", field))),
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; not comprehensive but catches common errors.
fn validate_domain_name(domain: &str) -> std::result::Result<(), String> {
    if domain.is_empty() {
        return Err("Domain name cannot be empty".to_string());
    }

    // RFC 1035: 253 chars max
    if domain.len() > 253 {
        return Err(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        ));
    }

    for label in domain.split('.') {
        validate_label(label, domain)?;
    }

    Ok(())
}

/// Like [`validate_domain_name`], but `*` is accepted as the leading label
fn validate_subdomain(subdomain: &str) -> std::result::Result<(), String> {
    let rest = match subdomain.strip_prefix('*') {
        Some("") => return Ok(()),
        Some(rest) => rest.strip_prefix('.').ok_or_else(|| {
            format!("Wildcard must be a whole label. Got: '{}'", subdomain)
        })?,
        None => subdomain,
    };
    validate_domain_name(rest)
}

fn validate_label(label: &str, name: &str) -> std::result::Result<(), String> {
    if label.is_empty() {
        return Err(format!("Domain name has empty label: '{}'", name));
    }

    if label.len() > 63 {
        return Err(format!(
            "Domain label too long: {} chars (max 63). Label: '{}'",
            label.len(),
            label
        ));
    }

    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!(
            "Domain label contains invalid characters. Label: '{}'. \
            Valid: alphanumeric, hyphen and underscore only.",
            label
        ));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(format!(
            "Domain label cannot start or end with hyphen. Label: '{}'",
            label
        ));
    }

    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_jitter() -> f64 {
    0.2
}

fn default_max_retry_after_secs() -> u64 {
    60
}

fn default_ip_timeout_secs() -> u64 {
    5
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_cache_max_age_secs() -> u64 {
    3600
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
