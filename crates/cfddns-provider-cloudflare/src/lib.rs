// # Cloudflare DNS Provider
//
// This crate provides a Cloudflare DNS provider implementation for cfddns.
//
// ## Scope
//
// - Reads an existing A/AAAA record by name and type
// - Patches the record content, and ttl/proxied only when configured
// - Classifies every failure so the reconciler knows what to retry
// - Single-shot: one HTTP request per call, no retry or caching here
// - Never creates or deletes records
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Construction fails if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - Patch DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use cfddns_core::config::RecordType;
use cfddns_core::traits::{DnsProvider, RecordSnapshot, UpdateRequest};
use cfddns_core::{Error, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider name used in errors and logs
const PROVIDER: &str = "cloudflare";

/// Default HTTP timeout for API requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloudflare DNS provider
///
/// Stateless and single-shot. Retries and backoff belong to the reconciler.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL without trailing slash
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Standard Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// DNS record as returned by the list endpoint
#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

/// PATCH body; absent fields keep the provider's values
#[derive(Debug, Serialize)]
struct PatchBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `api_base`: API base URL (normally `https://api.cloudflare.com/client/v4`)
    /// - `timeout`: Per-request timeout
    ///
    /// # Errors
    ///
    /// `Error::Config` if the token is empty or the HTTP client cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cfddns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, zone_id)
    }

    /// Send a request and decode the envelope's `result`
    ///
    /// Every Cloudflare call goes through here so status classification
    /// lives in one place.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| classify_transport(&e, context))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(classify_status(status, retry_after, &body, context));
        }

        // A body cut short is a network failure; only a complete body that
        // does not decode is the provider's fault
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport(&e, context))?;
        let envelope: Envelope<T> = serde_json::from_slice(&body).map_err(|e| {
            Error::provider(PROVIDER, format!("{}: failed to parse response: {}", context, e))
        })?;

        if !envelope.success {
            return Err(Error::provider(
                PROVIDER,
                format!("{}: {}", context, describe_errors(&envelope.errors)),
            ));
        }

        envelope.result.ok_or_else(|| {
            Error::provider(PROVIDER, format!("{}: response has no result", context))
        })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Read a record
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&name=vpn.example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn get_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: RecordType,
    ) -> Result<RecordSnapshot> {
        tracing::debug!(fqdn, record_type = %record_type, "Looking up DNS record");

        let context = format!("get {} {}", record_type, fqdn);
        let request = self
            .client
            .get(self.records_url(zone_id))
            .query(&[("type", record_type.as_str()), ("name", fqdn)]);

        let records: Vec<DnsRecord> = self.execute(request, &context).await?;
        let record = records.into_iter().next().ok_or_else(|| {
            Error::not_found(format!("DNS record not found: {} (type: {})", fqdn, record_type))
        })?;

        tracing::debug!(fqdn, record_id = %record.id, content = %record.content, "Found DNS record");
        Ok(RecordSnapshot {
            record_id: record.id,
            current_address: record.content,
            current_ttl: record.ttl,
            current_proxied: record.proxied,
        })
    }

    /// Update a record
    ///
    /// ```http
    /// PATCH /zones/:zone_id/dns_records/:record_id
    /// {"type": "A", "name": "vpn.example.com", "content": "1.2.3.4"}
    /// ```
    async fn update_record(&self, zone_id: &str, request: &UpdateRequest) -> Result<()> {
        let url = format!("{}/{}", self.records_url(zone_id), request.record_id);
        let body = PatchBody {
            record_type: request.record_type.as_str(),
            name: &request.fqdn,
            content: request.address.to_string(),
            ttl: request.ttl,
            proxied: request.proxied,
        };

        tracing::debug!(
            fqdn = %request.fqdn,
            record_type = %request.record_type,
            address = %request.address,
            "Patching DNS record"
        );

        let context = format!("update {} {}", request.record_type, request.fqdn);
        let _: serde_json::Value = self
            .execute(self.client.patch(url).json(&body), &context)
            .await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Map a failed HTTP status to the error taxonomy
fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    context: &str,
) -> Error {
    let detail = summarize_body(body);
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid API token or insufficient permissions (HTTP {})",
            context, status
        )),
        404 => Error::not_found(format!("{}: HTTP {} {}", context, status, detail)),
        429 => Error::rate_limited(
            format!("{}: rate limit exceeded (HTTP {})", context, status),
            retry_after,
        ),
        408 | 500..=599 => {
            Error::transient(format!("{}: HTTP {} {}", context, status, detail))
        }
        _ => Error::provider(PROVIDER, format!("{}: HTTP {} {}", context, status, detail)),
    }
}

/// Transport-level failures are all worth retrying
fn classify_transport(err: &reqwest::Error, context: &str) -> Error {
    if err.is_builder() {
        return Error::provider(PROVIDER, format!("{}: invalid request: {}", context, err));
    }
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    Error::transient(format!("{}: {}: {}", context, kind, err))
}

/// `Retry-After` in delta-seconds form
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Prefer Cloudflare's error messages over the raw body
fn summarize_body(body: &str) -> String {
    match serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        Ok(envelope) if !envelope.errors.is_empty() => describe_errors(&envelope.errors),
        _ => body.chars().take(200).collect(),
    }
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "request was not successful".to_string();
    }
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}
