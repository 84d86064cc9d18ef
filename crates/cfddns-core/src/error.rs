//! Error types for cfddns
//!
//! Every failure is scoped: configuration errors abort the run before any
//! network call, `NoProviderReachable` affects one address family, and the
//! remaining variants affect a single record. [`Error::is_transient`] decides
//! what the retry loop is allowed to repeat.

use std::time::Duration;

use thiserror::Error;

use crate::traits::IpFamily;

/// Result type alias for cfddns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cfddns
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (fatal, reported before any network call)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every echo service failed for an address family
    #[error("No IP echo service reachable for {family}")]
    NoProviderReachable {
        /// The family that could not be resolved
        family: IpFamily,
    },

    /// IP source errors (a single echo service failed)
    #[error("IP source error ({source_name}): {message}")]
    IpSource {
        /// Name of the echo service
        source_name: String,
        /// Error message
        message: String,
    },

    /// Authentication or permission errors; never retried
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Record or zone not found; never retried and never auto-created
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Network failures and provider 5xx responses
    #[error("Transient error: {0}")]
    Transient(String),

    /// Provider rate limiting
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Error message
        message: String,
        /// Server-suggested wait before the next attempt
        retry_after: Option<Duration>,
    },

    /// Provider rejected the request for a reason that a retry will not fix
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// State store errors
    #[error("State store error: {0}")]
    StateStore(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an IP source error
    pub fn ip_source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IpSource {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Whether the retry policy may repeat the failed call
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    /// Minimum wait the provider asked for, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short, stable label for structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::NoProviderReachable { .. } => "no_provider_reachable",
            Self::IpSource { .. } => "ip_source",
            Self::Authentication(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::Transient(_) => "transient",
            Self::RateLimited { .. } => "rate_limited",
            Self::Provider { .. } => "provider",
            Self::StateStore(_) => "state_store",
        }
    }
}
