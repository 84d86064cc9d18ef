//! Reconciliation engine
//!
//! The [`Reconciler`] is responsible for:
//! - Resolving the public address once per needed family
//! - Consulting the cache
//! - Reading each record and deciding whether it needs an update
//! - Updating records via DnsProvider (with retry)
//! - Recording confirmed state in the cache
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ IpResolver  │─── ResolvedAddress (per family) ───┐
//! └─────────────┘                                    │
//!                                                    ▼
//!                                           ┌──────────────┐
//!                                           │  Reconciler  │
//!                                           └──────────────┘
//!                                                    │
//!         ┌──────────────────────────────────────────┼──────────────────┐
//!         │                                          │                  │
//!         ▼                                          ▼                  ▼
//! ┌─────────────┐                           ┌──────────────┐   ┌─────────────┐
//! │ StateStore  │                           │ DnsProvider  │   │  RunReport  │
//! │ (hint)      │                           │ (read/write) │   │ (outcomes)  │
//! └─────────────┘                           └──────────────┘   └─────────────┘
//! ```
//!
//! ## Record Flow
//!
//! 1. Resolve the family's address (first use only)
//! 2. In `trust_cache` mode, accept a fresh matching cache entry
//! 3. Read the record, retrying transient failures
//! 4. Compare as parsed addresses plus configured ttl/proxied
//! 5. Update if needed (not in dry-run), retrying transient failures
//! 6. Cache the address once the provider confirmed it
//!
//! Records are processed sequentially and a failure never stops the run.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RecordType, TargetRecord, VerifyMode};
use crate::error::{Error, Result};
use crate::resolver::{IpResolver, ResolvedAddress};
use crate::retry::{retry_transient, BackoffPolicy};
use crate::traits::{DnsProvider, IpFamily, RecordSnapshot, StateStore, UpdateRequest};

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Live record already matched
    Unchanged,
    /// Fresh cache entry matched; no provider call
    Cached,
    /// Record was updated
    Updated,
    /// Dry-run: record would have been updated
    WouldUpdate,
    /// Record could not be reconciled
    Failed,
}

impl Outcome {
    /// Label used in logs and reports
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Unchanged => "unchanged",
            Outcome::Cached => "cached",
            Outcome::Updated => "updated",
            Outcome::WouldUpdate => "would_update",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of reconciling one target record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub fqdn: String,
    pub record_type: RecordType,
    /// Resolved address for the record's family, when known
    pub address: Option<IpAddr>,
    pub outcome: Outcome,
    /// Provider calls made, retries included
    pub attempts: u32,
    /// Error category for failed records
    pub error_category: Option<&'static str>,
    /// Error message for failed records
    pub error: Option<String>,
}

impl RecordOutcome {
    fn done(target: &TargetRecord, address: IpAddr, outcome: Outcome, attempts: u32) -> Self {
        Self {
            fqdn: target.fqdn.clone(),
            record_type: target.record_type,
            address: Some(address),
            outcome,
            attempts,
            error_category: None,
            error: None,
        }
    }

    fn failed(target: &TargetRecord, address: Option<IpAddr>, attempts: u32, err: &Error) -> Self {
        Self {
            fqdn: target.fqdn.clone(),
            record_type: target.record_type,
            address,
            outcome: Outcome::Failed,
            attempts,
            error_category: Some(err.category()),
            error: Some(err.to_string()),
        }
    }

    /// Whether the record finished without error
    pub fn is_done(&self) -> bool {
        self.outcome != Outcome::Failed
    }
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Whether the run was a dry-run
    pub dry_run: bool,
    /// One entry per target record, in processing order
    pub records: Vec<RecordOutcome>,
}

impl RunReport {
    /// True when every record finished without error
    pub fn is_success(&self) -> bool {
        self.records.iter().all(RecordOutcome::is_done)
    }

    /// Number of records with the given outcome
    pub fn count(&self, outcome: Outcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Records that failed
    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.records.iter().filter(|r| !r.is_done())
    }

    /// Outcome for a specific record
    pub fn get(&self, fqdn: &str, record_type: RecordType) -> Option<&RecordOutcome> {
        self.records
            .iter()
            .find(|r| r.fqdn == fqdn && r.record_type == record_type)
    }

    /// Total number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records were processed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Call [`Reconciler::run()`] once per scheduled invocation
///
/// The reconciler never creates records. A record missing at the provider
/// is a per-record failure.
pub struct Reconciler {
    /// Public address resolution
    resolver: IpResolver,

    /// DNS provider for reading and updating records
    provider: Box<dyn DnsProvider>,

    /// Advisory cache
    cache: Box<dyn StateStore>,

    /// Records to reconcile, in normalized order
    targets: Vec<TargetRecord>,

    /// Retry policy for provider calls
    policy: BackoffPolicy,

    /// Whether a fresh cache hit may skip the read
    verify: VerifyMode,

    /// Oldest entry trusted in `trust_cache` mode
    cache_max_age: chrono::Duration,

    /// Pause after a record that called the provider
    pace: Duration,

    /// Decide but never mutate
    dry_run: bool,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("resolver", &self.resolver)
            .field("provider", &self.provider.provider_name())
            .field("targets", &self.targets.len())
            .field("policy", &self.policy)
            .field("verify", &self.verify)
            .field("pace", &self.pace)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Reconciler {
    /// Create a reconciler for a validated configuration
    ///
    /// # Parameters
    ///
    /// - `resolver`: Address resolver with its sources
    /// - `provider`: DNS provider implementation
    /// - `cache`: State store implementation
    /// - `config`: Normalized configuration
    pub fn new(
        resolver: IpResolver,
        provider: Box<dyn DnsProvider>,
        cache: Box<dyn StateStore>,
        config: &Config,
    ) -> Self {
        Self {
            resolver,
            provider,
            cache,
            targets: config.target_records(),
            policy: config.engine.backoff_policy(),
            verify: config.engine.verify,
            cache_max_age: config.engine.cache_max_age(),
            pace: config.engine.pace(),
            dry_run: false,
        }
    }

    /// Enable or disable dry-run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the verification mode
    pub fn with_verify_mode(mut self, verify: VerifyMode) -> Self {
        self.verify = verify;
        self
    }

    /// Override the retry policy
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Records this reconciler manages
    pub fn targets(&self) -> &[TargetRecord] {
        &self.targets
    }

    /// Reconcile every target record once
    ///
    /// Never fails as a whole: each record's result is in the report.
    pub async fn run(&self) -> RunReport {
        info!(
            records = self.targets.len(),
            provider = self.provider.provider_name(),
            dry_run = self.dry_run,
            verify = ?self.verify,
            "Starting reconciliation"
        );

        let mut resolved: HashMap<IpFamily, Result<ResolvedAddress>> = HashMap::new();
        let mut report = RunReport {
            dry_run: self.dry_run,
            records: Vec::with_capacity(self.targets.len()),
        };

        let mut called_provider = false;
        for target in &self.targets {
            if called_provider && !self.pace.is_zero() {
                debug!(pace = ?self.pace, "Pacing provider calls");
                tokio::time::sleep(self.pace).await;
            }

            let family = target.family();
            if !resolved.contains_key(&family) {
                let result = self.resolver.resolve(family).await;
                if let Err(e) = &result {
                    error!(%family, error = %e, "Could not determine public address");
                }
                resolved.insert(family, result);
            }

            let outcome = match resolved.get(&family) {
                Some(Ok(address)) => self.reconcile_record(target, address.address).await,
                Some(Err(e)) => RecordOutcome::failed(target, None, 0, e),
                None => RecordOutcome::failed(
                    target,
                    None,
                    0,
                    &Error::NoProviderReachable { family },
                ),
            };

            called_provider = outcome.attempts > 0;
            log_outcome(&outcome);
            report.records.push(outcome);
        }

        if !self.dry_run
            && let Err(e) = self.cache.flush().await
        {
            warn!(error = %e, "Failed to flush cache");
        }

        info!(
            total = report.len(),
            updated = report.count(Outcome::Updated),
            would_update = report.count(Outcome::WouldUpdate),
            unchanged = report.count(Outcome::Unchanged),
            cached = report.count(Outcome::Cached),
            failed = report.count(Outcome::Failed),
            "Reconciliation finished"
        );

        report
    }

    /// Reconcile one record against the resolved address
    async fn reconcile_record(&self, target: &TargetRecord, address: IpAddr) -> RecordOutcome {
        let key = target.key();

        if self.verify == VerifyMode::TrustCache {
            match self.cache.get(&key).await {
                Ok(Some(entry)) if entry.address == address => {
                    if entry.is_stale(self.cache_max_age) {
                        debug!(record = %key, "Cache entry is stale, verifying live");
                    } else {
                        return RecordOutcome::done(target, address, Outcome::Cached, 0);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(record = %key, error = %e, "Cache lookup failed, verifying live"),
            }
        }

        let read = retry_transient(&self.policy, &format!("read {}", key), || {
            self.provider
                .get_record(&target.zone_id, &target.fqdn, target.record_type)
        })
        .await;
        let mut attempts = read.attempts;

        let snapshot = match read.result {
            Ok(snapshot) => snapshot,
            Err(e) => return RecordOutcome::failed(target, Some(address), attempts, &e),
        };

        if is_current(target, &snapshot, address) {
            if !self.dry_run {
                self.remember(target, address).await;
            }
            return RecordOutcome::done(target, address, Outcome::Unchanged, attempts);
        }

        if self.dry_run {
            info!(
                fqdn = %target.fqdn,
                record_type = %target.record_type,
                current = %snapshot.current_address,
                address = %address,
                "Dry-run: would update record"
            );
            return RecordOutcome::done(target, address, Outcome::WouldUpdate, attempts);
        }

        let request = UpdateRequest {
            record_id: snapshot.record_id.clone(),
            fqdn: target.fqdn.clone(),
            record_type: target.record_type,
            address,
            ttl: target.ttl,
            proxied: target.proxied,
        };

        let update = retry_transient(&self.policy, &format!("update {}", key), || {
            self.provider.update_record(&target.zone_id, &request)
        })
        .await;
        attempts += update.attempts;

        match update.result {
            Ok(()) => {
                info!(
                    fqdn = %target.fqdn,
                    record_type = %target.record_type,
                    previous = %snapshot.current_address,
                    address = %address,
                    "Updated record"
                );
                self.remember(target, address).await;
                RecordOutcome::done(target, address, Outcome::Updated, attempts)
            }
            Err(e) => RecordOutcome::failed(target, Some(address), attempts, &e),
        }
    }

    /// Cache a confirmed address; failures only warn
    async fn remember(&self, target: &TargetRecord, address: IpAddr) {
        let key = target.key();
        if let Err(e) = self.cache.put(&key, address).await {
            warn!(record = %key, error = %e, "Failed to write cache entry");
        }
    }
}

/// Whether the live record already has the desired state
///
/// Addresses compare as parsed values so IPv6 spelling differences do not
/// count. Unparsable content never matches. ttl and proxied only count
/// when configured.
fn is_current(target: &TargetRecord, snapshot: &RecordSnapshot, address: IpAddr) -> bool {
    snapshot.parsed_address() == Some(address)
        && target.ttl.is_none_or(|ttl| ttl == snapshot.current_ttl)
        && target.proxied.is_none_or(|p| p == snapshot.current_proxied)
}

fn log_outcome(outcome: &RecordOutcome) {
    let address = outcome.address.map(|a| a.to_string()).unwrap_or_default();
    match outcome.outcome {
        Outcome::Failed => error!(
            fqdn = %outcome.fqdn,
            record_type = %outcome.record_type,
            address = %address,
            outcome = %outcome.outcome,
            attempts = outcome.attempts,
            category = outcome.error_category.unwrap_or("other"),
            error = outcome.error.as_deref().unwrap_or(""),
            "Record failed"
        ),
        _ => info!(
            fqdn = %outcome.fqdn,
            record_type = %outcome.record_type,
            address = %address,
            outcome = %outcome.outcome,
            attempts = outcome.attempts,
            "Record reconciled"
        ),
    }
}
