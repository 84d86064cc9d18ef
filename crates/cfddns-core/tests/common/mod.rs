//! Test doubles and common utilities for reconciliation contract tests
//!
//! The doubles keep their state behind `Arc`s so a test can hand one copy to
//! the reconciler and inspect another afterwards.

#![allow(dead_code)]

use async_trait::async_trait;
use cfddns_core::config::{Config, RecordType};
use cfddns_core::error::{Error, Result};
use cfddns_core::traits::{DnsProvider, IpFamily, IpSource, RecordSnapshot, UpdateRequest};
use cfddns_core::{IpResolver, MemoryStateStore, Reconciler};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An IpSource that always answers with fixed addresses
pub struct StaticIpSource {
    v4: Option<IpAddr>,
    v6: Option<IpAddr>,
    calls: Arc<AtomicUsize>,
}

impl StaticIpSource {
    pub fn v4(address: &str) -> Self {
        Self {
            v4: Some(address.parse().unwrap()),
            v6: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dual(v4: &str, v6: &str) -> Self {
        Self {
            v4: Some(v4.parse().unwrap()),
            v6: Some(v6.parse().unwrap()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of fetch() calls
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl IpSource for StaticIpSource {
    async fn fetch(&self, family: IpFamily) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = match family {
            IpFamily::V4 => self.v4,
            IpFamily::V6 => self.v6,
        };
        answer.ok_or_else(|| Error::ip_source("static", format!("no {} connectivity", family)))
    }

    fn supports(&self, family: IpFamily) -> bool {
        match family {
            IpFamily::V4 => self.v4.is_some(),
            IpFamily::V6 => self.v6.is_some(),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

type RecordId = (String, RecordType);

#[derive(Default)]
struct ProviderState {
    /// Records by (fqdn, type)
    records: HashMap<RecordId, RecordSnapshot>,
    /// Zones whose calls fail with an authentication error
    auth_failing_zones: HashSet<String>,
    /// Remaining transient failures before reads succeed
    read_failures: HashMap<RecordId, usize>,
    /// Remaining transient failures before updates succeed
    update_failures: HashMap<RecordId, usize>,
    /// Successful and failed update requests, in order
    update_requests: Vec<UpdateRequest>,
}

/// A scripted DnsProvider that tracks calls
#[derive(Clone, Default)]
pub struct MockDnsProvider {
    state: Arc<Mutex<ProviderState>>,
    read_call_count: Arc<AtomicUsize>,
    update_call_count: Arc<AtomicUsize>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing record
    pub fn with_record(self, fqdn: &str, record_type: RecordType, content: &str) -> Self {
        self.with_record_settings(fqdn, record_type, content, 300, false)
    }

    /// Seed an existing record with explicit ttl/proxied
    pub fn with_record_settings(
        self,
        fqdn: &str,
        record_type: RecordType,
        content: &str,
        ttl: u32,
        proxied: bool,
    ) -> Self {
        let snapshot = RecordSnapshot {
            record_id: format!("id-{}-{}", fqdn, record_type),
            current_address: content.to_string(),
            current_ttl: ttl,
            current_proxied: proxied,
        };
        self.state
            .lock()
            .unwrap()
            .records
            .insert((fqdn.to_string(), record_type), snapshot);
        self
    }

    /// Make every call for a zone fail with an authentication error
    pub fn failing_auth_for_zone(self, zone_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .auth_failing_zones
            .insert(zone_id.to_string());
        self
    }

    /// Fail the next `times` reads of a record with a transient error
    pub fn transient_reads(self, fqdn: &str, record_type: RecordType, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .read_failures
            .insert((fqdn.to_string(), record_type), times);
        self
    }

    /// Fail the next `times` updates of a record with a transient error
    pub fn transient_updates(self, fqdn: &str, record_type: RecordType, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .update_failures
            .insert((fqdn.to_string(), record_type), times);
        self
    }

    /// Number of get_record() calls
    pub fn read_call_count(&self) -> usize {
        self.read_call_count.load(Ordering::SeqCst)
    }

    /// Number of update_record() calls
    pub fn update_call_count(&self) -> usize {
        self.update_call_count.load(Ordering::SeqCst)
    }

    /// Every update request received, in order
    pub fn update_requests(&self) -> Vec<UpdateRequest> {
        self.state.lock().unwrap().update_requests.clone()
    }

    /// Current provider-side content of a record
    pub fn content(&self, fqdn: &str, record_type: RecordType) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&(fqdn.to_string(), record_type))
            .map(|r| r.current_address.clone())
    }

    /// Current provider-side snapshot of a record
    pub fn snapshot(&self, fqdn: &str, record_type: RecordType) -> Option<RecordSnapshot> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&(fqdn.to_string(), record_type))
            .cloned()
    }
}

fn take_failure(failures: &mut HashMap<RecordId, usize>, id: &RecordId) -> bool {
    match failures.get_mut(id) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn get_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: RecordType,
    ) -> Result<RecordSnapshot> {
        self.read_call_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let id = (fqdn.to_string(), record_type);

        if state.auth_failing_zones.contains(zone_id) {
            return Err(Error::auth("Invalid API token or insufficient permissions"));
        }
        if take_failure(&mut state.read_failures, &id) {
            return Err(Error::transient("HTTP 503: Service Unavailable"));
        }

        state
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{} record for {} not found", record_type, fqdn)))
    }

    async fn update_record(&self, zone_id: &str, request: &UpdateRequest) -> Result<()> {
        self.update_call_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let id = (request.fqdn.clone(), request.record_type);
        state.update_requests.push(request.clone());

        if state.auth_failing_zones.contains(zone_id) {
            return Err(Error::auth("Invalid API token or insufficient permissions"));
        }
        if take_failure(&mut state.update_failures, &id) {
            return Err(Error::transient("connection reset by peer"));
        }

        let record = state
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("record {} not found", request.record_id)))?;
        record.current_address = request.address.to_string();
        if let Some(ttl) = request.ttl {
            record.current_ttl = ttl;
        }
        if let Some(proxied) = request.proxied {
            record.current_proxied = proxied;
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Build a config with instant retries from a JSON domain list
pub fn config_for(domains: serde_json::Value) -> Config {
    config_with_engine(domains, serde_json::json!({}))
}

/// Build a config with instant retries plus extra engine settings
pub fn config_with_engine(domains: serde_json::Value, engine: serde_json::Value) -> Config {
    let mut engine_block = serde_json::json!({
        "max_attempts": 4,
        "base_delay_ms": 0,
        "max_delay_ms": 0,
        "jitter": 0.0
    });
    if let (Some(block), Some(extra)) = (engine_block.as_object_mut(), engine.as_object()) {
        for (k, v) in extra {
            block.insert(k.clone(), v.clone());
        }
    }

    let doc = serde_json::json!({
        "api_token": "test-token",
        "domains": domains,
        "engine": engine_block,
    });
    Config::from_json_str(&doc.to_string()).expect("test config is valid")
}

/// Single example.com domain with the given subdomains
pub fn example_domain(subdomains: &[&str], ipv6: bool) -> serde_json::Value {
    serde_json::json!([{
        "domain": "example.com",
        "zone_id": "zone-example",
        "subdomains": subdomains,
        "ipv6": ipv6
    }])
}

/// Wire a reconciler from doubles
pub fn reconciler(
    source: StaticIpSource,
    provider: &MockDnsProvider,
    cache: &MemoryStateStore,
    config: &Config,
) -> Reconciler {
    Reconciler::new(
        IpResolver::new(vec![Box::new(source)]),
        Box::new(provider.clone()),
        Box::new(cache.clone()),
        config,
    )
}
