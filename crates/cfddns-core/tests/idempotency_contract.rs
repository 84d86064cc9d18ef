//! Contract Test: Idempotency
//!
//! Constraints verified:
//! - A record that already holds the resolved address is never written
//! - A differing record receives exactly one update with the new address
//! - ttl/proxied are only sent when configured
//! - A second run after convergence is a no-op
//!
//! If this test fails, the reconciler may flap records or spam the provider.

mod common;

use cfddns_core::config::RecordType;
use cfddns_core::{MemoryStateStore, Outcome};
use common::*;

#[tokio::test]
async fn matching_record_is_not_updated() {
    let provider = MockDnsProvider::new().with_record("vpn.example.com", RecordType::A, "1.2.3.4");
    let cache = MemoryStateStore::new();
    let config = config_for(example_domain(&["vpn"], false));

    let report = reconciler(StaticIpSource::v4("1.2.3.4"), &provider, &cache, &config)
        .run()
        .await;

    assert!(report.is_success());
    assert_eq!(report.count(Outcome::Unchanged), 1);
    assert_eq!(provider.read_call_count(), 1);
    assert_eq!(provider.update_call_count(), 0);
}

#[tokio::test]
async fn differing_record_gets_exactly_one_update() {
    let provider = MockDnsProvider::new().with_record("vpn.example.com", RecordType::A, "5.6.7.8");
    let cache = MemoryStateStore::new();
    let config = config_for(example_domain(&["vpn"], false));

    let report = reconciler(StaticIpSource::v4("1.2.3.4"), &provider, &cache, &config)
        .run()
        .await;

    assert!(report.is_success());
    assert_eq!(report.count(Outcome::Updated), 1);

    let requests = provider.update_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].address, "1.2.3.4".parse::<std::net::IpAddr>().unwrap());
    assert_eq!(requests[0].record_id, "id-vpn.example.com-A");
    assert_eq!(requests[0].ttl, None, "unconfigured ttl must not be sent");
    assert_eq!(requests[0].proxied, None, "unconfigured proxied must not be sent");
    assert_eq!(provider.content("vpn.example.com", RecordType::A).as_deref(), Some("1.2.3.4"));
}

#[tokio::test]
async fn apex_and_vpn_scenario() {
    // vpn already correct, apex stale
    let provider = MockDnsProvider::new()
        .with_record("vpn.example.com", RecordType::A, "1.2.3.4")
        .with_record("example.com", RecordType::A, "9.9.9.9");
    let cache = MemoryStateStore::new();
    let config = config_for(example_domain(&["@", "vpn"], false));

    let report = reconciler(StaticIpSource::v4("1.2.3.4"), &provider, &cache, &config)
        .run()
        .await;

    assert!(report.is_success());
    assert_eq!(report.len(), 2);
    assert_eq!(
        report.get("vpn.example.com", RecordType::A).map(|r| r.outcome),
        Some(Outcome::Unchanged)
    );
    assert_eq!(
        report.get("example.com", RecordType::A).map(|r| r.outcome),
        Some(Outcome::Updated)
    );

    let requests = provider.update_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].fqdn, "example.com");
    assert_eq!(provider.content("example.com", RecordType::A).as_deref(), Some("1.2.3.4"));
}

#[tokio::test]
async fn configured_ttl_and_proxied_are_enforced() {
    let provider = MockDnsProvider::new().with_record_settings(
        "vpn.example.com",
        RecordType::A,
        "1.2.3.4",
        3600,
        false,
    );
    let cache = MemoryStateStore::new();
    let config = config_for(serde_json::json!([{
        "domain": "example.com",
        "zone_id": "zone-example",
        "subdomains": ["vpn"],
        "ttl": 300,
        "proxied": true
    }]));

    let report = reconciler(StaticIpSource::v4("1.2.3.4"), &provider, &cache, &config)
        .run()
        .await;

    assert_eq!(report.count(Outcome::Updated), 1);
    let requests = provider.update_requests();
    assert_eq!(requests[0].ttl, Some(300));
    assert_eq!(requests[0].proxied, Some(true));

    let snapshot = provider.snapshot("vpn.example.com", RecordType::A).unwrap();
    assert_eq!(snapshot.current_ttl, 300);
    assert!(snapshot.current_proxied);
}

#[tokio::test]
async fn second_run_after_convergence_is_noop() {
    let provider = MockDnsProvider::new()
        .with_record("example.com", RecordType::A, "9.9.9.9")
        .with_record("example.com", RecordType::Aaaa, "2001:db8::dead");
    let cache = MemoryStateStore::new();
    let config = config_for(example_domain(&["@"], true));

    let first = reconciler(
        StaticIpSource::dual("1.2.3.4", "2001:db8::1"),
        &provider,
        &cache,
        &config,
    )
    .run()
    .await;
    assert_eq!(first.count(Outcome::Updated), 2);

    let second = reconciler(
        StaticIpSource::dual("1.2.3.4", "2001:db8::1"),
        &provider,
        &cache,
        &config,
    )
    .run()
    .await;

    assert!(second.is_success());
    assert_eq!(second.count(Outcome::Unchanged), 2);
    assert_eq!(provider.update_call_count(), 2, "no further updates after convergence");
}

#[tokio::test]
async fn address_resolved_once_per_family() {
    let provider = MockDnsProvider::new()
        .with_record("a.example.com", RecordType::A, "1.2.3.4")
        .with_record("b.example.com", RecordType::A, "1.2.3.4")
        .with_record("c.example.com", RecordType::A, "1.2.3.4");
    let cache = MemoryStateStore::new();
    let config = config_for(example_domain(&["a", "b", "c"], false));

    let source = StaticIpSource::v4("1.2.3.4");
    let calls = source.call_counter();
    let report = reconciler(source, &provider, &cache, &config).run().await;

    assert!(report.is_success());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}
