//! Contract Test: Dry-Run
//!
//! Constraints verified:
//! - Dry-run performs every read and decision
//! - Dry-run never performs a mutating provider call
//! - Dry-run never writes the cache, not even for matching records
//!
//! If this test fails, `--dry-run` is not safe to use against production zones.

mod common;

use cfddns_core::config::RecordType;
use cfddns_core::state::FileStateStore;
use cfddns_core::traits::StateStore;
use cfddns_core::{IpResolver, MemoryStateStore, Outcome, Reconciler};
use common::*;

#[tokio::test]
async fn dry_run_never_updates() {
    let provider = MockDnsProvider::new()
        .with_record("vpn.example.com", RecordType::A, "1.2.3.4")
        .with_record("example.com", RecordType::A, "9.9.9.9");
    let cache = MemoryStateStore::new();
    let config = config_for(example_domain(&["@", "vpn"], false));

    let report = reconciler(StaticIpSource::v4("1.2.3.4"), &provider, &cache, &config)
        .with_dry_run(true)
        .run()
        .await;

    assert!(report.dry_run);
    assert!(report.is_success());
    assert_eq!(
        report.get("example.com", RecordType::A).map(|r| r.outcome),
        Some(Outcome::WouldUpdate)
    );
    assert_eq!(
        report.get("vpn.example.com", RecordType::A).map(|r| r.outcome),
        Some(Outcome::Unchanged)
    );

    assert_eq!(provider.read_call_count(), 2);
    assert_eq!(provider.update_call_count(), 0);
    assert_eq!(provider.content("example.com", RecordType::A).as_deref(), Some("9.9.9.9"));
}

#[tokio::test]
async fn dry_run_leaves_memory_cache_untouched() {
    let provider = MockDnsProvider::new()
        .with_record("vpn.example.com", RecordType::A, "1.2.3.4")
        .with_record("example.com", RecordType::A, "9.9.9.9");
    let cache = MemoryStateStore::new();
    let config = config_for(example_domain(&["@", "vpn"], false));

    reconciler(StaticIpSource::v4("1.2.3.4"), &provider, &cache, &config)
        .with_dry_run(true)
        .run()
        .await;

    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn dry_run_leaves_cache_file_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let provider = MockDnsProvider::new().with_record("vpn.example.com", RecordType::A, "5.6.7.8");
    let config = config_for(example_domain(&["vpn"], false));

    let reconciler = Reconciler::new(
        IpResolver::new(vec![Box::new(StaticIpSource::v4("1.2.3.4"))]),
        Box::new(provider.clone()),
        Box::new(FileStateStore::open(&path).await),
        &config,
    )
    .with_dry_run(true);

    let report = reconciler.run().await;

    assert_eq!(report.count(Outcome::WouldUpdate), 1);
    assert!(!path.exists(), "dry-run must not create the cache file");

    let reopened = FileStateStore::open(&path).await;
    assert_eq!(reopened.len().await, 0);
}
