//! Contract Test: Dry Run
//!
//! A dry run must describe the plan without side effects.
//!
//! Constraints verified:
//! - The provider receives no mutating call
//! - The ledger is neither rewritten nor touched on disk
//! - The simulated operations equal those a live run would apply

mod common;

use common::*;
use zonesync_core::traits::StateStore;
use zonesync_core::{EngineEvent, FileStateStore, MemoryStateStore, RecordSet, reconcile};

#[tokio::test]
async fn dry_run_makes_no_provider_calls() {
    let desired = set(vec![a("www", "1.2.3.4"), a("mail", "1.2.3.5")]);
    let actual = set(vec![a("old", "9.9.9.9")]);
    let source = StaticSource::new(desired.clone());
    let provider = FakeProvider::new(actual.clone());
    let store = MemoryStateStore::with_ledger(ZONE, actual.clone());

    let (engine, _rx) = engine(&source, &provider, &store, true);
    let report = engine.sync_zone(ZONE).await.expect("dry run succeeds");

    assert_eq!(provider.apply_calls(), 0);
    assert_eq!(provider.zone(), actual);
    assert_eq!(report.apply.simulated, reconcile(&desired, &actual, &actual).operations);
    assert_eq!(report.apply.ledger, actual);
    assert!(!report.ledger_saved);
    assert_eq!(store.load(ZONE).await.unwrap(), actual);
}

#[tokio::test]
async fn dry_run_leaves_ledger_file_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path()).await.unwrap();
    let managed = set(vec![a("www", "10.0.0.1"), a("gone", "10.0.0.2")]);
    store.save(ZONE, &managed).await.unwrap();

    let path = store.ledger_path(ZONE);
    let before = std::fs::read(&path).unwrap();

    let source = StaticSource::new(set(vec![a("www", "1.2.3.4")]));
    // "gone" is missing at the provider, so a live run would forget it
    let provider = FakeProvider::new(set(vec![a("www", "10.0.0.1")]));
    let (engine, _rx) = zonesync_core::SyncEngine::new(
        std::sync::Arc::new(source),
        Box::new(provider.clone()),
        std::sync::Arc::new(store.clone()),
        zonesync_core::EngineOptions {
            dry_run: true,
            ..Default::default()
        },
    )
    .unwrap();

    let report = engine.sync_zone(ZONE).await.unwrap();
    assert_eq!(report.plan.forgotten.len(), 1);
    assert_eq!(report.apply.simulated.len(), 1);

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(provider.apply_calls(), 0);
}

#[tokio::test]
async fn dry_run_emits_simulated_events_only() {
    let source = StaticSource::new(set(vec![a("www", "1.2.3.4")]));
    let provider = FakeProvider::new(RecordSet::new());
    let store = MemoryStateStore::new();

    let (engine, mut rx) = engine(&source, &provider, &store, true);
    assert!(engine.is_dry_run());
    engine.sync_zone(ZONE).await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(EngineEvent::ZoneStarted { dry_run: true, .. })));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::OperationSimulated { .. })));
    assert!(!events.iter().any(|e| matches!(
        e,
        EngineEvent::OperationApplied { .. } | EngineEvent::LedgerSaved { .. }
    )));
}

#[tokio::test]
async fn live_run_after_dry_run_applies_the_same_plan() {
    let source = StaticSource::new(set(vec![a("www", "1.2.3.4"), cname("ftp", "www.example.org.")]));
    let provider = FakeProvider::new(RecordSet::new());
    let store = MemoryStateStore::new();

    let (dry, _rx) = engine(&source, &provider, &store, true);
    let simulated = dry.sync_zone(ZONE).await.unwrap().apply.simulated;

    let (live, _rx) = engine(&source, &provider, &store, false);
    live.sync_zone(ZONE).await.unwrap();

    assert_eq!(provider.applied(), simulated);
}
