//! Contract Test: Reconciliation Scenarios
//!
//! Runs the reference scenarios through the full engine (fake source, fake
//! provider, memory ledger) and checks operations, order and the resulting
//! ledger.
//!
//! Constraints verified:
//! - Missing desired records are created and enter the ledger
//! - Undesired tool-owned records are deleted and leave the ledger
//! - A re-typed name is deleted before it is recreated
//! - Manual records shadow desired values
//! - A converged zone produces no operations

mod common;

use common::*;
use zonesync_core::traits::StateStore;
use zonesync_core::{EngineEvent, MemoryStateStore, Operation, OperationKind, RecordSet};

#[tokio::test]
async fn missing_record_is_created_and_managed() {
    let source = StaticSource::new(set(vec![a("www", "1.2.3.4")]));
    let provider = FakeProvider::new(RecordSet::new());
    let store = MemoryStateStore::new();

    let (engine, _rx) = engine(&source, &provider, &store, false);
    let report = engine.sync_zone(ZONE).await.expect("run succeeds");

    assert_eq!(
        report.plan.operations,
        vec![Operation::Create {
            record: a("www", "1.2.3.4")
        }]
    );
    assert_eq!(store.load(ZONE).await.unwrap(), set(vec![a("www", "1.2.3.4")]));
    assert_eq!(provider.zone(), set(vec![a("www", "1.2.3.4")]));
}

#[tokio::test]
async fn undesired_managed_record_is_deleted() {
    let existing = set(vec![a("www", "1.2.3.4")]);
    let source = StaticSource::new(RecordSet::new());
    let provider = FakeProvider::new(existing.clone());
    let store = MemoryStateStore::with_ledger(ZONE, existing);

    let (engine, _rx) = engine(&source, &provider, &store, false);
    let report = engine.sync_zone(ZONE).await.expect("run succeeds");

    assert_eq!(
        report.plan.operations,
        vec![Operation::Delete {
            record: a("www", "1.2.3.4")
        }]
    );
    assert!(store.load(ZONE).await.unwrap().is_empty());
    assert!(provider.zone().is_empty());
}

#[tokio::test]
async fn retyped_name_deletes_then_creates() {
    let old = set(vec![a("old", "5.6.7.8")]);
    let source = StaticSource::new(set(vec![cname("old", "x.example.com")]));
    let provider = FakeProvider::new(old.clone());
    let store = MemoryStateStore::with_ledger(ZONE, old);

    let (engine, _rx) = engine(&source, &provider, &store, false);
    engine.sync_zone(ZONE).await.expect("run succeeds");

    assert_eq!(
        provider.applied(),
        vec![
            Operation::Delete {
                record: a("old", "5.6.7.8")
            },
            Operation::Create {
                record: cname("old", "x.example.com")
            },
        ]
    );
    assert_eq!(
        store.load(ZONE).await.unwrap(),
        set(vec![cname("old", "x.example.com")])
    );
}

#[tokio::test]
async fn manual_record_shadows_desired_record() {
    let manual = set(vec![a("manual", "1.1.1.1")]);
    let source = StaticSource::new(set(vec![a("manual", "9.9.9.9")]));
    let provider = FakeProvider::new(manual.clone());
    let store = MemoryStateStore::new();

    let (engine, _rx) = engine(&source, &provider, &store, false);
    let report = engine.sync_zone(ZONE).await.expect("run succeeds");

    assert!(report.plan.is_empty());
    assert_eq!(provider.apply_calls(), 0);
    assert_eq!(provider.zone(), manual);
    assert!(store.load(ZONE).await.unwrap().is_empty());
    assert!(!report.ledger_saved, "unchanged ledger is not rewritten");
}

#[tokio::test]
async fn second_run_is_a_fixed_point() {
    let source = StaticSource::new(set(vec![
        a("www", "1.2.3.4"),
        a("mail", "1.2.3.5"),
        cname("ftp", "www.example.org."),
    ]));
    let provider = FakeProvider::new(set(vec![a("www", "10.0.0.1"), a("printer", "10.0.0.9")]));
    let store = MemoryStateStore::with_ledger(ZONE, set(vec![a("www", "10.0.0.1")]));

    let (engine, _rx) = engine(&source, &provider, &store, false);
    let first = engine.sync_zone(ZONE).await.expect("first run succeeds");
    assert_eq!(first.plan.count(OperationKind::Update), 1);
    assert_eq!(first.plan.count(OperationKind::Create), 2);

    let calls = provider.apply_calls();
    let second = engine.sync_zone(ZONE).await.expect("second run succeeds");

    assert!(second.plan.is_empty(), "converged zone yields no operations");
    assert_eq!(provider.apply_calls(), calls);
    assert!(provider.zone().contains_key(&a("printer", "10.0.0.9").key()));
}

#[tokio::test]
async fn events_describe_the_run() {
    let source = StaticSource::new(set(vec![a("www", "1.2.3.4")]));
    let provider = FakeProvider::new(RecordSet::new());
    let store = MemoryStateStore::new();

    let (engine, mut rx) = engine(&source, &provider, &store, false);
    engine.sync_zone(ZONE).await.expect("run succeeds");

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(EngineEvent::ZoneStarted { dry_run: false, .. })));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::OperationApplied { .. })));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::LedgerSaved { records: 1, .. })));
    assert!(matches!(events.last(), Some(EngineEvent::ZoneFinished { complete: true, .. })));
}
