//! Test doubles and common utilities for contract tests
//!
//! The fakes keep their state behind `Arc` so a test can hand one clone to
//! the engine and inspect another afterwards.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use zonesync_core::error::{Error, RemoteState, Result};
use zonesync_core::traits::{DnsProvider, RecordSource, StateStore};
use zonesync_core::{
    EngineEvent, EngineOptions, MemoryStateStore, Operation, Record, RecordSet, RecordType,
    SyncEngine, record_set,
};

pub const ZONE: &str = "example.org";

pub fn a(name: &str, value: &str) -> Record {
    Record::new(RecordType::A, name, value)
}

pub fn cname(name: &str, value: &str) -> Record {
    Record::new(RecordType::Cname, name, value)
}

pub fn set(records: Vec<Record>) -> RecordSet {
    record_set(records).expect("test records are valid")
}

/// A RecordSource returning a fixed desired set
#[derive(Clone)]
pub struct StaticSource {
    desired: Arc<Mutex<RecordSet>>,
    unavailable: bool,
}

impl StaticSource {
    pub fn new(desired: RecordSet) -> Self {
        Self {
            desired: Arc::new(Mutex::new(desired)),
            unavailable: false,
        }
    }

    /// A source whose every call fails with SourceUnavailable
    pub fn unavailable() -> Self {
        Self {
            desired: Arc::new(Mutex::new(RecordSet::new())),
            unavailable: true,
        }
    }

    pub fn set_desired(&self, desired: RecordSet) {
        *self.desired.lock().unwrap() = desired;
    }
}

#[async_trait::async_trait]
impl RecordSource for StaticSource {
    async fn list_zones(&self) -> Result<Vec<String>> {
        Ok(vec![ZONE.to_string()])
    }

    async fn fetch_desired(&self, _zone: &str) -> Result<RecordSet> {
        if self.unavailable {
            return Err(Error::source_unavailable("connection refused"));
        }
        Ok(self.desired.lock().unwrap().clone())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

/// An in-memory hosted zone that records every call
#[derive(Clone)]
pub struct FakeProvider {
    zone: Arc<Mutex<RecordSet>>,
    applied: Arc<Mutex<Vec<Operation>>>,
    apply_calls: Arc<AtomicUsize>,
    /// Fail the nth apply call (1-based) with the given remote state
    fail_at: Option<(usize, RemoteState)>,
}

impl FakeProvider {
    pub fn new(actual: RecordSet) -> Self {
        Self {
            zone: Arc::new(Mutex::new(actual)),
            applied: Arc::new(Mutex::new(Vec::new())),
            apply_calls: Arc::new(AtomicUsize::new(0)),
            fail_at: None,
        }
    }

    /// Make the nth apply call fail
    pub fn failing_at(mut self, call: usize, state: RemoteState) -> Self {
        self.fail_at = Some((call, state));
        self
    }

    pub fn zone(&self) -> RecordSet {
        self.zone.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<Operation> {
        self.applied.lock().unwrap().clone()
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn mutate(&self, operation: &Operation) {
        let mut zone = self.zone.lock().unwrap();
        operation.fold_into(&mut zone);
    }
}

#[async_trait::async_trait]
impl DnsProvider for FakeProvider {
    async fn fetch_actual(&self, _zone: &str) -> Result<RecordSet> {
        Ok(self.zone())
    }

    async fn apply(&self, _zone: &str, operation: &Operation) -> Result<()> {
        let call = self.apply_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some((fail_call, state)) = self.fail_at {
            if call == fail_call {
                if state == RemoteState::Committed {
                    self.mutate(operation);
                }
                return Err(Error::provider("fake", "injected failure", state));
            }
        }

        self.mutate(operation);
        self.applied.lock().unwrap().push(operation.clone());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// A StateStore that loads a fixed ledger and refuses every save
#[derive(Clone)]
pub struct ReadOnlyStore {
    ledger: RecordSet,
}

impl ReadOnlyStore {
    pub fn new(ledger: RecordSet) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl StateStore for ReadOnlyStore {
    async fn load(&self, _zone: &str) -> Result<RecordSet> {
        Ok(self.ledger.clone())
    }

    async fn save(&self, _zone: &str, _ledger: &RecordSet) -> Result<()> {
        Err(Error::ledger_io("read-only file system"))
    }
}

/// Build an engine over the given fakes
pub fn engine(
    source: &StaticSource,
    provider: &FakeProvider,
    store: &MemoryStateStore,
    dry_run: bool,
) -> (SyncEngine, tokio::sync::mpsc::Receiver<EngineEvent>) {
    SyncEngine::new(
        Arc::new(source.clone()),
        Box::new(provider.clone()),
        Arc::new(store.clone()),
        EngineOptions {
            dry_run,
            ..EngineOptions::default()
        },
    )
    .expect("engine construction succeeds")
}

/// Drain every event currently buffered
pub fn drain(rx: &mut tokio::sync::mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
