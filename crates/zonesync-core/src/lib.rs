// # zonesync-core
//
// Core library for reconciling Re2o DNS data with a hosted zone.
//
// ## Architecture Overview
//
// - **Record model**: canonical `Record` keyed by `(type, name)`
// - **RecordSource**: trait for fetching desired records (Re2o)
// - **DnsProvider**: trait for reading and mutating the hosted zone (Gandi)
// - **StateStore**: trait for the per-zone ledger of records this tool owns
// - **reconcile**: pure three-way diff of desired, actual and ledger
// - **SyncEngine**: runs one zone end to end and persists the ledger
//
// ## Design Principles
//
// 1. **Pure core**: `reconcile` does no I/O and cannot fail
// 2. **Ledger is the owner of record**: keys absent from the ledger are never
//    deleted or overwritten
// 3. **Partial failure is explicit**: only verified operations reach the ledger
// 4. **Library-first**: the binary is a thin layer over this crate

pub mod config;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod record;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{Config, GandiConfig, HttpConfig, Re2oConfig, StateConfig, ZoneConfig};
pub use engine::{EngineEvent, EngineOptions, SyncEngine, ZoneReport};
pub use error::{Error, RemoteState, Result};
pub use reconcile::{
    ApplyReport, Operation, OperationKind, Plan, apply_plan, reconcile, settled_ledger,
    simulate_plan,
};
pub use record::{Record, RecordKey, RecordSet, RecordType, record_set};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{DnsProvider, RecordSource, StateStore, StatusNotifier};
