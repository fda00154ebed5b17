// # State Store Trait
//
// Defines the interface for the managed ledger.
//
// ## Purpose
//
// The ledger remembers which `(type, name)` keys this tool wrote to the
// provider. It is the only authority for ownership: a record at the provider
// that is missing from the ledger belongs to somebody else and is never
// deleted or overwritten.
//
// ## Implementations
//
// - File-based: one JSON file per zone (`FileStateStore`)
// - In-memory: tests and embedding (`MemoryStateStore`)

use async_trait::async_trait;

use crate::record::RecordSet;

/// Trait for state store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Recover from a corrupted primary copy using a known-good backup
///
/// ## Forbidden Capabilities
/// - ❌ Return an empty ledger when stored data cannot be read
/// - ❌ Implement business logic (owned by `reconcile`)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the ledger of `zone`
    ///
    /// # Returns
    ///
    /// - `Ok(RecordSet)`: The stored ledger, empty if none was ever saved
    /// - `Err(Error::LedgerIo)`: Stored data exists but cannot be read
    async fn load(&self, zone: &str) -> Result<RecordSet, crate::Error>;

    /// Replace the ledger of `zone`
    ///
    /// Either the new ledger is fully written or the previous one remains.
    async fn save(&self, zone: &str, ledger: &RecordSet) -> Result<(), crate::Error>;
}
