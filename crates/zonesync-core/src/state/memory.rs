// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Holds ledgers for the lifetime of the process only. Useful for tests and
// for embedding the engine where the caller persists ledgers itself.
//
// ## Crash Behavior
//
// - All ledgers are lost on restart
// - The next run treats every existing record as externally owned, so
//   nothing is deleted or overwritten, only missing records are created

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::record::RecordSet;
use crate::traits::state_store::StateStore;

/// In-memory state store implementation
///
/// Clones share the same ledgers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<String, RecordSet>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with an initial ledger for `zone`
    pub fn with_ledger(zone: impl Into<String>, ledger: RecordSet) -> Self {
        let mut zones = HashMap::new();
        zones.insert(zone.into(), ledger);
        Self {
            inner: Arc::new(RwLock::new(zones)),
        }
    }

    /// Number of zones with a saved ledger
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if no ledger was ever saved
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, zone: &str) -> Result<RecordSet, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(zone).cloned().unwrap_or_default())
    }

    async fn save(&self, zone: &str, ledger: &RecordSet) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(zone.to_string(), ledger.clone());
        Ok(())
    }
}
