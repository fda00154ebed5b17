// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Keeps one ledger file per zone so an operator can audit which records the
// tool believes it owns.
//
// ## Crash Recovery
//
// - Atomic writes: write to `.tmp`, sync, then rename over the ledger
// - Backup: the stale backup is removed before each rename and the new
//   ledger is copied to `.backup` after it, so a backup on disk always
//   equals the last committed ledger
// - Corruption detection: JSON is validated on load
// - Recovery: a corrupted ledger is restored from its backup through the
//   same atomic write; if the backup is unusable too, loading fails instead
//   of returning an empty ledger
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "zone": "example.org",
//   "updated_at": "2025-01-09T12:00:00Z",
//   "records": [
//     { "type": "A", "name": "www", "value": "192.0.2.1", "ttl": 300 }
//   ]
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::record::{Record, RecordSet, record_set};
use crate::traits::state_store::StateStore;

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based ledger store
///
/// Ledgers live in `directory` as `last_update_<zone>.json`.
///
/// # Example
///
/// ```rust,no_run
/// use zonesync_core::state::FileStateStore;
/// use zonesync_core::traits::StateStore;
/// use zonesync_core::{Record, RecordType, record_set};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/zonesync").await?;
///
///     let ledger = record_set([Record::new(RecordType::A, "www", "192.0.2.1")])?;
///     store.save("example.org", &ledger).await?;
///
///     assert_eq!(store.load("example.org").await?, ledger);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    directory: PathBuf,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    zone: String,
    updated_at: chrono::DateTime<chrono::Utc>,
    records: Vec<Record>,
}

impl FileStateStore {
    /// Create a store rooted at `directory`, creating it if needed
    pub async fn new<P: AsRef<Path>>(directory: P) -> Result<Self, Error> {
        let directory = directory.as_ref().to_path_buf();

        if !directory.as_os_str().is_empty() && !directory.exists() {
            fs::create_dir_all(&directory).await.map_err(|e| {
                Error::ledger_io(format!(
                    "Failed to create state directory {}: {}",
                    directory.display(),
                    e
                ))
            })?;
        }

        Ok(Self { directory })
    }

    /// Path of the ledger file for `zone`
    pub fn ledger_path(&self, zone: &str) -> PathBuf {
        self.directory.join(format!("last_update_{}.json", zone))
    }

    /// Load a ledger file, falling back to its backup when corrupted
    async fn load_with_recovery(&self, zone: &str) -> Result<RecordSet, Error> {
        let path = self.ledger_path(zone);
        if !path.exists() {
            tracing::debug!("No ledger for zone {} at {}", zone, path.display());
            return Ok(RecordSet::new());
        }

        match Self::load_file(&path, zone).await {
            Ok(records) => {
                tracing::debug!("Loaded ledger for zone {}: {} records", zone, records.len());
                Ok(records)
            }
            Err(e) => {
                let backup_path = Self::backup_path(&path);
                if !backup_path.exists() {
                    return Err(e);
                }

                tracing::warn!(
                    "Ledger for zone {} is unreadable: {}. Attempting recovery from backup.",
                    zone,
                    e
                );

                let records = Self::load_file(&backup_path, zone).await.map_err(|backup_err| {
                    Error::ledger_io(format!(
                        "Ledger {} and its backup are both unreadable: {}; {}",
                        path.display(),
                        e,
                        backup_err
                    ))
                })?;

                tracing::info!(
                    "Recovered ledger for zone {} from backup: {} records",
                    zone,
                    records.len()
                );

                if let Err(restore_err) = self.write_ledger(zone, &records).await {
                    tracing::error!("Failed to restore ledger from backup: {}", restore_err);
                }

                Ok(records)
            }
        }
    }

    /// Parse one ledger file
    async fn load_file(path: &Path, zone: &str) -> Result<RecordSet, Error> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::ledger_io(format!("Failed to read ledger {}: {}", path.display(), e))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::ledger_io(format!(
                "Failed to parse ledger {}: {}. File may be corrupted.",
                path.display(),
                e
            ))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "Ledger version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        if state_file.zone != zone {
            return Err(Error::ledger_io(format!(
                "Ledger {} belongs to zone {}, not {}",
                path.display(),
                state_file.zone,
                zone
            )));
        }

        record_set(state_file.records).map_err(|e| {
            Error::ledger_io(format!("Ledger {} holds invalid records: {}", path.display(), e))
        })
    }

    /// Write a ledger atomically
    async fn write_ledger(&self, zone: &str, ledger: &RecordSet) -> Result<(), Error> {
        let path = self.ledger_path(zone);
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            zone: zone.to_string(),
            updated_at: chrono::Utc::now(),
            records: ledger.values().cloned().collect(),
        };

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::ledger_io(format!("Failed to serialize ledger: {}", e)))?;

        let temp_path = Self::temp_path(&path);
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::ledger_io(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::ledger_io(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::ledger_io(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        let backup_path = Self::backup_path(&path);
        if backup_path.exists() {
            fs::remove_file(&backup_path).await.map_err(|e| {
                Error::ledger_io(format!(
                    "Failed to remove stale backup {}: {}",
                    backup_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &path).await.map_err(|e| {
            Error::ledger_io(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        if let Err(e) = fs::copy(&path, &backup_path).await {
            tracing::warn!("Failed to create ledger backup: {}", e);
        }

        tracing::debug!("Ledger for zone {} written to {}", zone, path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(path: &Path) -> PathBuf {
        path.with_extension("tmp")
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        path.with_extension("backup")
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, zone: &str) -> Result<RecordSet, Error> {
        self.load_with_recovery(zone).await
    }

    async fn save(&self, zone: &str, ledger: &RecordSet) -> Result<(), Error> {
        self.write_ledger(zone, ledger).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use tempfile::tempdir;

    fn ledger(value: &str) -> RecordSet {
        record_set([
            Record::new(RecordType::A, "www", value).with_ttl(300),
            Record::from_values(RecordType::Aaaa, "www", ["2001:db8::2", "2001:db8::1"]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        assert!(store.load("example.org").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        store.save("example.org", &ledger("1.2.3.4")).await.unwrap();
        assert!(dir.path().join("last_update_example.org.json").exists());

        let store2 = FileStateStore::new(dir.path()).await.unwrap();
        assert_eq!(store2.load("example.org").await.unwrap(), ledger("1.2.3.4"));
    }

    #[tokio::test]
    async fn test_ledger_file_is_human_readable() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();
        store.save("example.org", &ledger("1.2.3.4")).await.unwrap();

        let content = std::fs::read_to_string(store.ledger_path("example.org")).unwrap();
        assert!(content.contains("\"type\": \"A\""));
        assert!(content.contains("\"value\": \"2001:db8::1 2001:db8::2\""));
        let a_pos = content.find("\"A\"").unwrap();
        let aaaa_pos = content.find("\"AAAA\"").unwrap();
        assert!(a_pos < aaaa_pos, "records must be written in key order");
    }

    #[tokio::test]
    async fn test_corruption_recovers_last_committed_ledger() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        store.save("example.org", &ledger("1.2.3.4")).await.unwrap();
        store.save("example.org", &ledger("1.2.3.5")).await.unwrap();

        let path = store.ledger_path("example.org");
        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = store.load("example.org").await.unwrap();
        assert_eq!(recovered, ledger("1.2.3.5"), "backup holds the last saved ledger");
    }

    #[tokio::test]
    async fn test_recovery_never_resurrects_removed_keys() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        store.save("example.org", &ledger("1.2.3.4")).await.unwrap();
        store.save("example.org", &RecordSet::new()).await.unwrap();

        let path = store.ledger_path("example.org");
        fs::write(&path, b"{").await.unwrap();

        assert!(store.load("example.org").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_rewrites_main_file() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        store.save("example.org", &ledger("1.2.3.4")).await.unwrap();
        let path = store.ledger_path("example.org");
        fs::write(&path, b"corrupted").await.unwrap();

        store.load("example.org").await.unwrap();

        let restored = FileStateStore::load_file(&path, "example.org").await.unwrap();
        assert_eq!(restored, ledger("1.2.3.4"));
        assert!(!FileStateStore::temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_double_corruption_is_fatal() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        store.save("example.org", &ledger("1.2.3.4")).await.unwrap();
        store.save("example.org", &ledger("1.2.3.5")).await.unwrap();

        let path = store.ledger_path("example.org");
        fs::write(&path, b"{").await.unwrap();
        fs::write(FileStateStore::backup_path(&path), b"}").await.unwrap();

        let result = store.load("example.org").await;
        assert!(matches!(result, Err(Error::LedgerIo(_))));
    }

    #[tokio::test]
    async fn test_corruption_without_backup_is_fatal() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        fs::write(store.ledger_path("example.org"), b"not json").await.unwrap();

        assert!(matches!(
            store.load("example.org").await,
            Err(Error::LedgerIo(_))
        ));
    }

    #[tokio::test]
    async fn test_ledgers_are_per_zone() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        store.save("example.org", &ledger("1.2.3.4")).await.unwrap();

        assert!(store.load("example.net").await.unwrap().is_empty());
        assert_eq!(store.load("example.org").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        for i in 0..10 {
            store.save("example.org", &ledger(&format!("1.2.3.{}", i))).await.unwrap();
        }

        let path = store.ledger_path("example.org");
        assert!(!FileStateStore::temp_path(&path).exists());
        assert_eq!(store.load("example.org").await.unwrap(), ledger("1.2.3.9"));
    }
}
