// # Record Source Trait
//
// Defines the interface for fetching the desired state of a zone from the
// source of truth.
//
// ## Implementations
//
// - Re2o REST API: `zonesync-source-re2o` crate

use async_trait::async_trait;

use crate::record::RecordSet;

/// Trait for source-of-truth implementations
///
/// # Trust Level: Semi-Trusted
///
/// Sources are authoritative for *what* should exist, never for *how* the
/// zone is changed.
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to the source of truth
/// - ✅ Validate and normalise records before returning them
///
/// ## Forbidden Capabilities
/// - ❌ Access the provider or the state store
/// - ❌ Filter records based on what the provider currently holds
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// List the zones the source knows about
    ///
    /// Names are returned without any leading dot.
    async fn list_zones(&self) -> Result<Vec<String>, crate::Error>;

    /// Fetch the desired records of `zone`
    ///
    /// # Returns
    ///
    /// - `Ok(RecordSet)`: Validated records, at most one per `(type, name)`
    /// - `Err(Error::SourceUnavailable)`: Network or authentication failure
    /// - `Err(Error::SourceFormat)`: Malformed record data
    async fn fetch_desired(&self, zone: &str) -> Result<RecordSet, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Trait for reporting a completed synchronisation back to the source
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    /// Tell the source that `service` is up to date
    async fn notify_success(&self, service: &str) -> Result<(), crate::Error>;
}
