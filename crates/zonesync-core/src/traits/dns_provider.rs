// # DNS Provider Trait
//
// Defines the interface for reading and mutating a hosted zone.
//
// ## Implementations
//
// - Gandi LiveDNS: `zonesync-provider-gandi` crate
//
// ## Usage
//
// ```rust,ignore
// use zonesync_core::{DnsProvider, Operation, Record, RecordType};
//
// #[tokio::main]
// async fn main() -> zonesync_core::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let actual = provider.fetch_actual("example.org").await?;
//     println!("{} managed-type records", actual.len());
//
//     let op = Operation::Create {
//         record: Record::new(RecordType::A, "www", "192.0.2.1"),
//     };
//     provider.apply("example.org", &op).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::reconcile::Operation;
use crate::record::RecordSet;

/// Trait for DNS provider implementations
///
/// # Trust Level: Untrusted
///
/// Providers execute exactly what they are told:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Retry idempotent reads within their own timeout budget
/// - ✅ Parse provider-specific responses into [`RecordSet`]
///
/// ## Forbidden Capabilities
/// - ❌ Retry mutating calls (the outcome of the first attempt may be unknown)
/// - ❌ Access the state store (owned by `SyncEngine`)
/// - ❌ Decide which operations are needed (owned by `reconcile`)
/// - ❌ Spawn tasks or threads
///
/// ## Error Contract
///
/// Every failed call returns `Error::Provider` with a [`RemoteState`]:
/// `Rejected` when the zone is known to be untouched, `Unknown` when the
/// request may or may not have been applied, `Committed` when the change is
/// known to have taken effect despite the error. The engine only records
/// `Committed` failures in the ledger.
///
/// [`RemoteState`]: crate::error::RemoteState
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Fetch the records of `zone` that have one of the managed types
    ///
    /// # Returns
    ///
    /// - `Ok(RecordSet)`: Every A, AAAA, CNAME record and the apex NS set
    /// - `Err(Error)`: If the zone could not be listed or parsed
    async fn fetch_actual(&self, zone: &str) -> Result<RecordSet, crate::Error>;

    /// Apply a single operation to `zone`
    ///
    /// One provider request per call. Deleting a record that is already gone
    /// is a success.
    async fn apply(&self, zone: &str, operation: &Operation) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
