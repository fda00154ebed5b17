//! Core traits for zone synchronisation
//!
//! This module defines the abstract interfaces that all adapters must follow.
//!
//! - [`RecordSource`]: Fetch the desired records of a zone
//! - [`DnsProvider`]: Read and mutate the hosted zone
//! - [`StateStore`]: Persist the ledger of records this tool owns
//! - [`StatusNotifier`]: Report a successful run back to the source

pub mod dns_provider;
pub mod record_source;
pub mod state_store;

pub use dns_provider::DnsProvider;
pub use record_source::{RecordSource, StatusNotifier};
pub use state_store::StateStore;
