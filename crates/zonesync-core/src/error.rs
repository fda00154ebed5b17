//! Error types for zone synchronisation
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for zonesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// What the provider is known to hold after a failed call
///
/// Only `Committed` allows the ledger to record the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    /// The change took effect even though the call reported an error
    Committed,
    /// The provider refused the change; the zone is as it was
    Rejected,
    /// The outcome cannot be determined (timeout, dropped connection, 5xx)
    Unknown,
}

impl std::fmt::Display for RemoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RemoteState::Committed => "committed",
            RemoteState::Rejected => "rejected",
            RemoteState::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Core error type for zone synchronisation
#[derive(Error, Debug)]
pub enum Error {
    /// A malformed record reached a component that requires valid input
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The source of truth could not be reached or refused authentication
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source of truth returned data that cannot be mapped to records
    #[error("Source format error: {0}")]
    SourceFormat(String),

    /// Provider-specific error
    #[error("Provider error ({provider}, remote state {state}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
        /// Known state of the provider after the failure
        state: RemoteState,
    },

    /// The ledger could not be read or written
    #[error("Ledger I/O error: {0}")]
    LedgerIo(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Some operations of a zone were applied before one failed
    #[error("Partial apply for zone {zone}: {committed} operation(s) committed, failed at {failed}")]
    PartialApply {
        /// Zone name
        zone: String,
        /// Number of operations folded into the ledger
        committed: usize,
        /// Description of the failed operation and its cause
        failed: String,
    },
}

impl Error {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a source-unavailable error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a source format error
    pub fn source_format(msg: impl Into<String>) -> Self {
        Self::SourceFormat(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        state: RemoteState,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            state,
        }
    }

    /// Create a ledger I/O error
    pub fn ledger_io(msg: impl Into<String>) -> Self {
        Self::LedgerIo(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Remote state carried by a provider error, if any
    pub fn remote_state(&self) -> Option<RemoteState> {
        match self {
            Error::Provider { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Whether some operations were committed before this error
    pub fn is_partial(&self) -> bool {
        matches!(self, Error::PartialApply { .. })
    }
}
