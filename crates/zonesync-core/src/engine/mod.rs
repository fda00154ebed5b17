//! Zone synchronisation engine
//!
//! The SyncEngine is responsible for:
//! - Fetching the desired records from the RecordSource
//! - Fetching the actual records from the DnsProvider
//! - Loading the ledger from the StateStore
//! - Reconciling, applying (or simulating) and persisting the ledger
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ RecordSource │  │ DnsProvider  │  │  StateStore  │
//! │  (desired)   │  │  (actual)    │  │  (managed)   │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        └─────────────────┼─────────────────┘
//!                          ▼
//!                   ┌──────────────┐
//!                   │  reconcile   │
//!                   └──────┬───────┘
//!                          ▼
//!         apply via DnsProvider (or simulate), save ledger
//! ```
//!
//! ## Run Flow
//!
//! 1. Fetch desired, actual and managed sets; any error aborts before apply
//! 2. Compute the plan
//! 3. Dry run: log the plan, never save the ledger
//! 4. Otherwise apply in order, stop at the first failure
//! 5. Save the ledger of verified effects, even after a failure
//! 6. Report `Error::PartialApply` if an operation failed

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::reconcile::{ApplyReport, Operation, Plan, apply_plan, reconcile, simulate_plan};
use crate::record::RecordSet;
use crate::traits::{DnsProvider, RecordSource, StateStore};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Zone run started
    ZoneStarted { zone: String, dry_run: bool },

    /// Plan computed
    PlanComputed {
        zone: String,
        operations: usize,
        shadowed: usize,
        forgotten: usize,
    },

    /// Operation confirmed by the provider
    OperationApplied { zone: String, operation: Operation },

    /// Operation logged but not executed
    OperationSimulated { zone: String, operation: Operation },

    /// Operation failed; later operations were not attempted
    OperationFailed {
        zone: String,
        operation: Operation,
        error: String,
    },

    /// Ledger persisted
    LedgerSaved { zone: String, records: usize },

    /// Zone run finished
    ZoneFinished { zone: String, complete: bool },
}

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Simulate operations and never persist the ledger
    pub dry_run: bool,

    /// Capacity of the event channel; events are dropped when it is full
    pub event_channel_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            event_channel_capacity: 1000,
        }
    }
}

/// Summary of a finished zone run
#[derive(Debug)]
pub struct ZoneReport {
    /// Zone name
    pub zone: String,
    /// The computed plan
    pub plan: Plan,
    /// What was applied or simulated
    pub apply: ApplyReport,
    /// Whether the ledger was written
    pub ledger_saved: bool,
}

/// Core synchronisation engine
///
/// Runs one zone at a time, sequentially. The engine owns no retry policy:
/// adapters retry reads, and a failed mutation ends the zone run.
pub struct SyncEngine {
    /// Desired state
    source: Arc<dyn RecordSource>,

    /// Hosted zone
    provider: Box<dyn DnsProvider>,

    /// Ledger storage
    state_store: Arc<dyn StateStore>,

    /// Run settings
    options: EngineOptions,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Arc<dyn RecordSource>,
        provider: Box<dyn DnsProvider>,
        state_store: Arc<dyn StateStore>,
        options: EngineOptions,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        if options.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }

        let (tx, rx) = mpsc::channel(options.event_channel_capacity);

        let engine = Self {
            source,
            provider,
            state_store,
            options,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Whether this engine simulates operations
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Synchronise one zone
    ///
    /// # Returns
    ///
    /// - `Ok(ZoneReport)`: Every operation applied (or simulated)
    /// - `Err(Error::PartialApply)`: An operation failed; the ledger of the
    ///   committed subset was saved
    /// - `Err(Error)`: A fetch, load or save failed
    pub async fn sync_zone(&self, zone: &str) -> Result<ZoneReport> {
        info!(
            "Synchronising zone {} via {} [mode: {}]",
            zone,
            self.provider.provider_name(),
            if self.options.dry_run { "DRY-RUN" } else { "LIVE" }
        );
        self.emit_event(EngineEvent::ZoneStarted {
            zone: zone.to_string(),
            dry_run: self.options.dry_run,
        });

        info!("Fetching {} records for zone {}", self.source.source_name(), zone);
        let desired = self.source.fetch_desired(zone).await?;

        info!("Fetching current records for zone {}", zone);
        let actual = self.provider.fetch_actual(zone).await?;

        info!("Loading ledger for zone {}", zone);
        let managed = self.state_store.load(zone).await?;

        validate_all(&[&desired, &actual, &managed])?;

        let plan = reconcile(&desired, &actual, &managed);
        debug!(
            "Zone {}: {} desired, {} actual, {} managed",
            zone,
            desired.len(),
            actual.len(),
            managed.len()
        );
        info!(
            "Zone {}: {} operation(s), {} shadowed, {} forgotten",
            zone,
            plan.operations.len(),
            plan.shadowed.len(),
            plan.forgotten.len()
        );
        self.emit_event(EngineEvent::PlanComputed {
            zone: zone.to_string(),
            operations: plan.operations.len(),
            shadowed: plan.shadowed.len(),
            forgotten: plan.forgotten.len(),
        });

        if self.options.dry_run {
            let apply = simulate_plan(zone, &plan, &managed);
            for operation in &apply.simulated {
                self.emit_event(EngineEvent::OperationSimulated {
                    zone: zone.to_string(),
                    operation: operation.clone(),
                });
            }
            info!("This is a dry run for zone {}; ledger left untouched", zone);
            self.emit_event(EngineEvent::ZoneFinished {
                zone: zone.to_string(),
                complete: true,
            });
            return Ok(ZoneReport {
                zone: zone.to_string(),
                plan,
                apply,
                ledger_saved: false,
            });
        }

        let apply = apply_plan(zone, &plan, &managed, self.provider.as_ref()).await;
        for operation in &apply.committed {
            self.emit_event(EngineEvent::OperationApplied {
                zone: zone.to_string(),
                operation: operation.clone(),
            });
        }
        if let Some(failed) = &apply.failed {
            self.emit_event(EngineEvent::OperationFailed {
                zone: zone.to_string(),
                operation: failed.operation.clone(),
                error: failed.error.to_string(),
            });
        }

        let ledger_saved = if apply.ledger != managed {
            if let Err(e) = self.state_store.save(zone, &apply.ledger).await {
                return Err(self.unsaved_ledger(zone, &apply, e));
            }
            info!("Saved ledger for zone {}: {} record(s)", zone, apply.ledger.len());
            self.emit_event(EngineEvent::LedgerSaved {
                zone: zone.to_string(),
                records: apply.ledger.len(),
            });
            true
        } else {
            debug!("Ledger for zone {} unchanged, not rewriting", zone);
            false
        };

        let complete = apply.is_complete();
        self.emit_event(EngineEvent::ZoneFinished {
            zone: zone.to_string(),
            complete,
        });

        if let Some(failed) = &apply.failed {
            warn!(
                "Zone {}: {} committed, {} not attempted",
                zone,
                apply.committed.len(),
                apply.pending.len()
            );
            return Err(Error::PartialApply {
                zone: zone.to_string(),
                committed: apply.committed.len(),
                failed: format!("{}: {}", failed.operation, failed.error),
            });
        }

        Ok(ZoneReport {
            zone: zone.to_string(),
            plan,
            apply,
            ledger_saved,
        })
    }

    /// Report a failed ledger save without losing what the provider holds
    fn unsaved_ledger(&self, zone: &str, apply: &ApplyReport, cause: Error) -> Error {
        error!(
            "Zone {}: ledger not saved after {} committed operation(s), {} not attempted: {}",
            zone,
            apply.committed.len(),
            apply.pending.len(),
            cause
        );
        for operation in &apply.committed {
            error!("Zone {}: committed but unrecorded: {}", zone, operation);
        }
        if let Some(failed) = &apply.failed {
            error!("Zone {}: failed at {}: {}", zone, failed.operation, failed.error);
        }
        self.emit_event(EngineEvent::ZoneFinished {
            zone: zone.to_string(),
            complete: false,
        });

        let committed = apply
            .committed
            .iter()
            .map(|op| op.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Error::ledger_io(format!(
            "Zone {}: {} operation(s) committed [{}] but the ledger was not saved: {}",
            zone,
            apply.committed.len(),
            committed,
            cause
        ))
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Reject malformed records before they reach the reconciler
fn validate_all(sets: &[&RecordSet]) -> Result<()> {
    for set in sets {
        for (key, record) in set.iter() {
            record.validate()?;
            if &record.key() != key {
                return Err(Error::precondition(format!(
                    "Record {} stored under key {}",
                    record, key
                )));
            }
        }
    }
    Ok(())
}
