//! Three-way reconciliation of desired, actual and managed record sets
//!
//! [`reconcile`] is pure: it compares the records Re2o wants, the records the
//! provider holds and the ledger of records this tool wrote, and returns a
//! [`Plan`]. [`apply_plan`] executes a plan through a [`DnsProvider`] and folds
//! each verified operation into a copy of the ledger; [`simulate_plan`] does
//! the same for a dry run without touching the provider or the ledger.
//!
//! ## Ownership Rules
//!
//! | desired | managed | actual | result                                 |
//! |---------|---------|--------|----------------------------------------|
//! | yes     | yes     | no     | Create, keep in ledger                 |
//! | yes     | yes     | differs| Update, keep in ledger                 |
//! | yes     | yes     | equal  | nothing, keep in ledger                |
//! | yes     | no      | yes    | shadowed (manual record wins)          |
//! | yes     | no      | no     | Create unless a name conflict blocks it|
//! | no      | yes     | yes    | Delete, drop from ledger               |
//! | no      | yes     | no     | forgotten, drop from ledger            |
//! | no      | no      | yes    | never touched                          |
//!
//! ## Ordering
//!
//! Deletes come first so a name changing type (CNAME replaced by A) is freed
//! before it is reused. Each phase is sorted by `(type, name)`.

use tracing::{debug, error, info, warn};

use crate::error::{Error, RemoteState};
use crate::record::{Record, RecordKey, RecordSet, RecordType};
use crate::traits::DnsProvider;

/// Kind of a planned operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    /// Remove a tool-owned record
    Delete,
    /// Create a record the provider does not hold
    Create,
    /// Replace the value or TTL of a tool-owned record
    Update,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OperationKind::Delete => "DELETE",
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
        };
        f.write_str(label)
    }
}

/// A single change to apply at the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Delete a tool-owned record the provider still holds
    Delete {
        /// The record as held in the ledger
        record: Record,
    },
    /// Create a new record
    Create {
        /// The desired record
        record: Record,
    },
    /// Replace an existing record
    Update {
        /// The record as the provider reported it
        previous: Record,
        /// The desired record
        record: Record,
    },
}

impl Operation {
    /// Kind of this operation
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
        }
    }

    /// The record this operation targets (the new state for Create/Update)
    pub fn record(&self) -> &Record {
        match self {
            Operation::Delete { record }
            | Operation::Create { record }
            | Operation::Update { record, .. } => record,
        }
    }

    /// Identity of the targeted record
    pub fn key(&self) -> RecordKey {
        self.record().key()
    }

    /// Record the effect of this operation in `ledger`
    pub fn fold_into(&self, ledger: &mut RecordSet) {
        match self {
            Operation::Delete { record } => {
                ledger.remove(&record.key());
            }
            Operation::Create { record } | Operation::Update { record, .. } => {
                ledger.insert(record.key(), record.clone());
            }
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Update { previous, record } => {
                write!(f, "UPDATE {} (was {})", record, previous.value)
            }
            other => write!(f, "{} {}", other.kind(), other.record()),
        }
    }
}

/// Result of [`reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Operations in execution order
    pub operations: Vec<Operation>,
    /// Ledger after every operation succeeds
    pub new_managed: RecordSet,
    /// Ledger keys whose records are already gone from the provider
    pub forgotten: Vec<RecordKey>,
    /// Desired keys left alone because an externally owned record holds them
    pub shadowed: Vec<RecordKey>,
}

impl Plan {
    /// Whether the plan changes nothing at the provider
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations of the given kind
    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }
}

/// Compute the operations that move `actual` toward `desired`
///
/// Never fails and never touches records missing from `managed` that the
/// provider already holds. Inputs must have been validated by the adapters.
pub fn reconcile(desired: &RecordSet, actual: &RecordSet, managed: &RecordSet) -> Plan {
    let mut deletes = Vec::new();
    let mut changes = Vec::new();
    let mut new_managed = RecordSet::new();
    let mut forgotten = Vec::new();
    let mut shadowed = Vec::new();

    for (key, owned) in managed {
        if desired.contains_key(key) {
            continue;
        }
        match actual.get(key) {
            Some(_) => deletes.push(Operation::Delete {
                record: owned.clone(),
            }),
            None => {
                debug!("Ledger entry {} already gone from provider", key);
                forgotten.push(key.clone());
            }
        }
    }

    for (key, wanted) in desired {
        match (managed.contains_key(key), actual.get(key)) {
            (true, Some(present)) => {
                if !wanted.matches(present) {
                    changes.push(Operation::Update {
                        previous: present.clone(),
                        record: wanted.clone(),
                    });
                }
                new_managed.insert(key.clone(), wanted.clone());
            }
            (owned, None) => {
                if let Some(blocker) = conflicting_record(key, desired, actual, managed) {
                    debug!("{} shadowed by conflicting {}", key, blocker);
                    shadowed.push(key.clone());
                    if owned {
                        forgotten.push(key.clone());
                    }
                    continue;
                }
                changes.push(Operation::Create {
                    record: wanted.clone(),
                });
                new_managed.insert(key.clone(), wanted.clone());
            }
            (false, Some(present)) => {
                if !wanted.matches(present) {
                    debug!(
                        "{} is externally owned ({}), ignoring desired value {}",
                        key, present.value, wanted.value
                    );
                }
                shadowed.push(key.clone());
            }
        }
    }

    // Both loops walk BTreeMaps, so each phase is already in key order.
    let mut operations = deletes;
    operations.extend(changes);
    forgotten.sort();

    Plan {
        operations,
        new_managed,
        forgotten,
        shadowed,
    }
}

/// Find a record that will still hold `key.name` with a CNAME-incompatible type
///
/// Externally owned records always survive the run; managed ones survive only
/// while still desired.
fn conflicting_record(
    key: &RecordKey,
    desired: &RecordSet,
    actual: &RecordSet,
    managed: &RecordSet,
) -> Option<RecordKey> {
    RecordType::ALL
        .iter()
        .filter(|other| key.record_type.conflicts_with(**other))
        .map(|other| RecordKey::new(*other, key.name.clone()))
        .find(|other| {
            actual.contains_key(other)
                && (!managed.contains_key(other) || desired.contains_key(other))
        })
}

/// An operation the provider did not confirm
#[derive(Debug)]
pub struct FailedOperation {
    /// The operation that failed
    pub operation: Operation,
    /// Why it failed
    pub error: Error,
}

/// Outcome of applying (or simulating) a [`Plan`]
#[derive(Debug)]
pub struct ApplyReport {
    /// Operations confirmed by the provider, in order
    pub committed: Vec<Operation>,
    /// The operation that stopped the apply, if any
    pub failed: Option<FailedOperation>,
    /// Operations never attempted because an earlier one failed
    pub pending: Vec<Operation>,
    /// Operations logged but not executed (dry run)
    pub simulated: Vec<Operation>,
    /// Ledger reflecting exactly the verified effects
    pub ledger: RecordSet,
}

impl ApplyReport {
    /// Whether every operation of the plan was applied
    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && self.pending.is_empty()
    }
}

/// Execute `plan` against `provider`, folding only verified effects
///
/// Operations run one at a time in plan order. The first failure stops the
/// run; a failure whose remote state is [`RemoteState::Committed`] is folded
/// before stopping.
pub async fn apply_plan(
    zone: &str,
    plan: &Plan,
    managed: &RecordSet,
    provider: &dyn DnsProvider,
) -> ApplyReport {
    let mut ledger = settled_ledger(plan, managed);

    let mut committed = Vec::new();
    let mut failed = None;
    let mut pending = Vec::new();

    let mut operations = plan.operations.iter();
    for operation in operations.by_ref() {
        info!("[{}] {}", zone, operation);
        match provider.apply(zone, operation).await {
            Ok(()) => {
                operation.fold_into(&mut ledger);
                committed.push(operation.clone());
            }
            Err(e) => {
                if e.remote_state() == Some(RemoteState::Committed) {
                    warn!(
                        "[{}] {} reported an error but was committed: {}",
                        zone, operation, e
                    );
                    operation.fold_into(&mut ledger);
                } else {
                    error!("[{}] {} failed: {}", zone, operation, e);
                }
                failed = Some(FailedOperation {
                    operation: operation.clone(),
                    error: e,
                });
                break;
            }
        }
    }
    pending.extend(operations.cloned());

    if !pending.is_empty() {
        warn!(
            "[{}] {} operation(s) not attempted after failure",
            zone,
            pending.len()
        );
    }

    ApplyReport {
        committed,
        failed,
        pending,
        simulated: Vec::new(),
        ledger,
    }
}

/// Ledger before any operation runs
///
/// Drops forgotten keys and refreshes owned entries that already match the
/// provider, since no call is needed to verify them.
pub fn settled_ledger(plan: &Plan, managed: &RecordSet) -> RecordSet {
    let mut ledger = managed.clone();
    for key in &plan.forgotten {
        ledger.remove(key);
    }
    for (key, record) in &plan.new_managed {
        if ledger.contains_key(key) && !plan.operations.iter().any(|op| &op.key() == key) {
            ledger.insert(key.clone(), record.clone());
        }
    }
    ledger
}

/// Log what `plan` would do; the returned ledger equals `managed`
pub fn simulate_plan(zone: &str, plan: &Plan, managed: &RecordSet) -> ApplyReport {
    for operation in &plan.operations {
        info!("[{}] [DRY-RUN] Would apply {}", zone, operation);
    }
    for key in &plan.forgotten {
        info!("[{}] [DRY-RUN] Would forget ledger entry {}", zone, key);
    }

    ApplyReport {
        committed: Vec::new(),
        failed: None,
        pending: Vec::new(),
        simulated: plan.operations.clone(),
        ledger: managed.clone(),
    }
}
