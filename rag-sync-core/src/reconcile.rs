//! Planning half of the reconciler: diff a scan against the ledger.
//!
//! [`plan_against`] is pure and deterministic. Scanned items come out sorted
//! by id, followed by tombstones sorted by id, so two plans over the same
//! inputs compare equal.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::SyncPolicy;
use crate::contract::{LedgerStore, RemoteItem, SyncRecord, SyncStatus};
use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Upload,
    Skip,
    Retry,
    Delete,
}

/// Why the planner chose an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanReason {
    /// No record, or an `Unknown` one.
    New,
    /// Marker or content hash differs from the last successful sync.
    Changed,
    /// No versioning signal on either side.
    Unversioned,
    Unchanged,
    /// `Success` record without a document id.
    CorruptRecord,
    RetryEligible,
    RetriesExhausted,
    /// Status, name or error excluded by the retry policy.
    NotRetryable,
    /// Tombstone: recorded but absent from the scan.
    Missing,
}

impl PlanReason {
    /// Skips that need manual attention and are reported as failures.
    pub fn is_failure(self) -> bool {
        matches!(self, PlanReason::RetriesExhausted | PlanReason::NotRetryable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub id: String,
    pub action: Action,
    pub reason: PlanReason,
    /// Scanned item; `None` for tombstones.
    pub item: Option<RemoteItem>,
    /// Ledger record at planning time.
    pub record: Option<SyncRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub entries: Vec<PlanEntry>,
}

impl SyncPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, action: Action) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    pub fn action_for(&self, id: &str) -> Option<Action> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.action)
    }

    /// `(id, action)` pairs in plan order.
    pub fn actions(&self) -> Vec<(String, Action)> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), e.action))
            .collect()
    }
}

/// Read the ledger once and plan against it.
pub async fn plan<L>(
    remote_items: Vec<RemoteItem>,
    ledger: &L,
    policy: &SyncPolicy,
) -> Result<SyncPlan, LedgerError>
where
    L: LedgerStore + ?Sized,
{
    let records = ledger.list().await?;
    Ok(plan_against(remote_items, records, policy))
}

pub fn plan_against(
    remote_items: Vec<RemoteItem>,
    records: Vec<SyncRecord>,
    policy: &SyncPolicy,
) -> SyncPlan {
    let mut scanned: BTreeMap<String, RemoteItem> = BTreeMap::new();
    for item in remote_items {
        if let Some(previous) = scanned.insert(item.id.clone(), item) {
            debug!(id = %previous.id, "Duplicate item in listing, keeping the last one");
        }
    }
    let mut ledger: BTreeMap<String, SyncRecord> =
        records.into_iter().map(|r| (r.id.clone(), r)).collect();

    let mut entries = Vec::with_capacity(scanned.len());
    for (id, item) in scanned {
        let record = ledger.remove(&id);
        let (action, reason) = decide(&item, record.as_ref(), policy);
        debug!(%id, ?action, ?reason, "Planned item");
        entries.push(PlanEntry {
            id,
            action,
            reason,
            item: Some(item),
            record,
        });
    }

    // What is left in `ledger` was not seen in this scan.
    if policy.delete_missing {
        for (id, record) in ledger {
            debug!(%id, "Planned tombstone deletion");
            entries.push(PlanEntry {
                id,
                action: Action::Delete,
                reason: PlanReason::Missing,
                item: None,
                record: Some(record),
            });
        }
    } else if !ledger.is_empty() {
        debug!(
            tombstones = ledger.len(),
            "Leaving records of unlisted items untouched"
        );
    }

    let plan = SyncPlan { entries };
    info!(
        upload = plan.count(Action::Upload),
        retry = plan.count(Action::Retry),
        skip = plan.count(Action::Skip),
        delete = plan.count(Action::Delete),
        "Sync plan computed"
    );
    plan
}

fn decide(
    item: &RemoteItem,
    record: Option<&SyncRecord>,
    policy: &SyncPolicy,
) -> (Action, PlanReason) {
    let Some(record) = record else {
        return (Action::Upload, PlanReason::New);
    };
    match record.status {
        SyncStatus::Unknown => (Action::Upload, PlanReason::New),
        SyncStatus::Success if record.is_corrupt() => (Action::Retry, PlanReason::CorruptRecord),
        SyncStatus::Success => match has_changed(item, record) {
            Some(true) => (Action::Upload, PlanReason::Changed),
            Some(false) => (Action::Skip, PlanReason::Unchanged),
            None => (Action::Upload, PlanReason::Unversioned),
        },
        // A first attempt interrupted before its outcome was recorded.
        SyncStatus::Starting if record.attempt_count == 0 => (Action::Upload, PlanReason::New),
        SyncStatus::Failed | SyncStatus::Pending | SyncStatus::Starting => {
            retry_decision(item, record, policy)
        }
    }
}

/// `None` when neither markers nor content hashes are available on both sides.
fn has_changed(item: &RemoteItem, record: &SyncRecord) -> Option<bool> {
    if let (Some(current), Some(synced)) = (&item.last_modified, &record.last_synced_marker) {
        return Some(current != synced);
    }
    if let (Some(current), Some(synced)) = (&item.content_hash, &record.content_hash) {
        return Some(current != synced);
    }
    None
}

fn retry_decision(
    item: &RemoteItem,
    record: &SyncRecord,
    policy: &SyncPolicy,
) -> (Action, PlanReason) {
    if !policy.retry_failed_statuses.contains(&record.status) {
        return (Action::Skip, PlanReason::NotRetryable);
    }
    if record.attempt_count >= policy.max_retries {
        return (Action::Skip, PlanReason::RetriesExhausted);
    }
    if policy.retry_exclude.iter().any(|name| name == &item.name) {
        return (Action::Skip, PlanReason::NotRetryable);
    }
    if !policy.retry_error_contains.is_empty() {
        let error = record.last_error.as_deref().unwrap_or_default();
        if !policy
            .retry_error_contains
            .iter()
            .any(|fragment| error.contains(fragment.as_str()))
        {
            return (Action::Skip, PlanReason::NotRetryable);
        }
    }
    (Action::Retry, PlanReason::RetryEligible)
}
