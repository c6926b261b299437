//! High-level pipeline: orchestrates list → filter → plan → fetch → upload → ledger.
//!
//! This module drives one sync run over a single configured source:
//!   - Lists the source and applies the scan filter
//!   - Plans against the ledger (see [`crate::reconcile`])
//!   - Executes the plan with bounded concurrency, writing every outcome to the ledger
//!   - Aggregates a [`SynchroniseReport`] of what was uploaded, skipped, retried, failed and deleted
//!
//! # Error Handling
//! Only run-level problems (listing the source, reading the ledger, a bad
//! filter) return [`SyncError`]; they happen before any ledger mutation.
//! Everything that goes wrong for a single item is recorded on that item's
//! ledger record and in the report, and never stops the other items.
//!
//! A ledger write that fails after the platform confirmed an upload is the
//! worst case: the document exists but the ledger does not know it. Those
//! land in [`SynchroniseReport::ledger_errors`], are logged at error level and
//! fail the run.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Dry run: [`preview`]
//! - Executing a precomputed plan: [`execute`]

use std::collections::HashSet;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RunContext;
use crate::contract::{
    ContentFetcher, LedgerStore, NewDocument, SourceLister, SyncRecord, SyncStatus, Uploader,
};
use crate::download::content_hash;
use crate::error::SyncError;
use crate::filter::ItemFilter;
use crate::metadata::MetadataConfig;
use crate::reconcile::{self, Action, PlanEntry, SyncPlan};

/// The collaborators one run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub lister: &'a dyn SourceLister,
    pub fetcher: &'a dyn ContentFetcher,
    pub uploader: &'a dyn Uploader,
    pub ledger: &'a dyn LedgerStore,
}

/// Summary of one run, suitable for logging or machine consumption.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SynchroniseReport {
    pub run_id: Uuid,
    pub uploaded: usize,
    pub skipped: usize,
    pub retried: usize,
    pub failed: usize,
    pub deleted: usize,
    /// Items dropped by the scan filter.
    pub filtered: usize,
    pub failures: Vec<FailedItem>,
    /// Items whose outcome could not be written to the ledger.
    pub ledger_errors: Vec<FailedItem>,
    /// The run was cancelled; items not started are absent from the counts.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub id: String,
    pub error: String,
}

impl SynchroniseReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || !self.ledger_errors.is_empty()
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Uploaded { retried: false } => self.uploaded += 1,
            Outcome::Uploaded { retried: true } => self.retried += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Failed(item) => {
                self.failed += 1;
                self.failures.push(item);
            }
            Outcome::LedgerWrite(item) => {
                self.failed += 1;
                self.ledger_errors.push(item);
            }
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Uploaded { retried: bool },
    Skipped,
    Deleted,
    Failed(FailedItem),
    LedgerWrite(FailedItem),
}

/// Result of listing, filtering and planning without executing anything.
#[derive(Debug, Clone)]
pub struct Preview {
    pub plan: SyncPlan,
    pub filtered: usize,
}

/// List the source, filter it and plan against the ledger. Nothing is written,
/// so neither a fetcher nor an uploader is needed.
pub async fn preview(
    ctx: &RunContext,
    filter: &ItemFilter,
    lister: &dyn SourceLister,
    ledger: &dyn LedgerStore,
) -> Result<Preview, SyncError> {
    let label = lister.label();
    info!(run_id = %ctx.run_id, source = %label, "[SYNC] Listing source");
    let listed = lister.list().await.map_err(|e| {
        error!(source = %label, error = %e, "[SYNC][ERROR] Listing source failed");
        e
    })?;
    let listed_count = listed.len();
    let filtered = filter.apply(listed);
    info!(
        listed = listed_count,
        kept = filtered.kept.len(),
        rejected = filtered.rejected,
        "[SYNC] Source listed and filtered"
    );

    let plan = reconcile::plan(filtered.kept, ledger, &ctx.policy)
        .await
        .map_err(|e| {
            error!(error = %e, "[SYNC][ERROR] Reading ledger failed");
            e
        })?;
    Ok(Preview {
        plan,
        filtered: filtered.rejected,
    })
}

/// Entrypoint: run one full synchronisation of the configured source.
pub async fn synchronise(
    ctx: &RunContext,
    filter: &ItemFilter,
    metadata: &MetadataConfig,
    collab: &Collaborators<'_>,
) -> Result<SynchroniseReport, SyncError> {
    info!(run_id = %ctx.run_id, "[SYNC] Starting synchronisation");
    let Preview { plan, filtered } = preview(ctx, filter, collab.lister, collab.ledger).await?;
    let mut report = execute(plan, ctx, metadata, collab).await;
    report.filtered = filtered;
    Ok(report)
}

/// Execute a plan. Per-item failures are recorded, never returned.
pub async fn execute(
    plan: SyncPlan,
    ctx: &RunContext,
    metadata: &MetadataConfig,
    collab: &Collaborators<'_>,
) -> SynchroniseReport {
    let mut report = SynchroniseReport {
        run_id: ctx.run_id,
        ..Default::default()
    };
    let label = collab.lister.label();

    // Mark first sightings before any network call, so an interrupted run
    // leaves them distinguishable from ids never seen. One ledger write for
    // the whole batch.
    let mut runnable = plan.entries;
    let markers: Vec<SyncRecord> = runnable
        .iter_mut()
        .filter(|entry| entry.action == Action::Upload && entry.record.is_none())
        .filter_map(|entry| {
            let record = SyncRecord::unknown(entry.item.as_ref()?);
            entry.record = Some(record.clone());
            Some(record)
        })
        .collect();
    if !markers.is_empty() {
        debug!(count = markers.len(), "[SYNC] Recording new items as Unknown");
        let new_ids: HashSet<String> = markers.iter().map(|r| r.id.clone()).collect();
        if let Err(e) = collab.ledger.put_many(markers).await {
            error!(error = %e, "[SYNC][ERROR] Could not record new items, not uploading them");
            let (unrecorded, rest): (Vec<PlanEntry>, Vec<PlanEntry>) = runnable
                .into_iter()
                .partition(|entry| new_ids.contains(&entry.id));
            for entry in unrecorded {
                report.record(Outcome::LedgerWrite(FailedItem {
                    id: entry.id,
                    error: format!("ledger: {e}"),
                }));
            }
            runnable = rest;
        }
    }

    let parallelism = ctx.policy.max_parallel_executions.max(1);
    debug!(entries = runnable.len(), parallelism, "[SYNC] Executing plan");
    let outcomes: Vec<Option<Outcome>> = stream::iter(runnable)
        .map(|entry| run_entry(entry, ctx, metadata, &label, collab))
        .buffer_unordered(parallelism)
        .collect()
        .await;

    for outcome in outcomes {
        match outcome {
            Some(outcome) => report.record(outcome),
            None => report.cancelled = true,
        }
    }

    if report.cancelled {
        warn!(run_id = %ctx.run_id, "[SYNC] Run cancelled, remaining items were not started");
    }
    for failed in &report.ledger_errors {
        error!(id = %failed.id, error = %failed.error, "[SYNC][ERROR] Ledger out of step with platform");
    }
    info!(
        run_id = %ctx.run_id,
        uploaded = report.uploaded,
        retried = report.retried,
        skipped = report.skipped,
        failed = report.failed,
        deleted = report.deleted,
        "[SYNC] Synchronisation finished"
    );
    report
}

async fn run_entry(
    entry: PlanEntry,
    ctx: &RunContext,
    metadata: &MetadataConfig,
    label: &str,
    collab: &Collaborators<'_>,
) -> Option<Outcome> {
    if ctx.is_cancelled() {
        return None;
    }
    let outcome = match entry.action {
        Action::Skip if entry.reason.is_failure() => {
            let error = entry
                .record
                .as_ref()
                .and_then(|r| r.last_error.clone())
                .unwrap_or_else(|| format!("{:?}", entry.reason));
            debug!(id = %entry.id, reason = ?entry.reason, "Skipping item that needs attention");
            Outcome::Failed(FailedItem {
                id: entry.id,
                error,
            })
        }
        Action::Skip => Outcome::Skipped,
        Action::Upload | Action::Retry => upload_entry(entry, ctx, metadata, label, collab).await,
        Action::Delete => delete_entry(entry, collab).await,
    };
    Some(outcome)
}

async fn upload_entry(
    entry: PlanEntry,
    ctx: &RunContext,
    metadata: &MetadataConfig,
    label: &str,
    collab: &Collaborators<'_>,
) -> Outcome {
    let retried = entry.action == Action::Retry;
    let Some(item) = entry.item else {
        return Outcome::Failed(FailedItem {
            id: entry.id,
            error: "no scanned item for upload".into(),
        });
    };
    let mut record = entry.record.unwrap_or_else(|| SyncRecord::unknown(&item));
    record.status = SyncStatus::Starting;
    record.name = Some(item.name.clone());
    record.updated_at = Some(Utc::now());
    if let Err(e) = collab.ledger.put(record.clone()).await {
        error!(id = %item.id, error = %e, "[SYNC][ERROR] Could not mark item as starting");
        return Outcome::LedgerWrite(FailedItem {
            id: item.id,
            error: format!("ledger: {e}"),
        });
    }

    info!(id = %item.id, path = %item.path, retried, "[SYNC][UPLOAD] Fetching item");
    let fetched = match collab.fetcher.fetch(&item).await {
        Ok(fetched) => fetched,
        Err(e) => {
            warn!(id = %item.id, error = %e, "[SYNC][ERROR] Fetch failed");
            return record_failure(record, format!("fetch: {e}"), collab).await;
        }
    };

    let doc_metadata = metadata.build(&item, label);
    let request = NewDocument {
        file_name: &fetched.file_name,
        content_type: &fetched.content_type,
        content: &fetched.bytes,
        metadata: &doc_metadata,
    };
    let uploaded = match collab.uploader.upload(request).await {
        Ok(uploaded) => uploaded,
        Err(e) => {
            warn!(id = %item.id, error = %e, "[SYNC][ERROR] Upload failed");
            return record_failure(record, format!("upload: {e}"), collab).await;
        }
    };

    let superseded = record
        .remote_document_id
        .take()
        .filter(|old| *old != uploaded.document_id);
    record.status = SyncStatus::Success;
    record.remote_document_id = Some(uploaded.document_id.clone());
    record.last_error = None;
    record.attempt_count = 0;
    record.last_synced_marker = item.last_modified.clone();
    record.content_hash = item
        .content_hash
        .clone()
        .or_else(|| Some(content_hash(&fetched.bytes)));
    record.updated_at = Some(Utc::now());

    if let Err(e) = collab.ledger.put(record).await {
        error!(
            id = %item.id,
            document_id = %uploaded.document_id,
            error = %e,
            "[SYNC][ERROR] Document uploaded but ledger write failed"
        );
        return Outcome::LedgerWrite(FailedItem {
            id: item.id,
            error: format!(
                "ledger: document {} uploaded but not recorded: {e}",
                uploaded.document_id
            ),
        });
    }
    info!(
        id = %item.id,
        document_id = %uploaded.document_id,
        index_status = ?uploaded.index_status,
        "[SYNC][UPLOAD] Upload confirmed"
    );

    if ctx.policy.delete_superseded {
        if let Some(old) = superseded {
            match collab.uploader.delete(&old).await {
                Ok(()) => debug!(id = %item.id, document_id = %old, "Deleted superseded document"),
                Err(e) => {
                    warn!(id = %item.id, document_id = %old, error = %e, "Could not delete superseded document")
                }
            }
        }
    }
    Outcome::Uploaded { retried }
}

async fn record_failure(
    mut record: SyncRecord,
    error: String,
    collab: &Collaborators<'_>,
) -> Outcome {
    record.status = SyncStatus::Failed;
    record.attempt_count += 1;
    record.last_error = Some(error.clone());
    record.updated_at = Some(Utc::now());
    let id = record.id.clone();
    match collab.ledger.put(record).await {
        Ok(()) => Outcome::Failed(FailedItem { id, error }),
        Err(e) => {
            error!(%id, error = %e, "[SYNC][ERROR] Could not record failure");
            Outcome::LedgerWrite(FailedItem {
                id,
                error: format!("{error}; ledger: {e}"),
            })
        }
    }
}

async fn delete_entry(entry: PlanEntry, collab: &Collaborators<'_>) -> Outcome {
    let Some(record) = entry.record else {
        return Outcome::Skipped;
    };
    if let Some(document_id) = record.remote_document_id.clone() {
        info!(id = %entry.id, %document_id, "[SYNC][DELETE] Deleting document of missing item");
        if let Err(e) = collab.uploader.delete(&document_id).await {
            warn!(id = %entry.id, error = %e, "[SYNC][ERROR] Delete failed");
            return record_failure(record, format!("delete: {e}"), collab).await;
        }
    }
    match collab.ledger.delete(&entry.id).await {
        Ok(()) => Outcome::Deleted,
        Err(e) => {
            error!(id = %entry.id, error = %e, "[SYNC][ERROR] Document deleted but ledger record kept");
            Outcome::LedgerWrite(FailedItem {
                id: entry.id,
                error: format!("ledger: {e}"),
            })
        }
    }
}
