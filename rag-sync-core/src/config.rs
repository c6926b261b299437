use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::contract::SyncStatus;
use crate::download::SourceConfig;
use crate::filter::FilterConfig;
use crate::metadata::MetadataConfig;

/// Everything a sync run needs apart from the upload destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub policy: SyncPolicy,
    #[serde(default)]
    pub metadata: MetadataConfig,
    pub ledger: LedgerConfig,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            source = ?self.source,
            ledger = %self.ledger.path.display(),
            max_retries = self.policy.max_retries,
            delete_missing = self.policy.delete_missing,
            max_parallel_executions = self.policy.max_parallel_executions,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

/// Where the status ledger lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub path: PathBuf,
}

/// Retry, deletion and concurrency policy for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Upper bound on failed attempts per item; an item whose
    /// `attempt_count` reached this value is no longer retried.
    pub max_retries: u32,
    /// Statuses eligible for retry.
    pub retry_failed_statuses: BTreeSet<SyncStatus>,
    /// Delete documents whose items disappeared from the source.
    pub delete_missing: bool,
    pub max_parallel_executions: usize,
    /// Delete the previous document after a changed item was re-uploaded.
    pub delete_superseded: bool,
    /// Item names never retried automatically.
    pub retry_exclude: Vec<String>,
    /// When non-empty, only failures whose error contains one of these
    /// fragments are retried.
    pub retry_error_contains: Vec<String>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy {
            max_retries: 1,
            retry_failed_statuses: BTreeSet::from([SyncStatus::Failed]),
            delete_missing: false,
            max_parallel_executions: 5,
            delete_superseded: true,
            retry_exclude: Vec::new(),
            retry_error_contains: Vec::new(),
        }
    }
}

/// Run-scoped state passed explicitly into execution.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub policy: SyncPolicy,
    cancelled: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(policy: SyncPolicy) -> Self {
        RunContext {
            run_id: Uuid::new_v4(),
            policy,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation: units not yet started are dropped from the run.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
