//! # rag-sync CLI Interface (Module)
//!
//! Command parsing and orchestration for the `rag-sync` binary. All sync
//! semantics (filtering, planning, execution, the ledger) live in
//! [`rag_sync_core`]; this module only wires configuration, the HTTP uploader
//! and Ctrl-C handling together and renders results.
//!
//! ## Subcommands
//! - `sync`: run one synchronisation and print the report.
//! - `plan`: list and plan without fetching or uploading (no token needed).
//! - `status`: summarise the ledger by status and show failed records.
//!
//! For programmatic and integration use, call [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, CliConfig};
use crate::upload::RagClient;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rag_sync_core::config::RunContext;
use rag_sync_core::contract::{LedgerStore, Uploader};
use rag_sync_core::filter::ItemFilter;
use rag_sync_core::ledger::{JsonFileLedger, LedgerSummary};
use rag_sync_core::reconcile::Action;
use rag_sync_core::synchronise::{preview, synchronise, Collaborators, SynchroniseReport};
use std::path::PathBuf;

/// CLI for rag-sync: keep a RAG ingestion profile in step with a document source.
#[derive(Parser)]
#[clap(
    name = "rag-sync",
    version,
    about = "Incrementally synchronise a document source into a RAG ingestion profile"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload new, changed and retryable items and record the outcomes
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Print the report as JSON
        #[clap(long)]
        json: bool,
    },
    /// Show what a sync would do without fetching or uploading anything
    Plan {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Summarise the status ledger
    Status {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config, json } => run_sync(load_config(config)?, json).await,
        Commands::Plan { config } => run_plan(load_config(config)?).await,
        Commands::Status { config } => run_status(load_config(config)?).await,
    }
}

async fn run_sync(config: CliConfig, json: bool) -> Result<()> {
    tracing::info!(command = "sync", "Starting synchronisation process");
    let filter = ItemFilter::new(&config.sync.filter)?;
    let ledger = JsonFileLedger::open(&config.sync.ledger.path)?;
    let uploader = RagClient::from_section(&config.rag)?;
    // Checked before any ledger write.
    uploader.check_profile().await.map_err(|e| {
        tracing::error!(command = "sync", error = %e, "Profile check failed, nothing was synchronised");
        anyhow!("profile check failed: {e}")
    })?;
    let source = config.sync.source.build();

    let ctx = RunContext::new(config.sync.policy.clone());
    let cancel = ctx.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight items");
            cancel.cancel();
        }
    });

    let collab = Collaborators {
        lister: &source,
        fetcher: &source,
        uploader: &uploader,
        ledger: &ledger,
    };
    let result = synchronise(&ctx, &filter, &config.sync.metadata, &collab).await;
    signal.abort();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(command = "sync", error = %e, "Synchronisation failed");
            return Err(e.into());
        }
    };
    tracing::info!(command = "sync", ?report, "Synchronisation complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.cancelled {
        return Err(anyhow!(
            "run {} was cancelled before all items were processed",
            report.run_id
        ));
    }
    if report.has_failures() {
        return Err(anyhow!(
            "run {} finished with {} failed item(s) and {} ledger error(s)",
            report.run_id,
            report.failures.len(),
            report.ledger_errors.len()
        ));
    }
    Ok(())
}

async fn run_plan(config: CliConfig) -> Result<()> {
    tracing::info!(command = "plan", "Planning without executing");
    let filter = ItemFilter::new(&config.sync.filter)?;
    let ledger = JsonFileLedger::open(&config.sync.ledger.path)?;
    let source = config.sync.source.build();
    let ctx = RunContext::new(config.sync.policy.clone());

    let preview = preview(&ctx, &filter, &source, &ledger).await?;
    for entry in &preview.plan.entries {
        println!(
            "{:<7} {:<16} {}",
            format!("{:?}", entry.action),
            format!("{:?}", entry.reason),
            entry.id
        );
    }
    println!(
        "plan: {} upload, {} retry, {} skip, {} delete, {} filtered",
        preview.plan.count(Action::Upload),
        preview.plan.count(Action::Retry),
        preview.plan.count(Action::Skip),
        preview.plan.count(Action::Delete),
        preview.filtered
    );
    Ok(())
}

async fn run_status(config: CliConfig) -> Result<()> {
    let path = &config.sync.ledger.path;
    let ledger = JsonFileLedger::open(path)?;
    let records = ledger
        .list()
        .await
        .with_context(|| format!("Failed to read ledger {}", path.display()))?;
    let summary = LedgerSummary::from_records(records);

    println!("ledger: {} ({} records)", path.display(), summary.total);
    for (status, count) in &summary.by_status {
        println!("  {status:<8} {count}");
    }
    for record in &summary.failed {
        println!(
            "failed: {} (attempts: {}) {}",
            record.id,
            record.attempt_count,
            record.last_error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn print_report(report: &SynchroniseReport) {
    println!(
        "run {}: {} uploaded, {} retried, {} skipped, {} failed, {} deleted, {} filtered",
        report.run_id,
        report.uploaded,
        report.retried,
        report.skipped,
        report.failed,
        report.deleted,
        report.filtered
    );
    for failed in &report.failures {
        println!("failed: {} {}", failed.id, failed.error);
    }
    for failed in &report.ledger_errors {
        println!("ledger error: {} {}", failed.id, failed.error);
    }
    if report.cancelled {
        println!("run cancelled: remaining items will be picked up by the next run");
    }
}
