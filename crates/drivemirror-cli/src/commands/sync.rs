//! Sync command - mirror the source folder into the destination folder
//!
//! Provides the `drivemirror sync` CLI command which:
//! 1. Loads configuration and applies command-line overrides
//! 2. Loads stored OAuth tokens for both accounts
//! 3. Creates the drive adapters (listing, folders, uploads)
//! 4. Runs the SyncOrchestrator and displays the summary
//!
//! Ctrl-C (or SIGTERM) cancels the run. The command exits with an error when
//! any file could not be copied.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use drivemirror_core::config::Config;
use drivemirror_core::domain::RemotePath;
use drivemirror_graph::auth::{OAuthFlow, RefreshingTokenProvider, TokenProvider};
use drivemirror_graph::client::GraphClient;
use drivemirror_graph::provider::GraphDrive;
use drivemirror_graph::upload::{GraphTransfer, TransferSettings};
use drivemirror_sync::{format_bytes, RetryPolicy, SyncOptions, SyncOrchestrator, SyncReport};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::{load_config, AccountRole};
use crate::output::{get_formatter, OutputFormat, OutputFormatter};
use crate::token_store::TokenStore;

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Folder on the source account (overrides sync.source_dir)
    #[arg(long)]
    pub source: Option<String>,

    /// Folder on the destination account (overrides sync.destination_dir)
    #[arg(long)]
    pub destination: Option<String>,

    /// Number of parallel uploads (overrides sync.workers)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Retry failed files until they succeed
    #[arg(long)]
    pub forever: bool,
}

impl SyncCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let mut config = load_config(config_path)?;
        self.apply_overrides(&mut config);

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            bail!("Invalid configuration: {}", messages.join("; "));
        }

        let source_root = RemotePath::normalize(&config.sync.source_dir)
            .context("Invalid sync.source_dir")?;
        let destination_root = RemotePath::normalize(&config.sync.destination_dir)
            .context("Invalid sync.destination_dir")?;

        let store = TokenStore::default_location()?;
        let source_client = build_client(AccountRole::Source, &config, &store)?;
        let destination_client = build_client(AccountRole::Destination, &config, &store)?;

        let source = Arc::new(GraphDrive::new(
            AccountRole::Source.as_str(),
            source_client.clone(),
        ));
        let destination = Arc::new(GraphDrive::new(
            AccountRole::Destination.as_str(),
            destination_client.clone(),
        ));
        let transfer = Arc::new(GraphTransfer::new(
            source_client,
            destination_client,
            TransferSettings::from(&config.transfer),
        ));

        let mut options = SyncOptions::from_config(&config.sync, &config.retry);
        if self.forever {
            options.retry = RetryPolicy::forever(Duration::from_secs(config.retry.delay_secs));
        }

        let cancel = CancellationToken::new();
        let signal_task = tokio::spawn(cancel_on_signal(cancel.clone()));

        let orchestrator = SyncOrchestrator::new(source, destination, transfer, options)
            .with_cancellation(cancel);

        formatter.info(&format!(
            "Mirroring {} -> {} with {} worker{}",
            source_root,
            destination_root,
            options.workers,
            if options.workers == 1 { "" } else { "s" }
        ));

        let started = Instant::now();
        let result = orchestrator.run(&source_root, &destination_root).await;
        signal_task.abort();

        let report = result.context("Sync failed")?;
        display_report(&report, started.elapsed(), format, formatter.as_ref());

        if !report.is_success() {
            bail!(
                "{} file{} could not be copied",
                report.failed,
                if report.failed == 1 { "" } else { "s" }
            );
        }
        Ok(())
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.sync.source_dir = source.clone();
        }
        if let Some(destination) = &self.destination {
            config.sync.destination_dir = destination.clone();
        }
        if let Some(workers) = self.workers {
            config.sync.workers = workers;
        }
    }
}

/// Builds an authenticated client for one account
///
/// Refreshed tokens are written back to the token store.
fn build_client(role: AccountRole, config: &Config, store: &TokenStore) -> Result<GraphClient> {
    let tokens = store.load(role)?;
    let flow = OAuthFlow::new(role.account_config(config))
        .with_context(|| format!("Invalid OAuth settings for the {role} account"))?;

    let hook_store = store.clone();
    let provider = RefreshingTokenProvider::new(flow, tokens).with_refresh_hook(Box::new(
        move |tokens| {
            if let Err(e) = hook_store.save(role, tokens) {
                warn!(account = %role, error = %e, "Failed to persist refreshed tokens");
            }
        },
    ));
    let provider: Arc<dyn TokenProvider> = Arc::new(provider);

    Ok(
        GraphClient::with_base_url(provider, config.transfer.api_base_url.clone())
            .with_request_timeout(Duration::from_secs(config.transfer.request_timeout_secs)),
    )
}

fn display_report(
    report: &SyncReport,
    elapsed: Duration,
    format: OutputFormat,
    formatter: &dyn OutputFormatter,
) {
    let duration_ms = elapsed.as_millis() as u64;

    if matches!(format, OutputFormat::Json) {
        let failures: Vec<serde_json::Value> = report
            .failures
            .iter()
            .map(|(path, error)| serde_json::json!({"path": path.as_str(), "error": error}))
            .collect();
        formatter.print_json(&serde_json::json!({
            "skipped": report.skipped,
            "enqueued": report.enqueued,
            "uploaded": report.uploaded,
            "failed": report.failed,
            "listing_errors": report.listing_errors,
            "bytes_uploaded": report.bytes_uploaded,
            "resumes": report.resumes,
            "failures": failures,
            "duration_ms": duration_ms,
        }));
        return;
    }

    let duration_display = if duration_ms >= 1000 {
        format!("{:.1}s", duration_ms as f64 / 1000.0)
    } else {
        format!("{}ms", duration_ms)
    };

    if report.enqueued == 0 && report.listing_errors == 0 {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!("Sync completed in {}", duration_display));
    }

    formatter.field("Already synced", &report.skipped.to_string());
    if report.enqueued > 0 {
        formatter.field(
            "Uploaded",
            &format!(
                "{} of {} ({})",
                report.uploaded,
                report.enqueued,
                format_bytes(report.bytes_uploaded)
            ),
        );
    }
    if report.resumes > 0 {
        formatter.field("Resumes", &report.resumes.to_string());
    }
    formatter.field("Duration", &duration_display);
    if report.listing_errors > 0 {
        formatter.warn(&format!(
            "{} folder listing{} failed and {} treated as empty",
            report.listing_errors,
            if report.listing_errors == 1 { "" } else { "s" },
            if report.listing_errors == 1 { "was" } else { "were" }
        ));
    }
    if report.failed > 0 {
        formatter.error(&format!(
            "{} file{} failed:",
            report.failed,
            if report.failed == 1 { "" } else { "s" }
        ));
        for (path, error) in &report.failures {
            formatter.info(&format!("  - {}: {}", path, error));
        }
    }
}

/// Cancels `token` on SIGINT (Ctrl-C) or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), stopping sync");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping sync");
        }
    }

    token.cancel();
}
