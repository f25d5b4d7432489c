//! Sync engine: makes the output directory mirror the remote item set.
//!
//! The local inventory and the remote list feed [`plan::plan`]; the
//! resulting downloads run through a FIFO [`limiter::Limiter`] with each
//! item's failure isolated and its partial file cleaned up, then stale
//! local files are removed.

pub mod delete;
pub mod error;
pub mod file;
pub mod inventory;
pub mod limiter;
pub mod plan;

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures_util::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

pub use self::delete::DeletionReport;
pub use self::error::{DownloadError, SyncError};
pub use self::limiter::Limiter;
pub use self::plan::{local_file_name, RemoteItem, SyncPlan};

/// Subset of application config consumed by the sync engine.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub(crate) directory: PathBuf,
    pub(crate) concurrency: usize,
    pub(crate) item_timeout: Option<Duration>,
    pub(crate) dry_run: bool,
    pub(crate) no_progress_bar: bool,
}

/// Settled result of one item's download.
#[derive(Debug)]
pub enum DownloadOutcome {
    Succeeded { bytes: u64 },
    Failed(DownloadError),
}

/// What a run did, keyed by item id so completion order is irrelevant.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub remote_total: usize,
    pub already_present: usize,
    pub outcomes: BTreeMap<String, DownloadOutcome>,
    pub deletions: DeletionReport,
    /// Stale files left alone because the run was interrupted.
    pub deletions_skipped: usize,
    pub dry_run: bool,
    pub elapsed: Duration,
}

impl SyncSummary {
    pub fn downloaded(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, DownloadOutcome::Succeeded { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DownloadError)> {
        self.outcomes.iter().filter_map(|(id, o)| match o {
            DownloadOutcome::Failed(e) => Some((id.as_str(), e)),
            DownloadOutcome::Succeeded { .. } => None,
        })
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.outcomes
            .values()
            .map(|o| match o {
                DownloadOutcome::Succeeded { bytes } => *bytes,
                DownloadOutcome::Failed(_) => 0,
            })
            .sum()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    pub fn log(&self) {
        if self.dry_run {
            tracing::info!("── Dry Run Summary ──");
            tracing::info!(
                "  {} remote items, {} already present",
                self.remote_total,
                self.already_present
            );
            return;
        }

        for (id, e) in self.failures() {
            tracing::error!("Download failed: {}: {}", id, e);
        }

        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} remote items, {} already present",
            self.remote_total,
            self.already_present
        );
        tracing::info!(
            "  {} downloaded ({} bytes), {} failed",
            self.downloaded(),
            self.bytes_downloaded(),
            self.failed_count()
        );
        if self.deletions_skipped > 0 {
            tracing::info!(
                "  {} deletions skipped after shutdown",
                self.deletions_skipped
            );
        } else {
            tracing::info!(
                "  {} deleted, {} failed to delete",
                self.deletions.deleted.len(),
                self.deletions.failed.len()
            );
        }
        tracing::info!("  elapsed: {}", format_duration(self.elapsed));
    }
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY (e.g. piped output, cron jobs).
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

/// Execute a plan: download what is missing, then delete what is stale.
///
/// Item failures never fail the run; they are recorded in the summary.
/// After shutdown is requested, in-flight downloads are aborted and the
/// deletion phase is skipped.
pub async fn execute(
    client: &Client,
    plan: &SyncPlan,
    access_token: Option<&str>,
    config: &SyncConfig,
    shutdown_token: CancellationToken,
) -> Result<SyncSummary, SyncError> {
    let started = Instant::now();
    let mut summary = SyncSummary {
        remote_total: plan.remote_total,
        already_present: plan.already_present,
        dry_run: config.dry_run,
        ..Default::default()
    };

    if config.dry_run {
        for item in &plan.to_download {
            tracing::info!("[DRY RUN] Would download {}", local_file_name(&item.id));
        }
        for name in &plan.to_delete {
            tracing::info!("[DRY RUN] Would delete {}", name);
        }
        summary.elapsed = started.elapsed();
        return Ok(summary);
    }

    tracing::info!("{} to download", plan.to_download.len());
    summary.outcomes = download_all(
        client,
        &plan.to_download,
        access_token,
        config,
        shutdown_token.clone(),
    )
    .await?;

    if shutdown_token.is_cancelled() {
        summary.deletions_skipped = plan.to_delete.len();
    } else if !plan.to_delete.is_empty() {
        tracing::info!("Deleting {}", plan.to_delete.len());
        summary.deletions = delete::delete_stale(&config.directory, &plan.to_delete).await;
    }

    summary.elapsed = started.elapsed();
    Ok(summary)
}

/// Download every item through one limiter, waiting for all to settle.
pub async fn download_all(
    client: &Client,
    items: &[RemoteItem],
    access_token: Option<&str>,
    config: &SyncConfig,
    shutdown_token: CancellationToken,
) -> Result<BTreeMap<String, DownloadOutcome>, SyncError> {
    let limiter = Limiter::new(config.concurrency)?;
    tracing::debug!(concurrency = limiter.concurrency(), "Starting downloads");
    let total = items.len();
    let pb = create_progress_bar(config.no_progress_bar, total as u64);

    let mut pending: FuturesUnordered<_> = items
        .iter()
        .map(|item| {
            let limiter = &limiter;
            let shutdown_token = &shutdown_token;
            async move {
                let result = limiter
                    .submit(|| download_item(client, item, access_token, config, shutdown_token))
                    .await;
                (item, result)
            }
        })
        .collect();

    let mut outcomes = BTreeMap::new();
    let mut settled = 0usize;
    while let Some((item, result)) = pending.next().await {
        settled += 1;
        let outcome = match result {
            Ok(bytes) => {
                pb.set_message(local_file_name(&item.id));
                DownloadOutcome::Succeeded { bytes }
            }
            Err(e) => {
                if !e.is_cancelled() {
                    pb.suspend(|| {
                        tracing::warn!("Failed to download {}: {}", item.download_url, e);
                    });
                }
                DownloadOutcome::Failed(e)
            }
        };
        pb.inc(1);
        tracing::debug!(id = %item.id, "Finished {} of {}", settled, total);
        outcomes.insert(item.id.clone(), outcome);
    }
    pb.finish_and_clear();

    Ok(outcomes)
}

/// One item's fetch-and-write, bounded by the optional timeout and
/// aborted on shutdown. Dropping the inner future removes any partial file.
async fn download_item(
    client: &Client,
    item: &RemoteItem,
    access_token: Option<&str>,
    config: &SyncConfig,
    shutdown_token: &CancellationToken,
) -> Result<u64, DownloadError> {
    if shutdown_token.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }

    let download_path = config.directory.join(local_file_name(&item.id));
    tracing::debug!(id = %item.id, path = %download_path.display(), "downloading");

    let fetch = file::download_file(client, &item.download_url, access_token, &download_path);
    let bounded = async {
        match config.item_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| DownloadError::Timeout(limit))?,
            None => fetch.await,
        }
    };

    tokio::select! {
        biased;
        _ = shutdown_token.cancelled() => Err(DownloadError::Cancelled),
        result = bounded => result,
    }
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
