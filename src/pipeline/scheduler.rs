use anyhow::Result;
use sqlx::Connection;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::database_ops::db::Db;
use crate::database_ops::steam::provider::{write_detail, AppDetail, DetailFetcher, FetchError};
use crate::pipeline::resume::ProcessedSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Identifiers handed to the run.
    pub total: usize,
    /// Skipped because the resume marker already had them.
    pub already_processed: usize,
    /// Fetched, written and committed during this run.
    pub fetched: usize,
    /// Abandoned after a fetch or write failure, or lost to a failed commit.
    pub failed: usize,
    pub batches: usize,
    pub failed_commits: usize,
}

impl IngestSummary {
    /// Share of `total` that is now processed, across this and earlier runs.
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.already_processed + self.fetched) as f64 / self.total as f64 * 100.0
    }
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

/// Paced, batched, resumable pull of per-id store details.
///
/// Each batch is one transaction. Identifiers are appended to the resume
/// marker only after their batch commits, so a crash at any point leaves every
/// uncommitted identifier eligible for the next run.
pub struct IngestionScheduler<'a, F: DetailFetcher + ?Sized> {
    db: &'a Db,
    fetcher: &'a F,
    config: &'a PipelineConfig,
    processed: ProcessedSet,
}

impl<'a, F: DetailFetcher + ?Sized> IngestionScheduler<'a, F> {
    pub fn new(db: &'a Db, fetcher: &'a F, config: &'a PipelineConfig, processed: ProcessedSet) -> Self {
        Self {
            db,
            fetcher,
            config,
            processed,
        }
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Pull every catalog identifier, in id order.
    pub async fn run_catalog(&mut self) -> Result<IngestSummary> {
        let ids = self.db.catalog_ids().await?;
        self.run(&ids).await
    }

    /// Pull details for `ids`, skipping those already in the resume marker.
    ///
    /// Per-identifier and per-batch failures are logged and counted; only a
    /// failure to update the resume marker aborts the run.
    pub async fn run(&mut self, ids: &[i64]) -> Result<IngestSummary> {
        let pending: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !self.processed.contains(*id))
            .collect();
        let mut summary = IngestSummary {
            total: ids.len(),
            already_processed: ids.len() - pending.len(),
            ..IngestSummary::default()
        };
        info!(
            total = summary.total,
            already_processed = summary.already_processed,
            pending = pending.len(),
            marker = ?self.processed.path(),
            "starting detail ingestion"
        );

        let batch_size = self.config.batch_size.max(1);
        let progress_every = self.config.progress_every.max(1);
        let mut next_progress = progress_every;
        let batch_count = pending.len().div_ceil(batch_size);

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            let start = index * batch_size;
            info!(
                batch = index + 1,
                of = batch_count,
                from = start + 1,
                to = start + batch.len(),
                pending = pending.len(),
                "processing batch"
            );
            self.process_batch(batch, &mut summary).await?;

            if summary.fetched >= next_progress {
                info!(
                    fetched = summary.fetched,
                    pending = pending.len(),
                    percent = %format!("{:.1}", summary.fetched as f64 / pending.len() as f64 * 100.0),
                    "progress"
                );
                next_progress = (summary.fetched / progress_every + 1) * progress_every;
            }

            if index + 1 < batch_count {
                info!(wait_ms = self.config.inter_batch_delay.as_millis() as u64, "batch complete; waiting");
                pause(self.config.inter_batch_delay).await;
            }
        }

        info!(
            processed = summary.already_processed + summary.fetched,
            total = summary.total,
            fetched = summary.fetched,
            failed = summary.failed,
            failed_commits = summary.failed_commits,
            percent = %format!("{:.1}", summary.percent_complete()),
            "detail ingestion finished"
        );
        Ok(summary)
    }

    async fn process_batch(&mut self, batch: &[i64], summary: &mut IngestSummary) -> Result<()> {
        summary.batches += 1;
        let mut tx = match self.db.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(error = %e, "failed to begin batch transaction; skipping batch");
                summary.failed_commits += 1;
                summary.failed += batch.len();
                return Ok(());
            }
        };

        let mut staged: Vec<i64> = Vec::with_capacity(batch.len());
        for (i, &appid) in batch.iter().enumerate() {
            match self.fetch_with_retry(appid).await {
                Ok(detail) => {
                    // savepoint per identifier so a half-written row never reaches the commit
                    let written = async {
                        let mut sp = Connection::begin(&mut *tx).await?;
                        write_detail(&mut sp, appid, &detail).await?;
                        sp.commit().await?;
                        anyhow::Ok(())
                    }
                    .await;
                    match written {
                        Ok(()) => staged.push(appid),
                        Err(e) => {
                            error!(appid, error = %e, "detail write failed");
                            summary.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(appid, error = %e, "abandoning identifier");
                    summary.failed += 1;
                }
            }
            if i + 1 < batch.len() {
                pause(self.config.inter_request_delay).await;
            }
        }

        match tx.commit().await {
            Ok(()) => {
                self.processed.mark_all(&staged)?;
                summary.fetched += staged.len();
            }
            Err(e) => {
                error!(error = %e, rows = staged.len(), "batch commit failed; batch rolled back");
                summary.failed_commits += 1;
                summary.failed += staged.len();
            }
        }
        Ok(())
    }

    /// Fetch one identifier, retrying transient failures.
    ///
    /// Rate limits and network errors are retried up to `max_retries` times;
    /// an HTML error page is retried once. Anything else is final. A server
    /// `Retry-After` is honored up to `max_retry_after`.
    async fn fetch_with_retry(&self, appid: i64) -> Result<AppDetail, FetchError> {
        let max_retries = self.config.max_retries;
        let mut rate_limited = 0u32;
        let mut network_failures = 0u32;
        let mut html_retried = false;
        loop {
            let err = match self.fetcher.fetch_detail(appid).await {
                Ok(detail) => return Ok(detail),
                Err(e) => e,
            };
            if !err.is_transient() {
                return Err(err);
            }
            match err {
                FetchError::RateLimited { retry_after } if rate_limited < max_retries => {
                    rate_limited += 1;
                    let wait = retry_after
                        .map(|d| d.min(self.config.max_retry_after))
                        .unwrap_or(self.config.rate_limit_wait);
                    warn!(
                        appid,
                        attempt = rate_limited,
                        max_retries,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited; retrying"
                    );
                    pause(wait).await;
                }
                FetchError::HtmlBody if !html_retried => {
                    html_retried = true;
                    warn!(appid, "html response, likely throttled; retrying once");
                    pause(self.config.transient_retry_pause).await;
                }
                FetchError::Network(ref msg) if network_failures < max_retries => {
                    network_failures += 1;
                    warn!(appid, attempt = network_failures, error = %msg, "network error; retrying");
                    pause(self.config.transient_retry_pause * network_failures).await;
                }
                other => return Err(other),
            }
        }
    }
}
