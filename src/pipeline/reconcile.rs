use tracing::{debug, error, info, warn};

use crate::database_ops::db::Db;
use crate::database_ops::reviews::write_enrichment;
use crate::matching::matcher::MatchRule;
use crate::matching::scanner::{CatalogScanner, CatalogSource};
use crate::models::{ExternalRecord, RecordStatus};

/// What happened to one external record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Matched {
        appid: i64,
        rule: MatchRule,
        tag_rows: u64,
    },
    Unmatched,
    /// Not ready for reconciliation; never looked up.
    Skipped(RecordStatus),
    /// Lookup or write failed; nothing was stored for this record.
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub total: usize,
    pub eligible: usize,
    pub skipped: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    fn record(&mut self, outcome: &RecordOutcome) {
        self.total += 1;
        match outcome {
            RecordOutcome::Skipped(_) => self.skipped += 1,
            RecordOutcome::Matched { .. } => {
                self.eligible += 1;
                self.matched += 1;
            }
            RecordOutcome::Unmatched => {
                self.eligible += 1;
                self.unmatched += 1;
            }
            RecordOutcome::Failed(_) => {
                self.eligible += 1;
                self.failed += 1;
            }
        }
    }

    pub fn log(&self) {
        info!(
            total = self.total,
            eligible = self.eligible,
            skipped = self.skipped,
            matched = self.matched,
            unmatched = self.unmatched,
            failed = self.failed,
            "reconciliation summary"
        );
    }
}

/// Resolves external records to catalog ids and stores their enrichment rows.
pub struct ReconciliationPipeline<'a, S: CatalogSource + ?Sized> {
    db: &'a Db,
    scanner: CatalogScanner<'a, S>,
    source_label: String,
}

impl<'a, S: CatalogSource + ?Sized> ReconciliationPipeline<'a, S> {
    /// `catalog` is scanned for matches; rows are written to `db` under
    /// `source_label`. In production both are the same store.
    pub fn new(db: &'a Db, catalog: &'a S, scan_batch_size: usize, source_label: impl Into<String>) -> Self {
        Self {
            db,
            scanner: CatalogScanner::new(catalog, scan_batch_size),
            source_label: source_label.into(),
        }
    }

    /// Reconcile every record in order. Individual failures are counted, never fatal.
    pub async fn run(&self, records: &[ExternalRecord]) -> (ReconcileSummary, Vec<RecordOutcome>) {
        info!(records = records.len(), source = %self.source_label, "starting reconciliation");
        let mut summary = ReconcileSummary::default();
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let outcome = self.reconcile(record).await;
            summary.record(&outcome);
            outcomes.push(outcome);
        }
        summary.log();
        (summary, outcomes)
    }

    /// Look one record up and, on a match, write its rows in their own transaction.
    pub async fn reconcile(&self, record: &ExternalRecord) -> RecordOutcome {
        if !record.status.is_ready() {
            debug!(title = %record.title, status = %record.status, "record not ready; skipped");
            return RecordOutcome::Skipped(record.status);
        }

        let verdict = match self.scanner.find_match(&record.title).await {
            Ok(v) => v,
            Err(e) => {
                warn!(title = %record.title, error = %e, "catalog scan failed");
                return RecordOutcome::Failed(e.to_string());
            }
        };
        let Some(appid) = verdict.matched_id.filter(|_| verdict.found) else {
            return RecordOutcome::Unmatched;
        };

        let written = async {
            let mut tx = self.db.pool.begin().await?;
            let rows = write_enrichment(&mut tx, appid, &self.source_label, record).await?;
            tx.commit().await?;
            anyhow::Ok(rows)
        }
        .await;
        match written {
            Ok(rows) => {
                debug!(
                    title = %record.title,
                    matched = verdict.matched_title.as_deref().unwrap_or_default(),
                    appid,
                    rule = %verdict.rule,
                    tags = record.tag_row_count(),
                    "record reconciled"
                );
                RecordOutcome::Matched {
                    appid,
                    rule: verdict.rule,
                    tag_rows: rows.tag_rows,
                }
            }
            Err(e) => {
                error!(title = %record.title, appid, error = %e, "enrichment write failed; record rolled back");
                RecordOutcome::Failed(e.to_string())
            }
        }
    }
}
