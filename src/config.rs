use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::util::env::{env_duration_ms, env_flag, env_list, env_opt, env_parse};

/// Pipeline stages the binary can run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Build `main_game` from the bulk catalog feed.
    Catalog,
    /// Pull per-id store details for every catalog entry.
    Details,
    /// Reconcile an offline review/tag file against the catalog.
    Reviews,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Catalog, Stage::Details, Stage::Reviews];

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "catalog" => Some(Stage::Catalog),
            "details" => Some(Stage::Details),
            "reviews" => Some(Stage::Reviews),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Catalog => "catalog",
            Stage::Details => "details",
            Stage::Reviews => "reviews",
        })
    }
}

/// Every tunable of the ingestion and reconciliation pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub database_path: PathBuf,
    /// Identifiers per detail-ingestion transaction.
    pub batch_size: usize,
    pub inter_request_delay: Duration,
    pub inter_batch_delay: Duration,
    /// Retry ceiling for rate-limited or network-failed pulls of one identifier.
    pub max_retries: u32,
    /// Wait used on a 429 without a usable `Retry-After`.
    pub rate_limit_wait: Duration,
    /// Ceiling on a server-supplied `Retry-After`.
    pub max_retry_after: Duration,
    /// Pause before retrying an HTML error page or a network failure.
    pub transient_retry_pause: Duration,
    /// Log cumulative progress every this many fetched identifiers.
    pub progress_every: usize,
    pub resume_marker_path: PathBuf,
    /// Catalog rows per page while scanning for a title match.
    pub scan_batch_size: usize,
    pub catalog_max_games: usize,
    pub catalog_page_delay: Duration,
    /// Re-run the catalog import even when `main_game` already has rows.
    pub catalog_refresh: bool,
    pub reviews_path: PathBuf,
    /// Label stored in the `source` column of the review tables.
    pub review_source: String,
    pub stages: Vec<Stage>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./steam_api.db"),
            batch_size: 25,
            inter_request_delay: Duration::from_millis(1500),
            inter_batch_delay: Duration::from_secs(10),
            max_retries: 3,
            rate_limit_wait: Duration::from_secs(30),
            max_retry_after: Duration::from_secs(300),
            transient_retry_pause: Duration::from_secs(5),
            progress_every: 100,
            resume_marker_path: PathBuf::from("./processed_apps.txt"),
            scan_batch_size: 50,
            catalog_max_games: 20_000,
            catalog_page_delay: Duration::from_secs(1),
            catalog_refresh: false,
            reviews_path: PathBuf::from("./steam_verdicts.json"),
            review_source: "ign".to_string(),
            stages: Stage::ALL.to_vec(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by environment (and `.env`) values.
    pub fn from_env() -> Self {
        let d = Self::default();
        let stages = match env_list("GAMECARD_STAGES") {
            Some(names) => parse_stages(&names),
            None => d.stages.clone(),
        };
        Self {
            database_path: env_opt("GAMECARD_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.database_path),
            batch_size: env_parse("INGEST_BATCH_SIZE", d.batch_size),
            inter_request_delay: env_duration_ms("INGEST_REQUEST_DELAY_MS", d.inter_request_delay),
            inter_batch_delay: env_duration_ms("INGEST_BATCH_DELAY_MS", d.inter_batch_delay),
            max_retries: env_parse("INGEST_MAX_RETRIES", d.max_retries),
            rate_limit_wait: env_duration_ms("INGEST_RATE_LIMIT_WAIT_MS", d.rate_limit_wait),
            max_retry_after: env_duration_ms("INGEST_MAX_RETRY_AFTER_MS", d.max_retry_after),
            transient_retry_pause: env_duration_ms("INGEST_TRANSIENT_PAUSE_MS", d.transient_retry_pause),
            progress_every: env_parse("INGEST_PROGRESS_EVERY", d.progress_every),
            resume_marker_path: env_opt("INGEST_RESUME_MARKER")
                .map(PathBuf::from)
                .unwrap_or(d.resume_marker_path),
            scan_batch_size: env_parse("CATALOG_SCAN_BATCH_SIZE", d.scan_batch_size),
            catalog_max_games: env_parse("CATALOG_MAX_GAMES", d.catalog_max_games),
            catalog_page_delay: env_duration_ms("CATALOG_PAGE_DELAY_MS", d.catalog_page_delay),
            catalog_refresh: env_flag("CATALOG_REFRESH", d.catalog_refresh),
            reviews_path: env_opt("REVIEWS_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.reviews_path),
            review_source: env_opt("REVIEWS_SOURCE")
                .map(|s| s.trim().to_ascii_lowercase())
                .unwrap_or(d.review_source),
            stages,
        }
        .clamped()
    }

    /// Zero sizes would stall the batch loops; lift them to 1.
    pub fn clamped(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.scan_batch_size = self.scan_batch_size.max(1);
        self.progress_every = self.progress_every.max(1);
        self
    }

    pub fn runs(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

/// Known stage names in execution order; unknown names are logged and dropped.
fn parse_stages(names: &[String]) -> Vec<Stage> {
    let mut stages: Vec<Stage> = Vec::new();
    for name in names {
        match Stage::parse(name) {
            Some(stage) if !stages.contains(&stage) => stages.push(stage),
            Some(_) => {}
            None => tracing::warn!(stage = %name, "unknown stage ignored"),
        }
    }
    stages.sort();
    stages
}
