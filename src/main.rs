use anyhow::{Context, Result};
use gamecard_builder::config::{PipelineConfig, Stage};
use gamecard_builder::database_ops::db::Db;
use gamecard_builder::database_ops::reviews::load_external_records;
use gamecard_builder::database_ops::steam::provider::SteamStoreClient;
use gamecard_builder::database_ops::steamspy::provider::{import_catalog, SteamSpyClient};
use gamecard_builder::logging::init_tracing;
use gamecard_builder::pipeline::reconcile::ReconciliationPipeline;
use gamecard_builder::pipeline::resume::ProcessedSet;
use gamecard_builder::pipeline::scheduler::IngestionScheduler;
use gamecard_builder::util::env as env_util;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    let _ = init_tracing("info,sqlx=warn");

    let config = PipelineConfig::from_env();
    info!(
        db = %config.database_path.display(),
        stages = ?config.stages,
        "starting gamecard builder"
    );
    let db = Db::open(&config.database_path).await?;

    if config.runs(Stage::Catalog) {
        catalog_stage(&db, &config).await?;
    }
    if config.runs(Stage::Details) {
        details_stage(&db, &config).await?;
    }
    if config.runs(Stage::Reviews) {
        reviews_stage(&db, &config).await?;
    }
    info!("all stages complete");
    Ok(())
}

async fn catalog_stage(db: &Db, config: &PipelineConfig) -> Result<()> {
    let existing = db.game_count().await?;
    if existing > 0 && !config.catalog_refresh {
        info!(existing, "catalog already populated; set CATALOG_REFRESH=1 to re-import");
        return Ok(());
    }
    let feed = SteamSpyClient::new().context("failed to build catalog client")?;
    import_catalog(db, &feed, config).await?;
    Ok(())
}

async fn details_stage(db: &Db, config: &PipelineConfig) -> Result<()> {
    if db.game_count().await? == 0 {
        warn!("catalog is empty; nothing to ingest");
        return Ok(());
    }
    let processed = ProcessedSet::load(&config.resume_marker_path)?;
    let fetcher = SteamStoreClient::new().context("failed to build store client")?;
    let mut scheduler = IngestionScheduler::new(db, &fetcher, config, processed);
    scheduler.run_catalog().await?;
    Ok(())
}

async fn reviews_stage(db: &Db, config: &PipelineConfig) -> Result<()> {
    if !config.reviews_path.exists() {
        warn!(path = %config.reviews_path.display(), "reviews file not found; skipping reconciliation");
        return Ok(());
    }
    let records = load_external_records(&config.reviews_path)?;
    let pipeline = ReconciliationPipeline::new(db, db, config.scan_batch_size, config.review_source.as_str());
    pipeline.run(&records).await;
    Ok(())
}
