use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sqlx::{Sqlite, Transaction};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::database_ops::catalog::insert_game_tx;
use crate::database_ops::db::Db;
use crate::models::CanonicalGame;

const STEAMSPY_URL: &str = "https://steamspy.com/api.php";

/// One entry of the bulk catalog listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogSummary {
    pub appid: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub developer: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub score_rank: Option<String>,
    #[serde(default)]
    pub positive: i64,
    #[serde(default)]
    pub negative: i64,
    #[serde(default)]
    pub owners: Option<String>,
    #[serde(default)]
    pub average_forever: i64,
}

/// `score_rank` arrives as a string, a number, or null depending on the entry.
fn flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Paged bulk listing of the catalog. An empty page marks the end.
#[async_trait]
pub trait CatalogFeed: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Vec<CatalogSummary>>;
}

/// Decode one SteamSpy `request=all` page (an object keyed by appid).
pub fn parse_page(body: &str) -> Result<Vec<CatalogSummary>> {
    let map: BTreeMap<String, CatalogSummary> =
        serde_json::from_str(body).context("failed to decode steamspy page")?;
    let mut entries: Vec<CatalogSummary> = map.into_values().collect();
    entries.sort_by_key(|e| e.appid);
    Ok(entries)
}

pub struct SteamSpyClient {
    client: Client,
    base_url: String,
}

impl SteamSpyClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gamecard-builder/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: STEAMSPY_URL.to_string(),
        })
    }
}

#[async_trait]
impl CatalogFeed for SteamSpyClient {
    async fn fetch_page(&self, page: u32) -> Result<Vec<CatalogSummary>> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("request", "all".to_string()), ("page", page.to_string())])
            .send()
            .await
            .with_context(|| format!("steamspy page {page} request failed"))?
            .error_for_status()
            .with_context(|| format!("steamspy page {page} bad status"))?;
        let body = resp.text().await?;
        parse_page(&body).with_context(|| format!("steamspy page {page}"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogImportSummary {
    pub pages: u32,
    pub saved: usize,
    pub skipped: usize,
}

async fn write_summary(tx: &mut Transaction<'_, Sqlite>, entry: &CatalogSummary) -> Result<bool> {
    let inserted = insert_game_tx(tx, &CanonicalGame::new(entry.appid, entry.name.trim())).await?;
    // a title collision leaves the id absent from main_game; nothing to hang stats on
    let present: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM main_game WHERE steam_appid = ?)")
            .bind(entry.appid)
            .fetch_one(&mut **tx)
            .await?;
    if !present {
        return Ok(false);
    }
    sqlx::query(
        "INSERT OR REPLACE INTO steam_spy (
            steam_appid, developer, publisher, score_rank,
            positive_reviews, negative_reviews, owners, average_forever
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.appid)
    .bind(&entry.developer)
    .bind(&entry.publisher)
    .bind(&entry.score_rank)
    .bind(entry.positive)
    .bind(entry.negative)
    .bind(&entry.owners)
    .bind(entry.average_forever)
    .execute(&mut **tx)
    .await?;
    Ok(inserted)
}

/// Build the canonical catalog from the bulk feed.
///
/// Pages are requested from 0 until one comes back empty or
/// `catalog_max_games` new rows have been saved. Each page is committed as one
/// transaction. Entries without a name or with a non-positive id are skipped.
pub async fn import_catalog<F: CatalogFeed + ?Sized>(
    db: &Db,
    feed: &F,
    config: &PipelineConfig,
) -> Result<CatalogImportSummary> {
    let mut summary = CatalogImportSummary::default();
    let mut page: u32 = 0;
    info!(target_games = config.catalog_max_games, "importing catalog");

    while summary.saved < config.catalog_max_games {
        let entries = match feed.fetch_page(page).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(page, error = %e, "catalog page fetch failed; stopping import");
                break;
            }
        };
        if entries.is_empty() {
            info!(page, "catalog feed exhausted");
            break;
        }
        summary.pages += 1;

        let mut tx = db.pool.begin().await?;
        let mut saved_here = 0usize;
        for entry in &entries {
            if summary.saved + saved_here >= config.catalog_max_games {
                break;
            }
            if entry.appid <= 0 || entry.name.trim().is_empty() {
                summary.skipped += 1;
                continue;
            }
            match write_summary(&mut tx, entry).await {
                Ok(true) => saved_here += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    warn!(appid = entry.appid, error = %e, "catalog row insert failed");
                    summary.skipped += 1;
                }
            }
        }
        tx.commit()
            .await
            .with_context(|| format!("failed to commit catalog page {page}"))?;
        summary.saved += saved_here;
        info!(page, rows = entries.len(), saved = saved_here, total = summary.saved, "catalog page stored");

        page += 1;
        if !config.catalog_page_delay.is_zero() {
            tokio::time::sleep(config.catalog_page_delay).await;
        }
    }

    info!(
        pages = summary.pages,
        saved = summary.saved,
        skipped = summary.skipped,
        "catalog import complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct PagedFeed {
        pages: Vec<Vec<CatalogSummary>>,
        requested: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl CatalogFeed for PagedFeed {
        async fn fetch_page(&self, page: u32) -> Result<Vec<CatalogSummary>> {
            self.requested.lock().unwrap().push(page);
            Ok(self.pages.get(page as usize).cloned().unwrap_or_default())
        }
    }

    fn summary(appid: i64, name: &str) -> CatalogSummary {
        CatalogSummary {
            appid,
            name: name.to_string(),
            developer: Some("Valve".into()),
            publisher: Some("Valve".into()),
            score_rank: None,
            positive: 10,
            negative: 1,
            owners: Some("1,000,000 .. 2,000,000".into()),
            average_forever: 60,
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            catalog_page_delay: Duration::ZERO,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn score_rank_accepts_string_number_or_null() {
        let body = r#"{
            "10": {"appid": 10, "name": "Counter-Strike", "score_rank": "", "positive": 1, "negative": 2, "owners": "10,000,000 .. 20,000,000", "average_forever": 5},
            "20": {"appid": 20, "name": "Team Fortress Classic", "score_rank": 97},
            "30": {"appid": 30, "name": "Day of Defeat", "score_rank": null}
        }"#;
        let entries = parse_page(body).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].score_rank, None);
        assert_eq!(entries[1].score_rank.as_deref(), Some("97"));
        assert_eq!(entries[2].score_rank, None);
        assert_eq!(entries[0].owners.as_deref(), Some("10,000,000 .. 20,000,000"));
    }

    #[tokio::test]
    async fn imports_until_empty_page() {
        let db = Db::memory().await.unwrap();
        let feed = PagedFeed {
            pages: vec![
                vec![summary(400, "Portal"), summary(620, "Portal 2")],
                vec![summary(0, "Broken"), summary(70, " "), summary(220, "Half-Life 2")],
            ],
            requested: Mutex::new(Vec::new()),
        };
        let out = import_catalog(&db, &feed, &config()).await.unwrap();
        assert_eq!(out, CatalogImportSummary { pages: 2, saved: 3, skipped: 2 });
        assert_eq!(*feed.requested.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(db.catalog_ids().await.unwrap(), vec![220, 400, 620]);
        assert_eq!(db.count_rows("steam_spy").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn stops_at_max_games() {
        let db = Db::memory().await.unwrap();
        let feed = PagedFeed {
            pages: vec![vec![summary(1, "A"), summary(2, "B"), summary(3, "C")]],
            requested: Mutex::new(Vec::new()),
        };
        let cfg = PipelineConfig {
            catalog_max_games: 2,
            ..config()
        };
        let out = import_catalog(&db, &feed, &cfg).await.unwrap();
        assert_eq!(out.saved, 2);
        assert_eq!(db.catalog_ids().await.unwrap(), vec![1, 2]);
        assert_eq!(*feed.requested.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let db = Db::memory().await.unwrap();
        let feed = PagedFeed {
            pages: vec![vec![summary(400, "Portal")]],
            requested: Mutex::new(Vec::new()),
        };
        import_catalog(&db, &feed, &config()).await.unwrap();
        let again = import_catalog(&db, &feed, &config()).await.unwrap();
        assert_eq!(again.saved, 0);
        assert_eq!(again.skipped, 1);
        assert_eq!(db.count_rows("main_game").await.unwrap(), 1);
        assert_eq!(db.count_rows("steam_spy").await.unwrap(), 1);
    }
}
