use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::Deserialize;
use sqlx::{Sqlite, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const APPDETAILS_URL: &str = "https://store.steampowered.com/api/appdetails";
const STORE_APP_URL: &str = "https://store.steampowered.com/app";

/// Failure modes of a single appdetails pull.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("html body instead of json")]
    HtmlBody,
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("json decode failed: {0}")]
    Decode(String),
    #[error("api reported success=false or returned no data")]
    Unsuccessful,
}

impl FetchError {
    /// Transient failures are worth retrying the same identifier for.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::HtmlBody | FetchError::Network(_)
        )
    }
}

/// The fields kept from a store appdetails payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppDetail {
    pub short_description: String,
    pub website: Option<String>,
    pub header_image: Option<String>,
    pub background: Option<String>,
    pub genres: Vec<String>,
    pub screenshots: Vec<String>,
    pub price: Option<String>,
    pub achievements: u32,
}

impl AppDetail {
    pub fn steam_url(appid: i64) -> String {
        format!("{STORE_APP_URL}/{appid}")
    }

    pub fn first_screenshot(&self) -> Option<&str> {
        self.screenshots.first().map(String::as_str)
    }

    /// "N achievements", or empty for a game without any.
    pub fn achievements_label(&self) -> String {
        if self.achievements == 0 {
            return String::new();
        }
        format!("{} achievements", self.achievements)
    }

    /// A payload with no genres, description or website carries nothing worth storing.
    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
            && self.short_description.trim().is_empty()
            && self.website.as_deref().map_or(true, |w| w.trim().is_empty())
    }
}

/// Per-identifier detail lookup against an external store API.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(&self, appid: i64) -> Result<AppDetail, FetchError>;
}

#[derive(Debug, Deserialize)]
struct AppDetailsEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<AppData>,
}

#[derive(Debug, Deserialize)]
struct AppData {
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    header_image: Option<String>,
    #[serde(default)]
    background: Option<String>,
    #[serde(default)]
    genres: Option<Vec<GenreEntry>>,
    #[serde(default)]
    screenshots: Option<Vec<Screenshot>>,
    #[serde(default)]
    price_overview: Option<PriceOverview>,
    #[serde(default)]
    achievements: Option<Achievements>,
}

#[derive(Debug, Deserialize)]
struct GenreEntry {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Screenshot {
    path_full: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceOverview {
    final_formatted: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Achievements {
    #[serde(default)]
    total: u32,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

/// Decode an appdetails body for `appid`.
///
/// The endpoint answers with an HTML error page when it is throttling without
/// a 429, so a body starting with `<` is reported as [`FetchError::HtmlBody`]
/// rather than a decode error.
pub fn parse_appdetails(appid: i64, body: &str) -> Result<AppDetail, FetchError> {
    if body.trim_start().starts_with('<') {
        return Err(FetchError::HtmlBody);
    }
    let mut envelope: HashMap<String, AppDetailsEnvelope> =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    let entry = envelope
        .remove(&appid.to_string())
        .ok_or(FetchError::Unsuccessful)?;
    if !entry.success {
        return Err(FetchError::Unsuccessful);
    }
    let data = entry.data.ok_or(FetchError::Unsuccessful)?;

    let detail = AppDetail {
        short_description: data.short_description.unwrap_or_default(),
        website: non_blank(data.website),
        header_image: non_blank(data.header_image),
        background: non_blank(data.background),
        genres: data
            .genres
            .unwrap_or_default()
            .into_iter()
            .filter_map(|g| non_blank(g.description))
            .collect(),
        screenshots: data
            .screenshots
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| non_blank(s.path_full))
            .collect(),
        price: data.price_overview.and_then(|p| non_blank(p.final_formatted)),
        achievements: data.achievements.map(|a| a.total).unwrap_or(0),
    };
    if detail.is_empty() {
        return Err(FetchError::Unsuccessful);
    }
    Ok(detail)
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored.
pub fn parse_retry_after(raw: Option<&str>) -> Option<Duration> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Steam store appdetails client.
pub struct SteamStoreClient {
    client: Client,
    base_url: String,
}

impl SteamStoreClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(APPDETAILS_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gamecard-builder/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl DetailFetcher for SteamStoreClient {
    async fn fetch_detail(&self, appid: i64) -> Result<AppDetail, FetchError> {
        let resp = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&[("appids", appid.to_string())])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(
                resp.headers()
                    .get(RETRY_AFTER)
                    .and_then(|h| h.to_str().ok()),
            );
            return Err(FetchError::RateLimited { retry_after });
        }
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        parse_appdetails(appid, &body)
    }
}

/// Upsert the detail row and genre links for `appid` inside `tx`.
///
/// Re-running for the same identifier replaces the detail row and leaves
/// existing genre links alone.
pub async fn write_detail(
    tx: &mut Transaction<'_, Sqlite>,
    appid: i64,
    detail: &AppDetail,
) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO steam_api (
            steam_appid, description, website, header_image, background,
            screenshot, steam_url, pricing, achievements, fetched_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(appid)
    .bind(&detail.short_description)
    .bind(&detail.website)
    .bind(&detail.header_image)
    .bind(&detail.background)
    .bind(detail.first_screenshot())
    .bind(AppDetail::steam_url(appid))
    .bind(&detail.price)
    .bind(detail.achievements_label())
    .bind(Utc::now().to_rfc3339())
    .execute(&mut **tx)
    .await?;

    for genre in &detail.genres {
        sqlx::query("INSERT OR IGNORE INTO genres (steam_appid, genre) VALUES (?, ?)")
            .bind(appid)
            .bind(genre)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
