use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Destination schema. Every child table cascades on delete of its `main_game` row.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS main_game (
    steam_appid INTEGER PRIMARY KEY,
    game_name   TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS steam_spy (
    steam_appid      INTEGER PRIMARY KEY,
    developer        TEXT,
    publisher        TEXT,
    score_rank       TEXT,
    positive_reviews INTEGER,
    negative_reviews INTEGER,
    owners           TEXT,
    average_forever  INTEGER,
    FOREIGN KEY(steam_appid) REFERENCES main_game(steam_appid) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS genres (
    steam_appid INTEGER NOT NULL,
    genre       TEXT NOT NULL,
    PRIMARY KEY (steam_appid, genre),
    FOREIGN KEY(steam_appid) REFERENCES main_game(steam_appid) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS steam_api (
    steam_appid  INTEGER PRIMARY KEY,
    description  TEXT,
    website      TEXT,
    header_image TEXT,
    background   TEXT,
    screenshot   TEXT,
    steam_url    TEXT,
    pricing      TEXT,
    achievements TEXT,
    fetched_at   TEXT NOT NULL,
    FOREIGN KEY(steam_appid) REFERENCES main_game(steam_appid) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS review_scores (
    steam_appid INTEGER NOT NULL,
    source      TEXT NOT NULL,
    score       REAL,
    genre       TEXT,
    PRIMARY KEY (steam_appid, source),
    FOREIGN KEY(steam_appid) REFERENCES main_game(steam_appid) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS review_tags (
    steam_appid INTEGER NOT NULL,
    source      TEXT NOT NULL,
    tag         TEXT NOT NULL,
    ratio       INTEGER NOT NULL,
    PRIMARY KEY (steam_appid, source, tag),
    FOREIGN KEY(steam_appid) REFERENCES main_game(steam_appid) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS review_unique_tags (
    steam_appid INTEGER NOT NULL,
    source      TEXT NOT NULL,
    tag         TEXT NOT NULL,
    PRIMARY KEY (steam_appid, source, tag),
    FOREIGN KEY(steam_appid) REFERENCES main_game(steam_appid) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS review_subjective_tags (
    steam_appid INTEGER NOT NULL,
    source      TEXT NOT NULL,
    tag         TEXT NOT NULL,
    PRIMARY KEY (steam_appid, source, tag),
    FOREIGN KEY(steam_appid) REFERENCES main_game(steam_appid) ON DELETE CASCADE
);
"#;

/// Handle on the destination SQLite store.
///
/// The pool holds a single connection: the pipelines assume one writer and one
/// open transaction at a time.
#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
}

impl Db {
    /// Open (creating if missing) the store at `path` and ensure the schema.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open sqlite store at {}", path.display()))?;
        info!("connected to store");
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Private in-memory store with the schema applied. The single connection
    /// is never recycled, since that would drop the database.
    pub async fn memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("failed to open in-memory sqlite store")?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create any missing tables. Safe to call repeatedly.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("failed to apply store schema")?;
        Ok(())
    }

    /// Row count of a known table; used by summaries and tests.
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        const TABLES: [&str; 8] = [
            "main_game",
            "steam_spy",
            "genres",
            "steam_api",
            "review_scores",
            "review_tags",
            "review_unique_tags",
            "review_subjective_tags",
        ];
        anyhow::ensure!(TABLES.contains(&table), "unknown table {table}");
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
