//! Reads and writes against the canonical `main_game` table.
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, Sqlite, Transaction};

use crate::database_ops::db::Db;
use crate::matching::scanner::CatalogSource;
use crate::models::CanonicalGame;

impl Db {
    /// Insert a catalog row; returns false when the id or title already exists.
    pub async fn insert_game(&self, game: &CanonicalGame) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_game_tx(&mut tx, game).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Every catalog identifier in ascending order.
    pub async fn catalog_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT steam_appid FROM main_game ORDER BY steam_appid")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn game_count(&self) -> Result<i64> {
        self.count_rows("main_game").await
    }
}

pub(crate) async fn insert_game_tx(
    tx: &mut Transaction<'_, Sqlite>,
    game: &CanonicalGame,
) -> Result<bool> {
    let res = sqlx::query("INSERT OR IGNORE INTO main_game (steam_appid, game_name) VALUES (?, ?)")
        .bind(game.id)
        .bind(&game.title)
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[async_trait]
impl CatalogSource for Db {
    async fn catalog_page(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<CanonicalGame>> {
        // keyset pagination on the primary key
        let rows = sqlx::query(
            "SELECT steam_appid, game_name FROM main_game WHERE steam_appid > ? ORDER BY steam_appid LIMIT ?",
        )
        .bind(after_id.unwrap_or(i64::MIN))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| -> Result<CanonicalGame> {
                Ok(CanonicalGame {
                    id: r.try_get("steam_appid")?,
                    title: r.try_get("game_name")?,
                })
            })
            .collect()
    }
}
