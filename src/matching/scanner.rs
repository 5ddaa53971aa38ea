use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::matching::matcher::{match_normalized, MatchVerdict};
use crate::models::CanonicalGame;
use crate::normalization::title::NormalizedTitle;

/// Default number of catalog rows pulled per page while scanning.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 50;

/// Paged, identifier-ordered read access to the canonical catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Up to `limit` rows with `id > after_id` (all rows when `after_id` is
    /// `None`), ascending by id. An empty page means the catalog is exhausted.
    async fn catalog_page(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<CanonicalGame>>;
}

/// Linear scan of the catalog for the first row the title matcher accepts.
pub struct CatalogScanner<'a, S: CatalogSource + ?Sized> {
    source: &'a S,
    batch_size: usize,
}

impl<'a, S: CatalogSource + ?Sized> CatalogScanner<'a, S> {
    pub fn new(source: &'a S, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
        }
    }

    /// Resolve `search_title` to a catalog row. Rows are visited in id order,
    /// so when several rows would match, the lowest id wins.
    pub async fn find_match(&self, search_title: &str) -> Result<MatchVerdict> {
        let candidate = NormalizedTitle::new(search_title);
        let mut after_id: Option<i64> = None;
        let mut scanned = 0usize;
        loop {
            let page = self.source.catalog_page(after_id, self.batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = Some(last.id);
            for game in &page {
                scanned += 1;
                let verdict = match_normalized(&NormalizedTitle::new(&game.title), &candidate);
                if verdict.found {
                    trace!(
                        title = %search_title,
                        matched = %game.title,
                        appid = game.id,
                        rule = %verdict.rule,
                        "catalog match"
                    );
                    return Ok(verdict.with_id(game.id));
                }
            }
            if page.len() < self.batch_size {
                break;
            }
        }
        debug!(title = %search_title, scanned, "no catalog match");
        Ok(MatchVerdict::not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::Db;
    use crate::matching::matcher::MatchRule;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        rows: Vec<CanonicalGame>,
        pages: AtomicUsize,
    }

    impl CountingCatalog {
        fn new(rows: Vec<CanonicalGame>) -> Self {
            Self {
                rows,
                pages: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogSource for CountingCatalog {
        async fn catalog_page(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<CanonicalGame>> {
            self.pages.fetch_add(1, Ordering::SeqCst);
            let mut rows: Vec<CanonicalGame> = self
                .rows
                .iter()
                .filter(|g| after_id.map_or(true, |after| g.id > after))
                .cloned()
                .collect();
            rows.sort_by_key(|g| g.id);
            rows.truncate(limit);
            Ok(rows)
        }
    }

    #[tokio::test]
    async fn empty_catalog_is_not_found() {
        let db = Db::memory().await.unwrap();
        let scanner = CatalogScanner::new(&db, DEFAULT_SCAN_BATCH_SIZE);
        let verdict = scanner.find_match("Portal").await.unwrap();
        assert!(!verdict.found);
        assert_eq!(verdict.matched_id, None);
        assert_eq!(verdict.rule, MatchRule::NoMatch);
    }

    #[tokio::test]
    async fn sequel_resolves_to_numbered_entry() {
        let db = Db::memory().await.unwrap();
        db.insert_game(&CanonicalGame::new(1, "Portal")).await.unwrap();
        db.insert_game(&CanonicalGame::new(2, "Portal 2")).await.unwrap();
        let scanner = CatalogScanner::new(&db, DEFAULT_SCAN_BATCH_SIZE);

        let verdict = scanner.find_match("Portal 2").await.unwrap();
        assert!(verdict.found);
        assert_eq!(verdict.matched_id, Some(2));
        assert_eq!(verdict.matched_title.as_deref(), Some("Portal 2"));

        let verdict = scanner.find_match("Portal").await.unwrap();
        assert_eq!(verdict.matched_id, Some(1));
    }

    #[tokio::test]
    async fn lowest_identifier_wins_ties() {
        let db = Db::memory().await.unwrap();
        db.insert_game(&CanonicalGame::new(30, "Hollow Knight Demo")).await.unwrap();
        db.insert_game(&CanonicalGame::new(10, "HOLLOW KNIGHT")).await.unwrap();
        db.insert_game(&CanonicalGame::new(20, "Hollow Knight")).await.unwrap();
        // batch size 1 forces the tie to be resolved across pages
        let scanner = CatalogScanner::new(&db, 1);
        let verdict = scanner.find_match("hollow knight").await.unwrap();
        assert_eq!(verdict.matched_id, Some(10));
        assert_eq!(verdict.matched_title.as_deref(), Some("HOLLOW KNIGHT"));
    }

    #[tokio::test]
    async fn scans_every_page_before_giving_up() {
        let rows = (1..=7)
            .map(|id| CanonicalGame::new(id, format!("Game {id}")))
            .collect();
        let catalog = CountingCatalog::new(rows);
        let scanner = CatalogScanner::new(&catalog, 3);
        let verdict = scanner.find_match("Something Else").await.unwrap();
        assert!(!verdict.found);
        // pages of 3, 3, 1; the short page ends the scan
        assert_eq!(catalog.pages.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_first_hit() {
        let rows = (1..=9)
            .map(|id| CanonicalGame::new(id, format!("Game {id}")))
            .collect();
        let catalog = CountingCatalog::new(rows);
        let scanner = CatalogScanner::new(&catalog, 2);
        let verdict = scanner.find_match("game 3").await.unwrap();
        assert_eq!(verdict.matched_id, Some(3));
        assert_eq!(catalog.pages.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_batch_size_is_clamped() {
        let catalog = CountingCatalog::new(vec![CanonicalGame::new(1, "Celeste")]);
        let scanner = CatalogScanner::new(&catalog, 0);
        assert!(scanner.find_match("Celeste").await.unwrap().found);
        assert_eq!(catalog.pages.load(Ordering::SeqCst), 1);
    }
}
