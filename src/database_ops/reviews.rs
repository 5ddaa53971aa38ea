//! Offline review/tag files and the enrichment rows they produce once matched.
use anyhow::{bail, Context, Result};
use serde_json::Value;
use sqlx::{Sqlite, Transaction};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{info, warn};

use crate::models::ExternalRecord;

/// Read external records from `path`.
///
/// Two layouts are accepted: a JSON array of records, or a JSON object whose
/// values are records. Object entries are returned in key order, numeric keys
/// compared as numbers. Entries that do not decode are logged and dropped.
pub fn load_external_records(path: impl AsRef<Path>) -> Result<Vec<ExternalRecord>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read reviews file {}", path.display()))?;
    let records = parse_external_records(&raw)
        .with_context(|| format!("failed to parse reviews file {}", path.display()))?;
    info!(path = %path.display(), records = records.len(), "loaded external records");
    Ok(records)
}

pub fn parse_external_records(raw: &str) -> Result<Vec<ExternalRecord>> {
    let root: Value = serde_json::from_str(raw)?;
    let entries: Vec<(String, Value)> = match root {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));
            entries
        }
        other => bail!("expected a JSON array or object, found {}", kind(&other)),
    };

    let mut records = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match serde_json::from_value::<ExternalRecord>(value) {
            Ok(record) if !record.title.trim().is_empty() => records.push(record),
            Ok(_) => warn!(entry = %key, "external record without a title dropped"),
            Err(e) => warn!(entry = %key, error = %e, "undecodable external record dropped"),
        }
    }
    Ok(records)
}

fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Rows written for one matched record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentWrite {
    pub score_rows: u64,
    pub tag_rows: u64,
}

/// Write the score row and tag rows of `record` against `appid` inside `tx`.
///
/// Rows are insert-or-ignore: an enrichment row, once written for a
/// `(appid, source)` pair, is never updated, so re-running a reconciliation
/// leaves the store unchanged.
pub async fn write_enrichment(
    tx: &mut Transaction<'_, Sqlite>,
    appid: i64,
    source: &str,
    record: &ExternalRecord,
) -> Result<EnrichmentWrite> {
    let mut out = EnrichmentWrite::default();
    out.score_rows += sqlx::query(
        "INSERT OR IGNORE INTO review_scores (steam_appid, source, score, genre) VALUES (?, ?, ?, ?)",
    )
    .bind(appid)
    .bind(source)
    .bind(record.numeric_score)
    .bind(&record.main_genre)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    for (tag, ratio) in &record.tag_ratios {
        out.tag_rows += sqlx::query(
            "INSERT OR IGNORE INTO review_tags (steam_appid, source, tag, ratio) VALUES (?, ?, ?, ?)",
        )
        .bind(appid)
        .bind(source)
        .bind(tag)
        .bind(ratio)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    }
    for tag in &record.unique_tags {
        out.tag_rows += sqlx::query(
            "INSERT OR IGNORE INTO review_unique_tags (steam_appid, source, tag) VALUES (?, ?, ?)",
        )
        .bind(appid)
        .bind(source)
        .bind(tag)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    }
    for tag in &record.subjective_tags {
        out.tag_rows += sqlx::query(
            "INSERT OR IGNORE INTO review_subjective_tags (steam_appid, source, tag) VALUES (?, ?, ?)",
        )
        .bind(appid)
        .bind(source)
        .bind(tag)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::Db;
    use crate::models::{CanonicalGame, RecordStatus};

    #[test]
    fn array_layout_keeps_file_order() {
        let raw = r#"[
            {"Name": "Portal 2", "Score": 9.5, "Ratio": {"puzzle": 80}},
            {"Name": "Hades", "Score": 9.0}
        ]"#;
        let records = parse_external_records(raw).unwrap();
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Portal 2", "Hades"]);
    }

    #[test]
    fn object_layout_sorts_numeric_keys_numerically() {
        let raw = r#"{
            "10": {"name": "Ten", "status": "processed"},
            "9": {"name": "Nine", "status": "no_reviews"},
            "100": {"name": "Hundred"}
        }"#;
        let records = parse_external_records(raw).unwrap();
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Nine", "Ten", "Hundred"]);
        assert_eq!(records[0].status, RecordStatus::Skipped);
        assert_eq!(records[2].status, RecordStatus::Processed);
    }

    #[test]
    fn bad_entries_are_dropped_not_fatal() {
        let raw = r#"[{"Name": "Celeste"}, {"Score": 3}, {"Name": "  "}, 7]"#;
        let records = parse_external_records(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert!(parse_external_records("42").is_err());
        assert!(parse_external_records("{oops").is_err());
    }

    #[test]
    fn loads_from_disk() {
        let path = std::env::temp_dir().join(format!("gamecard-reviews-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"[{"Name": "Celeste", "Score": 10}]"#).unwrap();
        let records = load_external_records(&path).unwrap();
        assert_eq!(records[0].numeric_score, Some(10.0));
        std::fs::remove_file(&path).unwrap();
        assert!(load_external_records(&path).is_err());
    }

    #[tokio::test]
    async fn enrichment_is_written_once() {
        let db = Db::memory().await.unwrap();
        db.insert_game(&CanonicalGame::new(620, "Portal 2")).await.unwrap();
        let mut record = ExternalRecord::new("Portal 2");
        record.numeric_score = Some(9.5);
        record.main_genre = Some("Puzzle".into());
        record.tag_ratios.insert("puzzle".into(), 80);
        record.tag_ratios.insert("humor".into(), 20);
        record.unique_tags.insert("portals".into());
        record.subjective_tags.insert("witty".into());

        let mut tx = db.pool.begin().await.unwrap();
        let first = write_enrichment(&mut tx, 620, "ign", &record).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(first, EnrichmentWrite { score_rows: 1, tag_rows: 4 });

        record.numeric_score = Some(1.0);
        let mut tx = db.pool.begin().await.unwrap();
        let second = write_enrichment(&mut tx, 620, "ign", &record).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(second, EnrichmentWrite::default());

        let score: f64 = sqlx::query_scalar("SELECT score FROM review_scores WHERE steam_appid = 620")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(score, 9.5);

        // a second source gets its own rows
        let mut tx = db.pool.begin().await.unwrap();
        write_enrichment(&mut tx, 620, "steam_reviews", &record).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(db.count_rows("review_scores").await.unwrap(), 2);
        assert_eq!(db.count_rows("review_tags").await.unwrap(), 4);
    }
}
