use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// One row of the primary catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalGame {
    pub id: i64,
    pub title: String,
}

impl CanonicalGame {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

/// Processing state attached to an external record by whatever produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    #[default]
    Processed,
    Skipped,
}

impl RecordStatus {
    /// Only processed records are ready for reconciliation.
    pub fn is_ready(self) -> bool {
        matches!(self, RecordStatus::Processed)
    }
}

impl From<&str> for RecordStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "processed" | "" => RecordStatus::Processed,
            "pending" => RecordStatus::Pending,
            // "no_reviews", "error", ... all mean the producer gave up on it
            _ => RecordStatus::Skipped,
        }
    }
}

impl<'de> Deserialize<'de> for RecordStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(RecordStatus::from).unwrap_or_default())
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Processed => "processed",
            RecordStatus::Skipped => "skipped",
        })
    }
}

/// A review or tag entry from an offline source, keyed only by free-text title.
///
/// Accepts both the verdict-list field names (`Name`, `Score`, `Ratio`, ...)
/// and the snake_case names of the tag corpus (`name`, `tag_ratios`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    #[serde(alias = "Name", alias = "name")]
    pub title: String,
    #[serde(default, alias = "Score", alias = "score")]
    pub numeric_score: Option<f64>,
    #[serde(
        default,
        alias = "MainGenre",
        alias = "main_genre",
        deserialize_with = "blank_as_none"
    )]
    pub main_genre: Option<String>,
    #[serde(default, alias = "Ratio", alias = "tag_ratios")]
    pub tag_ratios: BTreeMap<String, i64>,
    #[serde(default, alias = "UniqueTag", alias = "unique_tags")]
    pub unique_tags: BTreeSet<String>,
    #[serde(default, alias = "SubjectiveTag", alias = "subjective_tags")]
    pub subjective_tags: BTreeSet<String>,
    #[serde(default, alias = "Status")]
    pub status: RecordStatus,
}

impl ExternalRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            numeric_score: None,
            main_genre: None,
            tag_ratios: BTreeMap::new(),
            unique_tags: BTreeSet::new(),
            subjective_tags: BTreeSet::new(),
            status: RecordStatus::Processed,
        }
    }

    /// Number of tag rows this record produces once matched.
    pub fn tag_row_count(&self) -> usize {
        self.tag_ratios.len() + self.unique_tags.len() + self.subjective_tags.len()
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty() && s != "unknown"))
}
