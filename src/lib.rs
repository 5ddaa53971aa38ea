pub mod config;
pub mod database_ops;
pub mod logging;
pub mod matching;
pub mod models;
pub mod normalization;
pub mod pipeline;

pub mod util {
    pub mod env;
}

pub use config::{PipelineConfig, Stage};
pub use database_ops::db::Db;
pub use matching::matcher::{match_titles, MatchRule, MatchVerdict};
pub use models::{CanonicalGame, ExternalRecord, RecordStatus};
