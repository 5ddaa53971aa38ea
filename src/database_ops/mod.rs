pub mod catalog;
pub mod db;
pub mod reviews;
pub mod steam;
pub mod steamspy;
