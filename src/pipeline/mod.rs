pub mod reconcile;
pub mod resume;
pub mod scheduler;
