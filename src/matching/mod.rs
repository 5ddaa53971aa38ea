pub mod matcher;
pub mod scanner;
