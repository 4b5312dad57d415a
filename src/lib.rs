pub mod config;
pub mod core;
pub mod extractor;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod scraper;
pub mod store;
pub mod utils;
pub mod watcher;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;
pub use watcher::{RunOutcome, RunReport, Watcher};

pub type Result<T> = std::result::Result<T, AppError>;
