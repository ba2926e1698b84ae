pub mod archive;
pub mod browser;
pub mod config;
pub mod content_extractor;
pub mod coordinator;
pub mod element_finder;
pub mod frontier;
pub mod models;
pub mod pipeline;
pub mod plugins;
pub mod queue;
pub mod session;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
