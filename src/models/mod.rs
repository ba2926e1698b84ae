pub mod article;
pub mod locator;
pub mod site_profile;
pub mod url_set;

// Re-exports for convenience
pub use article::*;
pub use locator::*;
pub use site_profile::*;
pub use url_set::*;

/// Version tag written into every uploaded record.
pub const CRAWLER_VERSION: &str = "0.1";

/// How a discovered link is treated during the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    Article,
    Subpage,
    Other,
}
