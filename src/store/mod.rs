use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::models::ArticleRecord;
use crate::utils::error::Result;

pub mod auth;
pub mod http;

pub use auth::{AuthToken, CachedTokenProvider, KeycloakTokenSource, TokenProvider, TokenSource};
pub use http::HttpContentStore;

/// Query parameters for listing stored content, e.g. `medium=spiegel`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    params: BTreeMap<String, String>,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }
}

/// Remote content store the crawl reconciles against.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Status-only existence probe.
    async fn content_exists(&self, url: &str) -> Result<bool>;

    async fn patch_last_verified(&self, url: &str, at: DateTime<Utc>) -> Result<()>;

    async fn post_content(&self, record: &ArticleRecord) -> Result<()>;

    async fn list_content_by_filter(&self, filter: &ContentFilter) -> Result<Vec<String>>;
}
