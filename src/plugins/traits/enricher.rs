use async_trait::async_trait;

use crate::models::ArticleRecord;
use crate::utils::error::Result;

/// Post-extraction stage that attaches fields to articles
/// (entities, topic, summary, vectors, ...).
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Returns the batch with fields attached. Records must not be dropped or
    /// reordered.
    async fn enrich(&self, batch: &[ArticleRecord]) -> Result<Vec<ArticleRecord>>;

    /// Plugin lifecycle
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
