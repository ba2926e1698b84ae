use async_trait::async_trait;

use crate::models::ArticleRecord;
use crate::plugins::traits::Enricher;
use crate::utils::error::Result;

/// Drops the bulky text fields once earlier enrichers have used them, so the
/// uploaded payload carries only derived fields.
pub struct StripTextEnricher;

impl StripTextEnricher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StripTextEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Enricher for StripTextEnricher {
    fn name(&self) -> &str {
        "strip_text"
    }

    fn description(&self) -> &str {
        "Removes main and lead text before upload"
    }

    async fn enrich(&self, batch: &[ArticleRecord]) -> Result<Vec<ArticleRecord>> {
        Ok(batch
            .iter()
            .cloned()
            .map(|mut record| {
                record.main_text = None;
                record.lead_text.clear();
                record
            })
            .collect())
    }
}
