use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::enrichers::StripTextEnricher;
use super::traits::Enricher;
use crate::models::ArticleRecord;
use crate::utils::error::{AppError, Result};

pub type EnricherBox = Box<dyn Enricher>;

/// Runs registered enrichers, in registration order, over fixed-size batches.
#[derive(Clone)]
pub struct EnrichmentManager {
    enrichers: Arc<RwLock<Vec<EnricherBox>>>,
    batch_size: usize,
}

impl EnrichmentManager {
    pub fn new(batch_size: usize) -> Self {
        Self {
            enrichers: Arc::new(RwLock::new(Vec::new())),
            batch_size: batch_size.max(1),
        }
    }

    /// Register an enricher
    pub async fn register(&self, enricher: EnricherBox) -> Result<()> {
        let name = enricher.name().to_string();
        enricher
            .initialize()
            .await
            .map_err(|e| AppError::Enrichment(format!("Failed to initialize enricher {}: {}", name, e)))?;

        let mut enrichers = self.enrichers.write().await;
        if enrichers.iter().any(|existing| existing.name() == name) {
            return Err(AppError::Enrichment(format!("Enricher '{}' already registered", name)));
        }
        enrichers.push(enricher);
        debug!(enricher = %name, "Enricher registered");
        Ok(())
    }

    pub async fn names(&self) -> Vec<String> {
        let enrichers = self.enrichers.read().await;
        enrichers.iter().map(|e| e.name().to_string()).collect()
    }

    /// Built-in enrichers selected by configuration.
    pub async fn initialize_default_enrichers(&self, strip_text: bool) -> Result<()> {
        if strip_text {
            self.register(Box::new(StripTextEnricher::new())).await?;
        }
        Ok(())
    }

    /// Enriches all records batch by batch. A batch an enricher fails on, or
    /// returns with a different length, continues unchanged.
    pub async fn run(&self, records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
        let enrichers = self.enrichers.read().await;
        if enrichers.is_empty() {
            return records;
        }

        let total = records.len();
        let mut output = Vec::with_capacity(total);
        for (index, chunk) in records.chunks(self.batch_size).enumerate() {
            let mut batch = chunk.to_vec();
            for enricher in enrichers.iter() {
                match enricher.enrich(&batch).await {
                    Ok(enriched) if enriched.len() == batch.len() => batch = enriched,
                    Ok(enriched) => warn!(
                        enricher = enricher.name(),
                        batch = index,
                        expected = batch.len(),
                        returned = enriched.len(),
                        "Enricher changed batch size, output discarded"
                    ),
                    Err(e) => warn!(
                        enricher = enricher.name(),
                        batch = index,
                        error = %e,
                        "Enrichment failed, batch passed through"
                    ),
                }
            }
            output.extend(batch);
        }

        info!(records = total, batch_size = self.batch_size, "Enrichment finished");
        output
    }

    /// Shutdown all enrichers
    pub async fn shutdown(&self) -> Result<()> {
        let mut enrichers = self.enrichers.write().await;
        for enricher in enrichers.drain(..) {
            if let Err(e) = enricher.shutdown().await {
                warn!("Error shutting down enricher {}: {}", enricher.name(), e);
            }
        }
        Ok(())
    }
}
