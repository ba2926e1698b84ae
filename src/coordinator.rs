use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

use crate::browser::{PageDriver, ResourceProbe};
use crate::config::StoreConfig;
use crate::content_extractor::ContentExtractor;
use crate::models::{ArticleRecord, Reconciliation, UrlSet, VerificationOutcome};
use crate::session::{Navigation, Session};
use crate::store::ContentStore;
use crate::utils::error::{AppError, Result};

/// Knobs for the concurrent reconciliation phase.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    pub concurrency: usize,
    pub attempts: u32,
    pub retry_delay: Duration,
    pub call_timeout: Duration,
}

impl From<&StoreConfig> for ReconcileSettings {
    fn from(config: &StoreConfig) -> Self {
        Self {
            concurrency: config.probe_concurrency,
            attempts: config.probe_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            call_timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }
}

/// Outcome of posting a batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub failed: usize,
}

/// Ties discovery to the remote store: which URLs are already known, and
/// delivery of freshly extracted records.
pub struct Coordinator<S: ContentStore> {
    store: Arc<S>,
    settings: ReconcileSettings,
}

impl<S: ContentStore> Coordinator<S> {
    pub fn new(store: Arc<S>, settings: ReconcileSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Partitions `urls` into known and new.
    ///
    /// Known URLs get their verification date patched as soon as their probe
    /// returns. Every probe finishes (or gives up) before this returns. URLs
    /// whose probe keeps failing land in `new`.
    pub async fn reconcile(&self, urls: &UrlSet) -> Reconciliation {
        let width = self.settings.concurrency.max(1);
        let results: Vec<(String, VerificationOutcome, bool)> = stream::iter(urls.sorted())
            .map(|url| async move {
                let outcome = self.verify(&url).await;
                let patched = match outcome {
                    VerificationOutcome::Known => self.patch(&url).await,
                    _ => true,
                };
                (url, outcome, patched)
            })
            .buffer_unordered(width)
            .collect()
            .await;

        let patch_failures = results.iter().filter(|(_, _, patched)| !patched).count();
        let mut partition =
            Reconciliation::from_outcomes(results.into_iter().map(|(url, outcome, _)| (url, outcome)));
        partition.patch_failures = patch_failures;

        info!(
            total = partition.total(),
            known = partition.known.len(),
            new = partition.new.len(),
            check_failed = partition.check_failed.len(),
            patch_failures,
            "Reconciliation finished"
        );
        partition
    }

    async fn verify(&self, url: &str) -> VerificationOutcome {
        let attempts = AtomicU32::new(0);
        let retries = FixedInterval::new(self.settings.retry_delay)
            .take(self.settings.attempts.saturating_sub(1) as usize);

        let result = RetryIf::start(
            retries,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    match timeout(self.settings.call_timeout, self.store.content_exists(url)).await {
                        Ok(result) => result,
                        Err(_) => Err(AppError::ProbeFailed {
                            url: url.to_string(),
                            reason: format!("timed out after {:?}", self.settings.call_timeout),
                        }),
                    }
                }
            },
            |e: &AppError| {
                debug!(url, error = %e, "Existence probe failed");
                e.is_retryable()
            },
        )
        .await;

        match result {
            Ok(true) => VerificationOutcome::Known,
            Ok(false) => VerificationOutcome::New,
            Err(e) => {
                let attempts = attempts.load(Ordering::SeqCst);
                warn!(url, attempts, error = %e, "Existence check failed, treating as new");
                VerificationOutcome::CheckFailed {
                    attempts,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn patch(&self, url: &str) -> bool {
        match timeout(self.settings.call_timeout, self.store.patch_last_verified(url, Utc::now())).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(url, error = %e, "Failed to patch verification date");
                false
            }
            Err(_) => {
                warn!(url, "Patching verification date timed out");
                false
            }
        }
    }

    /// Posts every record. Failures are logged and counted, never fatal.
    pub async fn upload(&self, records: Vec<ArticleRecord>) -> UploadReport {
        self.upload_returning_failures(records).await.0
    }

    /// Like [`Coordinator::upload`], but hands back the records the store
    /// rejected so the caller can keep them. Records without a URL are
    /// dropped and counted as failed.
    pub async fn upload_returning_failures(&self, records: Vec<ArticleRecord>) -> (UploadReport, Vec<ArticleRecord>) {
        let width = self.settings.concurrency.max(1);
        // Err(Some(record)) is a rejected post worth retrying, Err(None) an unusable record
        let results: Vec<std::result::Result<(), Option<ArticleRecord>>> = stream::iter(records)
            .map(|record| async move {
                if !record.is_complete() {
                    warn!("Skipping record without URL");
                    return Err(None);
                }
                match self.store.post_content(&record).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        warn!(url = record.url_or_placeholder(), error = %e, "Upload failed");
                        Err(Some(record))
                    }
                }
            })
            .buffer_unordered(width)
            .collect()
            .await;

        let uploaded = results.iter().filter(|result| result.is_ok()).count();
        let report = UploadReport {
            uploaded,
            failed: results.len() - uploaded,
        };
        let rejected: Vec<ArticleRecord> = results.into_iter().filter_map(|result| result.err().flatten()).collect();
        info!(uploaded = report.uploaded, failed = report.failed, "Upload finished");
        (report, rejected)
    }
}

/// Navigates to and extracts each URL in turn on the shared session.
///
/// A URL that cannot be loaded, or is paywalled when `skip_paywalled` is set,
/// is logged and skipped. Only a dead browser aborts the batch.
pub fn scrape<D: PageDriver, P: ResourceProbe>(
    session: &mut Session<D, P>,
    extractor: &ContentExtractor,
    urls: &UrlSet,
    skip_paywalled: bool,
) -> Result<Vec<ArticleRecord>> {
    let mut records = Vec::with_capacity(urls.len());

    for url in urls.sorted() {
        match session.navigate(&url) {
            Ok(Navigation::Loaded(_)) => {}
            Ok(Navigation::Skipped) => {
                warn!(url = %url, "Article not found, skipped");
                continue;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(url = %url, error = %e, "Navigation failed, skipped");
                continue;
            }
        }

        if skip_paywalled {
            match session.is_paywalled() {
                Ok(true) => {
                    info!(url = %url, "Paywalled article skipped");
                    continue;
                }
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(url = %url, error = %e, "Paywall check failed, extracting anyway"),
            }
        }

        let record = extractor.extract(session)?;
        debug!(url = %url, has_text = record.main_text.is_some(), "Article extracted");
        records.push(record);
    }

    info!(requested = urls.len(), extracted = records.len(), "Scrape finished");
    Ok(records)
}
