use serde::Serialize;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::archive::ArchiveEnumerator;
use crate::browser::{PageDriver, ResourceProbe};
use crate::config::PipelineConfig;
use crate::content_extractor::ContentExtractor;
use crate::coordinator::{scrape, Coordinator, UploadReport};
use crate::frontier::{UrlClassifier, UrlFrontier};
use crate::models::UrlSet;
use crate::plugins::EnrichmentManager;
use crate::queue::{self, ArticleQueue};
use crate::session::{Credentials, Navigation, Session};
use crate::store::ContentStore;
use crate::utils::error::{AppError, Result};

/// How candidate URLs are found.
#[derive(Debug, Clone)]
pub enum CrawlMode {
    /// Start page plus one level of subpages.
    Latest,
    /// Issue archive for the given years.
    Archive(RangeInclusive<u32>),
}

/// Where finished records go.
#[derive(Clone)]
pub enum Delivery {
    Upload,
    Queue(Arc<dyn ArticleQueue>),
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub crawler_version: String,
    pub max_urls: Option<usize>,
    pub max_subpages: Option<usize>,
    pub skip_paywalled: bool,
}

impl From<&PipelineConfig> for CrawlOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            crawler_version: config.crawler_version.clone(),
            max_urls: config.max_urls,
            max_subpages: config.max_subpages,
            skip_paywalled: config.skip_paywalled,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    pub site: String,
    pub logged_in: bool,
    pub discovered: usize,
    pub known: usize,
    pub new: usize,
    pub check_failed: usize,
    pub patch_failures: usize,
    pub extracted: usize,
    pub uploaded: usize,
    pub upload_failed: usize,
    pub queued: usize,
    pub elapsed_ms: u64,
}

/// One crawl run: discovery, reconciliation, extraction, enrichment and delivery.
///
/// Browser work runs on a blocking thread that owns the session; the store
/// calls run on the async runtime in between.
pub struct CrawlPipeline<S: ContentStore> {
    coordinator: Coordinator<S>,
    enrichment: EnrichmentManager,
    delivery: Delivery,
    options: CrawlOptions,
}

impl<S: ContentStore> CrawlPipeline<S> {
    pub fn new(
        coordinator: Coordinator<S>,
        enrichment: EnrichmentManager,
        delivery: Delivery,
        options: CrawlOptions,
    ) -> Self {
        Self {
            coordinator,
            enrichment,
            delivery,
            options,
        }
    }

    pub async fn run<D, P>(
        &self,
        session: Session<D, P>,
        credentials: Option<Credentials>,
        mode: CrawlMode,
    ) -> Result<CrawlSummary>
    where
        D: PageDriver + 'static,
        P: ResourceProbe + 'static,
    {
        let start_time = Instant::now();
        let site = session.profile().name.clone();
        let mut summary = CrawlSummary {
            site: site.clone(),
            ..CrawlSummary::default()
        };
        info!(site = %site, mode = ?mode, "Crawl started");

        let max_subpages = self.options.max_subpages;
        let (session, (logged_in, discovered)) = on_browser(session, move |session| {
            let logged_in = prepare(session, credentials.as_ref())?;
            let urls = discover(session, mode, max_subpages)?;
            Ok((logged_in, urls))
        })
        .await?;
        summary.logged_in = logged_in;

        let discovered = match self.options.max_urls {
            Some(limit) => discovered.truncated(limit),
            None => discovered,
        };
        summary.discovered = discovered.len();

        let reconciliation = self.coordinator.reconcile(&discovered).await;
        summary.known = reconciliation.known.len();
        summary.new = reconciliation.new.len();
        summary.check_failed = reconciliation.check_failed.len();
        summary.patch_failures = reconciliation.patch_failures;

        let new = reconciliation.new;
        let skip_paywalled = self.options.skip_paywalled;
        let (medium, version) = (site.clone(), self.options.crawler_version.clone());
        // The session is dropped on the blocking thread along with its
        // blocking HTTP client.
        let records = tokio::task::spawn_blocking(move || {
            let mut session = session;
            let extractor = ContentExtractor::new(medium, version);
            let records = scrape(&mut session, &extractor, &new, skip_paywalled);
            if let Err(e) = session.close() {
                warn!(error = %e, "Failed to close browser session");
            }
            records
        })
        .await??;
        summary.extracted = records.len();

        let records = self.enrichment.run(records).await;

        match &self.delivery {
            Delivery::Upload => {
                let report = self.coordinator.upload(records).await;
                summary.uploaded = report.uploaded;
                summary.upload_failed = report.failed;
            }
            Delivery::Queue(queue) => {
                summary.queued = records.len();
                queue.enqueue(records).await?;
            }
        }

        summary.elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            site = %site,
            discovered = summary.discovered,
            known = summary.known,
            new = summary.new,
            extracted = summary.extracted,
            elapsed_ms = summary.elapsed_ms,
            "Crawl finished"
        );
        Ok(summary)
    }
}

/// Drains `queue` and posts every record to the store. Records the store
/// rejects are put back on the queue for the next upload.
pub async fn upload_spooled<Q, S>(queue: &Q, coordinator: &Coordinator<S>) -> Result<UploadReport>
where
    Q: ArticleQueue + ?Sized,
    S: ContentStore,
{
    let records = queue::drain(queue).await?;
    if records.is_empty() {
        info!("Queue empty, nothing to upload");
        return Ok(UploadReport::default());
    }

    let (report, rejected) = coordinator.upload_returning_failures(records).await;
    if !rejected.is_empty() {
        warn!(records = rejected.len(), "Returning rejected records to the queue");
        queue.enqueue(rejected).await?;
    }
    Ok(report)
}

/// Runs `work` on a blocking thread with exclusive use of the session.
/// The session is closed if `work` fails.
async fn on_browser<D, P, T, F>(mut session: Session<D, P>, work: F) -> Result<(Session<D, P>, T)>
where
    D: PageDriver + 'static,
    P: ResourceProbe + 'static,
    T: Send + 'static,
    F: FnOnce(&mut Session<D, P>) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || match work(&mut session) {
        Ok(value) => Ok((session, value)),
        Err(e) => {
            if let Err(close_err) = session.close() {
                warn!(error = %close_err, "Failed to close browser session");
            }
            Err(e)
        }
    })
    .await?
}

/// Consent banner on the start page, then login. Returns whether a login
/// was performed. A failed login is logged and the run continues without it.
fn prepare<D: PageDriver, P: ResourceProbe>(
    session: &mut Session<D, P>,
    credentials: Option<&Credentials>,
) -> Result<bool> {
    let base_url = session.profile().base_url.clone();
    if let Navigation::Skipped = session.navigate(&base_url)? {
        return Err(AppError::NavigationSkipped { url: base_url });
    }
    session.dismiss_cookie_banner()?;

    if !session.profile().requires_login() {
        return Ok(false);
    }

    let Some(credentials) = credentials else {
        warn!(site = %session.profile().name, "Site requires login but no credentials are configured");
        return Ok(false);
    };

    match session.login(credentials) {
        Ok(()) => Ok(true),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(error = %e, "Continuing without login");
            Ok(false)
        }
    }
}

fn discover<D: PageDriver, P: ResourceProbe>(
    session: &mut Session<D, P>,
    mode: CrawlMode,
    max_subpages: Option<usize>,
) -> Result<UrlSet> {
    match mode {
        CrawlMode::Latest => UrlFrontier::new(UrlClassifier::for_profile(session.profile())?)
            .with_max_subpages(max_subpages)
            .discover_article_urls(session),
        CrawlMode::Archive(years) => ArchiveEnumerator::for_profile(session.profile())?.enumerate(session, years),
    }
}
