// Integration tests for the Herald crawler
// These tests drive whole crawl stages against an in-memory site and store

pub mod crawl_tests;
pub mod pipeline_tests;
pub mod reconcile_tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use herald_crawler::browser::{DomScope, ElementHandle, PageDriver, ResourceProbe};
use herald_crawler::coordinator::ReconcileSettings;
use herald_crawler::models::{ArticleRecord, LocatorStrategy, SiteCatalog, SiteProfile};
use herald_crawler::session::{Session, SessionTimeouts};
use herald_crawler::store::{ContentFilter, ContentStore};
use herald_crawler::{AppError, Result};

pub const BASE_URL: &str = "https://news.example/";

/// Test site profile: articles end in a numeric id, subpages are one path segment.
pub fn test_profile() -> SiteProfile {
    let catalog = SiteCatalog::from_toml_str(
        r#"
        [sites.example]
        base_url = "https://news.example/"

        [sites.example.patterns]
        article = 'https://news\.example/[a-z]+/[a-z\-]+-\d+$'
        subpage = 'https://news\.example/[a-z]+/$'
        "#,
    )
    .unwrap();
    catalog.get("example").unwrap().clone()
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub links: Vec<String>,
    pub html: String,
    /// Link collection fails as if the DOM changed underneath it
    pub stale: bool,
}

impl FakePage {
    pub fn links(links: &[&str]) -> Self {
        Self {
            links: links.iter().map(|l| l.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn article(title: &str, body: &str) -> Self {
        Self {
            html: format!(
                r#"<html><head><meta name="description" content="{title}"></head>
                <body><article><p>{body}</p></article></body></html>"#
            ),
            ..Self::default()
        }
    }

    pub fn stale() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }
}

/// In-memory website shared by the driver and the probe.
#[derive(Clone, Default)]
pub struct FakeSite {
    pages: Arc<HashMap<String, FakePage>>,
    missing: Arc<HashSet<String>>,
    visits: Arc<Mutex<Vec<String>>>,
}

impl FakeSite {
    pub fn new(pages: Vec<(&str, FakePage)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().map(|(url, page)| (url.to_string(), page)).collect()),
            ..Self::default()
        }
    }

    /// URLs the existence probe reports as 404
    pub fn with_missing(mut self, missing: &[&str]) -> Self {
        self.missing = Arc::new(missing.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            site: self.clone(),
            current: String::new(),
            closed: false,
        }
    }

    pub fn probe(&self) -> FakeProbe {
        FakeProbe { site: self.clone() }
    }

    pub fn session(&self, profile: SiteProfile) -> Session<FakeDriver, FakeProbe> {
        Session::new(self.driver(), self.probe(), profile, fast_timeouts())
    }
}

pub fn fast_timeouts() -> SessionTimeouts {
    SessionTimeouts {
        element: Duration::from_millis(10),
        paywall: Duration::from_millis(5),
        cookie_banner_delay: Duration::ZERO,
    }
}

/// Driver with no interactive elements: every locator misses.
pub struct FakeDriver {
    site: FakeSite,
    current: String,
    closed: bool,
}

impl FakeDriver {
    fn page(&self) -> Option<&FakePage> {
        self.site.pages.get(&self.current)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(AppError::Browser("session closed".to_string()));
        }
        Ok(())
    }
}

impl PageDriver for FakeDriver {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.ensure_open()?;
        self.site.visits.lock().unwrap().push(url.to_string());
        self.current = url.to_string();
        Ok(())
    }

    fn current_url(&self) -> String {
        self.current.clone()
    }

    fn page_source(&self) -> Result<String> {
        self.ensure_open()?;
        Ok(self
            .page()
            .map(|page| page.html.clone())
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    fn wait_for(&self, _scope: &DomScope, _strategy: &LocatorStrategy, _timeout: Duration) -> Result<bool> {
        self.ensure_open()?;
        Ok(false)
    }

    fn click(&mut self, element: &ElementHandle) -> Result<()> {
        Err(AppError::StaleElement(element.strategy.selector.clone()))
    }

    fn type_text(&mut self, element: &ElementHandle, _text: &str) -> Result<()> {
        Err(AppError::StaleElement(element.strategy.selector.clone()))
    }

    fn read_value(&self, _element: &ElementHandle) -> Result<String> {
        Ok(String::new())
    }

    fn collect_links(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        match self.page() {
            Some(page) if page.stale => Err(AppError::StaleElement(format!("links on {}", self.current))),
            Some(page) => Ok(page.links.clone()),
            None => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

pub struct FakeProbe {
    site: FakeSite,
}

impl ResourceProbe for FakeProbe {
    fn exists(&self, url: &str) -> Result<bool> {
        Ok(!self.site.missing.contains(url))
    }
}

/// Remote store double recording every call.
#[derive(Default)]
pub struct FakeStore {
    known: HashSet<String>,
    /// Probes for these URLs outlast any reasonable call timeout
    hanging: HashSet<String>,
    /// Posts for these URLs are refused
    rejecting: HashSet<String>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    pub probes: Mutex<HashMap<String, u32>>,
    pub patched: Mutex<Vec<String>>,
    pub posted: Mutex<Vec<ArticleRecord>>,
}

impl FakeStore {
    pub fn with_known(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn hanging_on(mut self, urls: &[&str]) -> Self {
        self.hanging = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn rejecting(mut self, urls: &[&str]) -> Self {
        self.rejecting = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    /// Every probe takes at least `latency`, so concurrent probes overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Highest number of existence probes running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self, url: &str) -> u32 {
        self.probes.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn patched(&self) -> Vec<String> {
        let mut patched = self.patched.lock().unwrap().clone();
        patched.sort();
        patched
    }

    pub fn posted_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .posted
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.url_or_placeholder().to_string())
            .collect();
        urls.sort();
        urls
    }
}

/// Counts a running probe until dropped, including when a timeout cancels it.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let running = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(running, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for FakeStore {
    async fn content_exists(&self, url: &str) -> Result<bool> {
        *self.probes.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let _running = InFlight::enter(&self.in_flight, &self.peak_in_flight);

        if self.hanging.contains(url) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        } else if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.known.contains(url))
    }

    async fn patch_last_verified(&self, url: &str, _at: DateTime<Utc>) -> Result<()> {
        self.patched.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn post_content(&self, record: &ArticleRecord) -> Result<()> {
        if self.rejecting.contains(record.url_or_placeholder()) {
            return Err(AppError::Internal("store unavailable".to_string()));
        }
        self.posted.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_content_by_filter(&self, _filter: &ContentFilter) -> Result<Vec<String>> {
        let mut urls: Vec<String> = self.known.iter().cloned().collect();
        urls.sort();
        Ok(urls)
    }
}

/// Collects formatted warnings for assertions.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Routes this thread's events into the capture until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn fast_settings() -> ReconcileSettings {
    ReconcileSettings {
        concurrency: 30,
        attempts: 2,
        retry_delay: Duration::from_millis(1),
        call_timeout: Duration::from_millis(50),
    }
}
