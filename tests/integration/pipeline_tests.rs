use super::*;
use herald_crawler::coordinator::Coordinator;
use herald_crawler::pipeline::{upload_spooled, CrawlMode, CrawlOptions, CrawlPipeline, Delivery};
use herald_crawler::plugins::EnrichmentManager;
use herald_crawler::queue::SpoolQueue;
use herald_crawler::session::Credentials;
use tempfile::TempDir;

const KNOWN: &str = "https://news.example/politik/bekannt-1";
const FRESH: &str = "https://news.example/politik/neu-2";
const DEEP: &str = "https://news.example/sport/finale-3";

fn site() -> FakeSite {
    FakeSite::new(vec![
        (BASE_URL, FakePage::links(&[KNOWN, FRESH, "https://news.example/sport/"])),
        ("https://news.example/sport/", FakePage::links(&[DEEP])),
        (KNOWN, FakePage::article("Bekannt", "Schon gespeichert.")),
        (FRESH, FakePage::article("Neu", "Frisch entdeckt.")),
        (DEEP, FakePage::article("Finale", "Spiel entschieden.")),
    ])
}

fn options() -> CrawlOptions {
    CrawlOptions {
        crawler_version: "0.1".to_string(),
        max_urls: None,
        max_subpages: None,
        skip_paywalled: false,
    }
}

fn pipeline(store: Arc<FakeStore>, delivery: Delivery, options: CrawlOptions) -> CrawlPipeline<FakeStore> {
    CrawlPipeline::new(
        Coordinator::new(store, fast_settings()),
        EnrichmentManager::new(10),
        delivery,
        options,
    )
}

#[tokio::test]
async fn test_crawl_uploads_only_new_articles() -> anyhow::Result<()> {
    let site = site();
    let store = Arc::new(FakeStore::with_known(&[KNOWN]));

    let summary = pipeline(store.clone(), Delivery::Upload, options())
        .run(site.session(test_profile()), None, CrawlMode::Latest)
        .await?;

    assert_eq!(summary.site, "example");
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.known, 1);
    assert_eq!(summary.new, 2);
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.uploaded, 2);
    assert_eq!(summary.upload_failed, 0);
    assert!(!summary.logged_in);

    assert_eq!(store.patched(), vec![KNOWN.to_string()]);
    assert_eq!(store.posted_urls(), vec![FRESH.to_string(), DEEP.to_string()]);
    assert!(!site.visits().contains(&KNOWN.to_string()));

    let posted = store.posted.lock().unwrap();
    assert!(posted.iter().all(|r| r.crawler_medium == "example" && r.verified_at.is_some()));
    Ok(())
}

#[tokio::test]
async fn test_url_cap_applies_before_reconciliation() -> anyhow::Result<()> {
    let store = Arc::new(FakeStore::default());
    let mut options = options();
    options.max_urls = Some(1);

    let summary = pipeline(store.clone(), Delivery::Upload, options)
        .run(site().session(test_profile()), None, CrawlMode::Latest)
        .await?;

    assert_eq!(summary.discovered, 1);
    assert_eq!(store.probes.lock().unwrap().len(), 1);
    assert_eq!(summary.uploaded, 1);
    Ok(())
}

#[tokio::test]
async fn test_queue_delivery_then_spool_upload() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let spool = Arc::new(SpoolQueue::new(dir.path().join("processed_content.jsonl")));
    let store = Arc::new(FakeStore::with_known(&[KNOWN]));

    let summary = pipeline(store.clone(), Delivery::Queue(spool.clone()), options())
        .run(site().session(test_profile()), None, CrawlMode::Latest)
        .await?;

    assert_eq!(summary.queued, 2);
    assert_eq!(summary.uploaded, 0);
    assert!(store.posted_urls().is_empty());

    // A separate consumer drains the spool
    let consumer = SpoolQueue::new(spool.path());
    let report = upload_spooled(&consumer, &Coordinator::new(store.clone(), fast_settings())).await?;

    assert_eq!(report.uploaded, 2);
    assert_eq!(store.posted_urls().len(), 2);

    let again = upload_spooled(&consumer, &Coordinator::new(store.clone(), fast_settings())).await?;
    assert_eq!(again.uploaded, 0);
    Ok(())
}

#[tokio::test]
async fn test_rejected_records_stay_in_spool() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let spool = Arc::new(SpoolQueue::new(dir.path().join("processed_content.jsonl")));
    pipeline(Arc::new(FakeStore::default()), Delivery::Queue(spool.clone()), options())
        .run(site().session(test_profile()), None, CrawlMode::Latest)
        .await?;

    // The store is down for one article during the upload
    let flaky = Arc::new(FakeStore::default().rejecting(&[FRESH]));
    let report = upload_spooled(&SpoolQueue::new(spool.path()), &Coordinator::new(flaky.clone(), fast_settings())).await?;

    assert_eq!(report.uploaded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(flaky.posted_urls(), vec![KNOWN.to_string(), DEEP.to_string()]);
    let spooled = std::fs::read_to_string(spool.path())?;
    assert_eq!(spooled.lines().count(), 1);
    assert!(spooled.contains(FRESH));

    // A later upload against a healthy store delivers the rest
    let healthy = Arc::new(FakeStore::default());
    let retry = upload_spooled(&SpoolQueue::new(spool.path()), &Coordinator::new(healthy.clone(), fast_settings())).await?;

    assert_eq!(retry.uploaded, 1);
    assert_eq!(healthy.posted_urls(), vec![FRESH.to_string()]);
    assert_eq!(std::fs::read_to_string(spool.path())?, "");
    Ok(())
}

fn login_profile() -> SiteProfile {
    let catalog = SiteCatalog::from_toml_str(
        r#"
        [sites.example]
        base_url = "https://news.example/"
        login_url = "https://news.example/login"

        [sites.example.patterns]
        article = 'https://news\.example/[a-z]+/[a-z\-]+-\d+$'
        subpage = 'https://news\.example/[a-z]+/$'

        [sites.example.locators]
        email = [{ kind = "id", selector = "username" }]
        submit = [{ kind = "id", selector = "submit" }]

        [[sites.example.login_steps]]
        action = "enter_text"
        role = "email"
        field = "email"

        [[sites.example.login_steps]]
        action = "click"
        role = "submit"
        "#,
    )
    .unwrap();
    catalog.get("example").unwrap().clone()
}

#[tokio::test]
async fn test_failed_login_is_reported_and_crawl_continues() -> anyhow::Result<()> {
    let site = site();
    let store = Arc::new(FakeStore::default());
    let credentials = Credentials::parse("reader@example.org\nsecret\n")?;

    let summary = pipeline(store, Delivery::Upload, options())
        .run(site.session(login_profile()), Some(credentials), CrawlMode::Latest)
        .await?;

    assert!(!summary.logged_in);
    assert!(site.visits().contains(&"https://news.example/login".to_string()));
    assert_eq!(summary.uploaded, 3);
    Ok(())
}

#[tokio::test]
async fn test_missing_start_page_fails_run() {
    let site = site().with_missing(&[BASE_URL]);
    let store = Arc::new(FakeStore::default());

    let result = pipeline(store.clone(), Delivery::Upload, options())
        .run(site.session(test_profile()), None, CrawlMode::Latest)
        .await;

    assert!(matches!(result, Err(AppError::NavigationSkipped { .. })));
    assert!(store.probes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_archive_mode_requires_archive_settings() {
    let store = Arc::new(FakeStore::default());

    let result = pipeline(store, Delivery::Upload, options())
        .run(site().session(test_profile()), None, CrawlMode::Archive(2020..=2021))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}
