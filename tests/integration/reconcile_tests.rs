use super::*;
use herald_crawler::content_extractor::ContentExtractor;
use herald_crawler::coordinator::{scrape, Coordinator};
use herald_crawler::models::UrlSet;

const A: &str = "https://news.example/politik/a-1";
const B: &str = "https://news.example/politik/b-2";
const C: &str = "https://news.example/politik/c-3";
const D: &str = "https://news.example/politik/d-4";

fn url_set(urls: &[&str]) -> UrlSet {
    urls.iter().copied().collect()
}

#[tokio::test]
async fn test_known_urls_patched_new_urls_scraped() -> anyhow::Result<()> {
    let store = Arc::new(FakeStore::with_known(&[A, B]));
    let coordinator = Coordinator::new(store.clone(), fast_settings());

    let partition = coordinator.reconcile(&url_set(&[A, B, C])).await;

    assert_eq!(partition.known, url_set(&[A, B]));
    assert_eq!(partition.new, url_set(&[C]));
    assert_eq!(store.patched(), vec![A.to_string(), B.to_string()]);
    assert_eq!(partition.patch_failures, 0);

    let site = FakeSite::new(vec![
        (A, FakePage::article("A", "Alt")),
        (B, FakePage::article("B", "Alt")),
        (C, FakePage::article("C", "Neu")),
    ]);
    let new = partition.new.clone();
    let visited = site.clone();
    let records = tokio::task::spawn_blocking(move || {
        let mut session = site.session(test_profile());
        scrape(&mut session, &ContentExtractor::new("example", "0.1"), &new, false)
    })
    .await??;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url.as_deref(), Some(C));
    // Known URLs were never opened
    assert_eq!(visited.visits(), vec![C.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_timed_out_probe_is_treated_as_new() {
    let store = Arc::new(FakeStore::with_known(&[A, D]).hanging_on(&[D]));
    let coordinator = Coordinator::new(store.clone(), fast_settings());
    let logs = LogCapture::default();
    let _guard = logs.install();

    let partition = coordinator.reconcile(&url_set(&[A, C, D])).await;

    let warnings: Vec<String> = logs
        .lines()
        .into_iter()
        .filter(|line| line.contains("WARN") && line.contains("Existence check failed"))
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains(D));

    assert_eq!(partition.known, url_set(&[A]));
    assert_eq!(partition.new, url_set(&[C, D]));
    assert_eq!(partition.check_failed, url_set(&[D]));
    assert_eq!(store.probe_count(D), 2);
    assert_eq!(store.probe_count(C), 1);
    // D might exist remotely but was not confirmed, so it is not patched
    assert_eq!(store.patched(), vec![A.to_string()]);
}

#[tokio::test]
async fn test_partition_is_exhaustive_and_disjoint() {
    let urls: Vec<String> = (0..100).map(|i| format!("https://news.example/politik/artikel-{i}")).collect();
    let known: Vec<&str> = urls.iter().step_by(3).map(String::as_str).collect();
    let hanging: Vec<&str> = urls.iter().skip(1).step_by(7).map(String::as_str).collect();
    let store = Arc::new(FakeStore::with_known(&known).hanging_on(&hanging));
    let coordinator = Coordinator::new(store, fast_settings());
    let all: UrlSet = urls.iter().map(String::as_str).collect();

    let partition = coordinator.reconcile(&all).await;

    assert!(partition.known.is_disjoint(&partition.new));
    assert_eq!(partition.known.union(&partition.new), all);
    assert_eq!(partition.total(), 100);
}

#[tokio::test]
async fn test_existence_checks_are_bounded_by_concurrency() {
    let urls: Vec<String> = (0..100).map(|i| format!("https://news.example/politik/artikel-{i}")).collect();
    let store = Arc::new(FakeStore::default().with_latency(Duration::from_millis(10)));
    let mut settings = fast_settings();
    settings.concurrency = 8;
    settings.call_timeout = Duration::from_secs(2);
    let coordinator = Coordinator::new(store.clone(), settings);
    let all: UrlSet = urls.iter().map(String::as_str).collect();

    let partition = coordinator.reconcile(&all).await;

    assert_eq!(partition.new.len(), 100);
    assert!(partition.check_failed.is_empty());
    let peak = store.peak_in_flight();
    assert!(peak <= 8, "{peak} probes ran at once");
    assert!(peak > 1, "probes never overlapped");
}

#[tokio::test]
async fn test_default_pool_width_holds_with_more_urls_than_workers() {
    let urls: Vec<String> = (0..200).map(|i| format!("https://news.example/sport/meldung-{i}")).collect();
    let store = Arc::new(FakeStore::default().with_latency(Duration::from_millis(10)));
    let mut settings = fast_settings();
    settings.call_timeout = Duration::from_secs(2);
    let coordinator = Coordinator::new(store.clone(), settings);
    let all: UrlSet = urls.iter().map(String::as_str).collect();

    let partition = coordinator.reconcile(&all).await;

    assert_eq!(partition.new.len(), 200);
    assert!(store.peak_in_flight() <= settings.concurrency);
}

#[tokio::test]
async fn test_empty_input() {
    let store = Arc::new(FakeStore::default());
    let coordinator = Coordinator::new(store.clone(), fast_settings());

    let partition = coordinator.reconcile(&UrlSet::new()).await;

    assert!(partition.known.is_empty());
    assert!(partition.new.is_empty());
    assert!(store.probes.lock().unwrap().is_empty());
}
