use super::*;
use herald_crawler::archive::ArchiveEnumerator;
use herald_crawler::content_extractor::ContentExtractor;
use herald_crawler::coordinator::scrape;
use herald_crawler::frontier::{UrlClassifier, UrlFrontier};
use herald_crawler::models::UrlSet;

fn news_site() -> FakeSite {
    FakeSite::new(vec![
        (
            BASE_URL,
            FakePage::links(&[
                "https://news.example/politik/wahl-ergebnis-101",
                "https://news.example/politik/",
                "https://news.example/sport/",
                "https://news.example/kultur/",
                "https://other.example/politik/fremd-999",
            ]),
        ),
        (
            "https://news.example/politik/",
            FakePage::links(&[
                "https://news.example/politik/wahl-ergebnis-101",
                "https://news.example/politik/haushalt-streit-102",
                "https://news.example/politik/",
            ]),
        ),
        ("https://news.example/sport/", FakePage::stale()),
        (
            "https://news.example/kultur/",
            FakePage::links(&["https://news.example/kultur/theater-premiere-103"]),
        ),
    ])
}

fn frontier() -> UrlFrontier {
    UrlFrontier::new(UrlClassifier::for_profile(&test_profile()).unwrap())
}

fn expected(urls: &[&str]) -> Vec<String> {
    let mut urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
    urls.sort();
    urls
}

#[test]
fn test_two_level_discovery_deduplicates_and_skips_stale_subpage() {
    let site = news_site();
    let mut session = site.session(test_profile());

    let found = frontier().discover_article_urls(&mut session).unwrap();

    assert_eq!(
        found.sorted(),
        expected(&[
            "https://news.example/kultur/theater-premiere-103",
            "https://news.example/politik/haushalt-streit-102",
            "https://news.example/politik/wahl-ergebnis-101",
        ])
    );
    // The stale subpage was visited, failed, and did not stop kultur
    let visits = site.visits();
    assert!(visits.contains(&"https://news.example/sport/".to_string()));
    assert!(visits.contains(&"https://news.example/kultur/".to_string()));
    // Articles are only classified, never opened
    assert!(!visits.iter().any(|v| v.ends_with("-101")));
}

#[test]
fn test_discovery_is_idempotent() {
    let site = news_site();
    let mut session = site.session(test_profile());
    let frontier = frontier();

    let first = frontier.discover_article_urls(&mut session).unwrap();
    let second = frontier.discover_article_urls(&mut session).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_missing_subpage_skipped_and_missing_base_fails() {
    let site = news_site().with_missing(&["https://news.example/kultur/"]);
    let mut session = site.session(test_profile());

    let found = frontier().discover_article_urls(&mut session).unwrap();
    assert_eq!(found.len(), 2);
    assert!(!site.visits().contains(&"https://news.example/kultur/".to_string()));

    let site = news_site().with_missing(&[BASE_URL]);
    let mut session = site.session(test_profile());
    let err = frontier().discover_article_urls(&mut session).unwrap_err();
    assert!(matches!(err, AppError::NavigationSkipped { .. }));
}

#[test]
fn test_subpage_limit() {
    let site = news_site();
    let mut session = site.session(test_profile());

    // Sorted subpages: kultur, politik, sport; only kultur is visited
    let found = frontier()
        .with_max_subpages(Some(1))
        .discover_article_urls(&mut session)
        .unwrap();

    assert_eq!(
        found.sorted(),
        expected(&[
            "https://news.example/kultur/theater-premiere-103",
            "https://news.example/politik/wahl-ergebnis-101",
        ])
    );
}

fn archive_profile() -> SiteProfile {
    let catalog = SiteCatalog::from_toml_str(
        r#"
        [sites.paper]
        base_url = "https://paper.example/"

        [sites.paper.patterns]
        article = 'https://paper\.example/.+'
        subpage = 'https://paper\.example/[a-z]+/$'

        [sites.paper.archive]
        issue_url_template = "https://paper.example/{year}/{issue}/index"
        article_pattern_template = 'https://paper\.example/{year}/{issue}/[a-z\-]+$'
        article_exclude = '/index$'
        first_issue = 1
        last_issue = 5
        full_view_suffix = "/komplettansicht"
        "#,
    )
    .unwrap();
    catalog.get("paper").unwrap().clone()
}

#[test]
fn test_archive_year_ends_at_first_missing_issue() {
    let site = FakeSite::new(vec![
        (
            "https://paper.example/1950/01/index",
            FakePage::links(&[
                "https://paper.example/1950/01/erste-meldung",
                "https://paper.example/1950/01/index",
            ]),
        ),
        (
            "https://paper.example/1950/02/index",
            FakePage::links(&["https://paper.example/1950/02/zweite-meldung"]),
        ),
        (
            "https://paper.example/1951/01/index",
            FakePage::links(&["https://paper.example/1951/01/neues-jahr"]),
        ),
    ])
    .with_missing(&[
        "https://paper.example/1950/03/index",
        "https://paper.example/1951/02/index",
        "https://paper.example/1950/02/zweite-meldung/komplettansicht",
    ]);
    let profile = archive_profile();
    let mut session = site.session(profile.clone());

    let found = ArchiveEnumerator::for_profile(&profile)
        .unwrap()
        .enumerate(&mut session, 1950..=1951)
        .unwrap();

    assert_eq!(
        found.sorted(),
        expected(&[
            "https://paper.example/1950/01/erste-meldung/komplettansicht",
            "https://paper.example/1950/02/zweite-meldung",
            "https://paper.example/1951/01/neues-jahr/komplettansicht",
        ])
    );
    let visits = site.visits();
    assert!(!visits.contains(&"https://paper.example/1950/04/index".to_string()));
    assert!(!visits.contains(&"https://paper.example/1951/03/index".to_string()));
}

#[test]
fn test_degraded_extraction_keeps_batch_going() {
    let site = FakeSite::new(vec![
        ("https://news.example/politik/leere-seite-1", FakePage::default()),
        (
            "https://news.example/politik/volle-seite-2",
            FakePage::article("Kurzfassung", "Der Landtag hat\n  beschlossen."),
        ),
    ])
    .with_missing(&["https://news.example/politik/geloescht-3"]);
    let mut session = site.session(test_profile());
    let urls: UrlSet = [
        "https://news.example/politik/leere-seite-1",
        "https://news.example/politik/volle-seite-2",
        "https://news.example/politik/geloescht-3",
    ]
    .into_iter()
    .collect();

    let records = scrape(&mut session, &ContentExtractor::new("example", "0.1"), &urls, false).unwrap();

    assert_eq!(records.len(), 2);
    let empty = &records[0];
    assert_eq!(empty.url.as_deref(), Some("https://news.example/politik/leere-seite-1"));
    assert!(empty.main_text.is_none());
    assert_eq!(empty.lead_text, "");
    assert!(empty.verified_at.is_some());

    let full = &records[1];
    assert_eq!(full.main_text.as_deref(), Some("Der Landtag hat beschlossen."));
    assert_eq!(full.lead_text, "Kurzfassung");
    assert_eq!(full.crawler_medium, "example");
}

#[test]
fn test_scrape_aborts_on_dead_browser() {
    let site = FakeSite::new(vec![]);
    let mut session = site.session(test_profile());
    session.close().unwrap();
    let urls: UrlSet = ["https://news.example/politik/a-1"].into_iter().collect();

    let err = scrape(&mut session, &ContentExtractor::new("example", "0.1"), &urls, false).unwrap_err();

    assert!(err.is_fatal());
    assert!(site.visits().is_empty());
}
