use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::browser::{PageDriver, ResourceProbe};
use crate::models::ArticleRecord;
use crate::session::Session;
use crate::utils::error::{AppError, Result};

/// Page furniture that never belongs to the article body.
const EXCLUDED_SELECTORS: &[&str] = &[
    "script",
    "style",
    "noscript",
    "nav",
    "header",
    "footer",
    "aside",
    "form",
    "figcaption",
    "div.advertisement",
    "aside.sidebar",
    "div.cookie-consent",
    "div.pop-up",
];

/// Containers preferred as the article root, most specific first.
const CONTENT_SELECTORS: &[&str] = &["div.article", "section.content", "article", "main", "body"];

const BLOCK_SELECTOR: &str = "p, h2, h3, li, blockquote";

const LEAD_SELECTORS: &[&str] = &[
    r#"meta[name="description"]"#,
    r#"meta[property="og:description"]"#,
    r#"meta[name="twitter:description"]"#,
];

const CANONICAL_SELECTORS: &[(&str, &str)] = &[
    (r#"link[rel="canonical"]"#, "href"),
    (r#"meta[property="og:url"]"#, "content"),
];

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
    // Selectors are compile-time constants; an invalid one is skipped rather than panicking
    selectors.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

/// Turns a rendered page into a normalized [`ArticleRecord`].
pub struct ContentExtractor {
    excluded: Vec<Selector>,
    containers: Vec<Selector>,
    blocks: Vec<Selector>,
    lead: Vec<Selector>,
    canonical: Vec<(Selector, &'static str)>,
    crawler_medium: String,
    crawler_version: String,
}

impl ContentExtractor {
    pub fn new(crawler_medium: impl Into<String>, crawler_version: impl Into<String>) -> Self {
        Self {
            excluded: parse_all(EXCLUDED_SELECTORS),
            containers: parse_all(CONTENT_SELECTORS),
            blocks: parse_all(&[BLOCK_SELECTOR]),
            lead: parse_all(LEAD_SELECTORS),
            canonical: CANONICAL_SELECTORS
                .iter()
                .filter_map(|(s, attr)| Selector::parse(s).ok().map(|sel| (sel, *attr)))
                .collect(),
            crawler_medium: crawler_medium.into(),
            crawler_version: crawler_version.into(),
        }
    }

    /// Extracts the session's current page.
    ///
    /// Only a dead browser session is an error; anything else yields a record
    /// with the missing fields left empty.
    pub fn extract<D: PageDriver, P: ResourceProbe>(&self, session: &Session<D, P>) -> Result<ArticleRecord> {
        let navigated = match session.page() {
            Some(page) => page.url.clone(),
            None => session.current_url(),
        };

        match session.page_source() {
            Ok(html) => Ok(self.extract_from_html(&html, &navigated)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(url = %navigated, error = %e, "Could not read rendered page");
                let mut record = self.blank_record();
                record.url = Some(navigated);
                Ok(record)
            }
        }
    }

    pub fn extract_from_html(&self, html: &str, navigated_url: &str) -> ArticleRecord {
        let document = Html::parse_document(html);
        let mut record = self.blank_record();

        record.main_text = self.main_text(&document);
        record.lead_text = self.lead_text(&document).unwrap_or_default();
        record.url = Some(self.resolve_url(&document, navigated_url));

        if record.main_text.is_none() {
            let degraded = AppError::ExtractionDegraded {
                url: navigated_url.to_string(),
                missing: "main text".to_string(),
            };
            warn!(url = navigated_url, "{}", degraded);
        }

        record
    }

    fn blank_record(&self) -> ArticleRecord {
        let mut record = ArticleRecord::empty();
        record.stamp_verified();
        record.set_crawler(&self.crawler_medium, &self.crawler_version);
        record
    }

    fn is_excluded(&self, element: ElementRef<'_>) -> bool {
        let mut current = Some(element);
        while let Some(el) = current {
            if self.excluded.iter().any(|selector| selector.matches(&el)) {
                return true;
            }
            current = el.parent().and_then(ElementRef::wrap);
        }
        false
    }

    fn main_text(&self, document: &Html) -> Option<String> {
        for container in &self.containers {
            for root in document.select(container) {
                if self.is_excluded(root) {
                    continue;
                }
                let text = self.collect_blocks(root);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    fn collect_blocks(&self, root: ElementRef<'_>) -> String {
        let mut parts: Vec<String> = Vec::new();
        for selector in &self.blocks {
            for block in root.select(selector) {
                if self.is_excluded(block) {
                    continue;
                }
                // Nested blocks (p inside li) would otherwise be counted twice
                let nested = block
                    .ancestors()
                    .take_while(|node| node.id() != root.id())
                    .filter_map(ElementRef::wrap)
                    .any(|ancestor| self.blocks.iter().any(|s| s.matches(&ancestor)));
                if nested {
                    continue;
                }
                let text = collapse_whitespace(&block.text().collect::<String>());
                if !text.is_empty() {
                    parts.push(text);
                }
            }
        }
        parts.join(" ")
    }

    fn lead_text(&self, document: &Html) -> Option<String> {
        self.lead.iter().find_map(|selector| {
            document
                .select(selector)
                .filter_map(|meta| meta.value().attr("content"))
                .map(collapse_whitespace)
                .find(|content| !content.is_empty())
        })
    }

    fn resolve_url(&self, document: &Html, navigated_url: &str) -> String {
        let canonical = self.canonical.iter().find_map(|(selector, attr)| {
            document
                .select(selector)
                .filter_map(|el| el.value().attr(attr))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(|value| absolutize(value, navigated_url))
        });

        match canonical {
            Some(canonical) if canonical != navigated_url => {
                warn!(navigated = navigated_url, canonical = %canonical, "Canonical URL differs from navigated URL");
                canonical
            }
            Some(canonical) => canonical,
            None => navigated_url.to_string(),
        }
    }
}

fn absolutize(value: &str, base: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(value))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| value.to_string())
}

/// Collapses newlines and runs of whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
