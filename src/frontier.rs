use regex::Regex;
use tracing::{debug, info, warn};

use crate::browser::{PageDriver, ResourceProbe};
use crate::models::{LinkClass, SiteProfile, UrlSet};
use crate::session::{Navigation, Session};
use crate::utils::error::{AppError, Result};

/// Anchors a pattern at the start of the input only. A trailing `$` in the
/// pattern still anchors the end.
pub fn anchored(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})", pattern))?)
}

/// Per-site article/subpage link classification.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    article: Regex,
    article_exclude: Option<Regex>,
    subpage: Regex,
}

impl UrlClassifier {
    pub fn new(article: &str, article_exclude: Option<&str>, subpage: &str) -> Result<Self> {
        Ok(Self {
            article: anchored(article)?,
            // Exclusions are searched anywhere in the URL
            article_exclude: article_exclude.map(Regex::new).transpose()?,
            subpage: anchored(subpage)?,
        })
    }

    pub fn for_profile(profile: &SiteProfile) -> Result<Self> {
        Self::new(
            &profile.patterns.article,
            profile.patterns.article_exclude.as_deref(),
            &profile.patterns.subpage,
        )
    }

    pub fn is_article(&self, url: &str) -> bool {
        self.article.is_match(url)
            && !self
                .article_exclude
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(url))
    }

    pub fn is_subpage(&self, url: &str) -> bool {
        self.subpage.is_match(url)
    }

    /// Article wins when both patterns match.
    pub fn classify(&self, url: &str) -> LinkClass {
        if self.is_article(url) {
            LinkClass::Article
        } else if self.is_subpage(url) {
            LinkClass::Subpage
        } else {
            LinkClass::Other
        }
    }

    /// Splits links into (articles, subpages), dropping everything else.
    pub fn partition<I, S>(&self, links: I) -> (UrlSet, UrlSet)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut articles = UrlSet::new();
        let mut subpages = UrlSet::new();
        for link in links {
            let link = link.into();
            match self.classify(&link) {
                LinkClass::Article => {
                    articles.insert(link);
                }
                LinkClass::Subpage => {
                    subpages.insert(link);
                }
                LinkClass::Other => {}
            }
        }
        (articles, subpages)
    }
}

/// Two-level discovery: the start page, then every subpage it links to.
pub struct UrlFrontier {
    classifier: UrlClassifier,
    max_subpages: Option<usize>,
}

impl UrlFrontier {
    pub fn new(classifier: UrlClassifier) -> Self {
        Self {
            classifier,
            max_subpages: None,
        }
    }

    pub fn with_max_subpages(mut self, max_subpages: Option<usize>) -> Self {
        self.max_subpages = max_subpages;
        self
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    pub fn discover_article_urls<D: PageDriver, P: ResourceProbe>(
        &self,
        session: &mut Session<D, P>,
    ) -> Result<UrlSet> {
        let base_url = session.profile().base_url.clone();
        let site = session.profile().name.clone();

        if let Navigation::Skipped = session.navigate(&base_url)? {
            return Err(AppError::NavigationSkipped { url: base_url });
        }

        let (mut articles, subpages) = self.classifier.partition(session.collect_links()?);
        info!(
            site = %site,
            articles = articles.len(),
            subpages = subpages.len(),
            "Classified start page links"
        );

        let mut subpages: Vec<String> = subpages.sorted().into_iter().filter(|url| *url != base_url).collect();
        if let Some(limit) = self.max_subpages {
            subpages.truncate(limit);
        }

        for subpage in subpages {
            match self.subpage_articles(session, &subpage) {
                Ok(found) => {
                    debug!(subpage = %subpage, articles = found.len(), "Subpage classified");
                    articles.extend(found);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(subpage = %subpage, error = %e, "Skipping subpage"),
            }
        }

        info!(site = %site, articles = articles.len(), "Article discovery finished");
        Ok(articles)
    }

    fn subpage_articles<D: PageDriver, P: ResourceProbe>(
        &self,
        session: &mut Session<D, P>,
        subpage: &str,
    ) -> Result<UrlSet> {
        match session.navigate(subpage)? {
            Navigation::Loaded(_) => {
                let (articles, _) = self.classifier.partition(session.collect_links()?);
                Ok(articles)
            }
            Navigation::Skipped => Err(AppError::NavigationSkipped {
                url: subpage.to_string(),
            }),
        }
    }
}
