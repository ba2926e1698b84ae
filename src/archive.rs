use regex::Regex;
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

use crate::browser::{PageDriver, ResourceProbe};
use crate::frontier::anchored;
use crate::models::{ArchiveSettings, SiteProfile, UrlSet};
use crate::session::{Navigation, Session};
use crate::utils::error::{AppError, Result};

/// Walks a print archive's `year x issue` address space instead of following
/// links from the start page.
pub struct ArchiveEnumerator {
    settings: ArchiveSettings,
    exclude: Option<Regex>,
}

impl ArchiveEnumerator {
    pub fn new(settings: ArchiveSettings) -> Result<Self> {
        let exclude = settings.article_exclude.as_deref().map(Regex::new).transpose()?;
        Ok(Self { settings, exclude })
    }

    pub fn for_profile(profile: &SiteProfile) -> Result<Self> {
        let settings = profile.archive.clone().ok_or_else(|| {
            AppError::Validation(format!("{}: no archive configured", profile.name))
        })?;
        Self::new(settings)
    }

    /// Collects article URLs for every issue of every year in `years`.
    ///
    /// Issue numbers are retired from the top, so the first missing issue
    /// page ends that year.
    pub fn enumerate<D: PageDriver, P: ResourceProbe>(
        &self,
        session: &mut Session<D, P>,
        years: RangeInclusive<u32>,
    ) -> Result<UrlSet> {
        let mut found = UrlSet::new();

        for year in years {
            let before = found.len();
            for issue in self.settings.first_issue..=self.settings.last_issue {
                let issue_url = self.settings.issue_url(year, issue);
                match session.navigate(&issue_url) {
                    Ok(Navigation::Loaded(_)) => {}
                    Ok(Navigation::Skipped) => {
                        info!(year, issue, "Issue not found, year finished");
                        break;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(url = %issue_url, error = %e, "Skipping issue page");
                        continue;
                    }
                }

                let links = match session.collect_links() {
                    Ok(links) => links,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(url = %issue_url, error = %e, "Could not read issue links");
                        continue;
                    }
                };

                let articles = self.issue_articles(year, issue, links)?;
                debug!(year, issue, articles = articles.len(), "Issue enumerated");
                for article in articles {
                    found.insert(self.full_view(session.probe(), &article));
                }
            }
            info!(year, articles = found.len() - before, "Archive year enumerated");
        }

        Ok(found)
    }

    /// Links on an issue page that belong to that issue.
    pub fn issue_articles(&self, year: u32, issue: u32, links: Vec<String>) -> Result<UrlSet> {
        let pattern = anchored(&self.settings.article_pattern(year, issue))?;
        Ok(links
            .into_iter()
            .filter(|link| pattern.is_match(link))
            .filter(|link| !self.exclude.as_ref().is_some_and(|exclude| exclude.is_match(link)))
            .collect())
    }

    /// The single-page variant of `url` if the site serves one, else `url`.
    pub fn full_view<P: ResourceProbe + ?Sized>(&self, probe: &P, url: &str) -> String {
        let Some(suffix) = &self.settings.full_view_suffix else {
            return url.to_string();
        };
        let candidate = format!("{}{}", url.trim_end_matches('/'), suffix);
        match probe.exists(&candidate) {
            Ok(true) => candidate,
            Ok(false) => url.to_string(),
            Err(e) => {
                warn!(url = %candidate, error = %e, "Full view probe failed, keeping paged URL");
                url.to_string()
            }
        }
    }
}
