use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Set of absolute URLs with case-sensitive string identity. Order is
/// irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlSet(HashSet<String>);

impl UrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the URL was already present.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        self.0.insert(url.into())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.contains(url)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn union(&self, other: &UrlSet) -> UrlSet {
        self.0.union(&other.0).cloned().collect()
    }

    pub fn is_disjoint(&self, other: &UrlSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    /// Stable ordering for logs and deterministic processing.
    pub fn sorted(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.0.iter().cloned().collect();
        urls.sort();
        urls
    }

    /// Keeps at most `limit` URLs, chosen by sorted order.
    pub fn truncated(&self, limit: usize) -> UrlSet {
        self.sorted().into_iter().take(limit).collect()
    }
}

impl FromIterator<String> for UrlSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for UrlSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

impl Extend<String> for UrlSet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl IntoIterator for UrlSet {
    type Item = String;
    type IntoIter = std::collections::hash_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Result of checking one URL against the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Known,
    New,
    CheckFailed { attempts: u32, reason: String },
}

/// Partition of discovered URLs into those already stored and those to fetch.
///
/// `known` and `new` are disjoint and together cover every input URL.
/// URLs whose check failed are placed in `new` and also listed in
/// `check_failed` for reporting.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub known: UrlSet,
    pub new: UrlSet,
    pub check_failed: UrlSet,
    pub patch_failures: usize,
}

impl Reconciliation {
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (String, VerificationOutcome)>,
    {
        let mut partition = Self::default();
        for (url, outcome) in outcomes {
            match outcome {
                VerificationOutcome::Known => {
                    partition.known.insert(url);
                }
                VerificationOutcome::New => {
                    partition.new.insert(url);
                }
                VerificationOutcome::CheckFailed { .. } => {
                    partition.check_failed.insert(url.clone());
                    partition.new.insert(url);
                }
            }
        }
        partition
    }

    pub fn total(&self) -> usize {
        self.known.len() + self.new.len()
    }
}
