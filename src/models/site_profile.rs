use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

use crate::models::LocatorSpec;
use crate::utils::error::{AppError, Result};

/// Well-known locator roles referenced by the session manager.
pub mod roles {
    pub const EMAIL: &str = "email";
    pub const PASSWORD: &str = "password";
    pub const SUBMIT: &str = "submit";
    pub const SUBMIT_AFTER_LOGIN: &str = "submit_after_login";
    pub const LOGIN_FRAME: &str = "login_frame";
    pub const PAYWALL: &str = "paywall";
    pub const SHADOW_HOST: &str = "shadow_host";
    pub const COOKIE_BANNER_BUTTON: &str = "cookie_banner_button";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrlPatterns {
    pub article: String,
    /// Rejects URLs the article pattern would otherwise accept. Stands in for
    /// the look-around the `regex` crate does not support.
    #[serde(default)]
    pub article_exclude: Option<String>,
    pub subpage: String,
}

/// Deterministic `year x issue` address space for sites with a print archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveSettings {
    /// e.g. `https://www.zeit.de/{year}/{issue}/index`
    pub issue_url_template: String,
    /// Regex template for article links on an issue page, same placeholders.
    pub article_pattern_template: String,
    #[serde(default)]
    pub article_exclude: Option<String>,
    #[serde(default = "default_first_issue")]
    pub first_issue: u32,
    #[serde(default = "default_last_issue")]
    pub last_issue: u32,
    /// Appended to an article URL to request the single-page variant.
    #[serde(default)]
    pub full_view_suffix: Option<String>,
}

fn default_first_issue() -> u32 {
    1
}

fn default_last_issue() -> u32 {
    59
}

impl ArchiveSettings {
    pub fn issue_url(&self, year: u32, issue: u32) -> String {
        fill_template(&self.issue_url_template, year, issue)
    }

    pub fn article_pattern(&self, year: u32, issue: u32) -> String {
        fill_template(&self.article_pattern_template, year, issue)
    }
}

fn fill_template(template: &str, year: u32, issue: u32) -> String {
    template
        .replace("{year}", &year.to_string())
        .replace("{issue}", &format!("{:02}", issue))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialField {
    Email,
    Password,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavTarget {
    Base,
    Login,
}

/// One step of a site's login sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LoginStep {
    EnterText {
        role: String,
        field: CredentialField,
    },
    Click {
        role: String,
        /// Optional clicks log a warning instead of failing the login.
        #[serde(default)]
        optional: bool,
    },
    Navigate {
        target: NavTarget,
    },
    /// Runs the nested steps inside the frame hosted by `host`; the document
    /// context is restored afterwards.
    InFrame {
        host: String,
        steps: Vec<LoginStep>,
    },
    Pause {
        millis: u64,
    },
}

impl LoginStep {
    fn referenced_roles<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            LoginStep::EnterText { role, .. } | LoginStep::Click { role, .. } => out.push(role),
            LoginStep::InFrame { host, steps } => {
                out.push(host);
                for step in steps {
                    step.referenced_roles(out);
                }
            }
            LoginStep::Navigate { .. } | LoginStep::Pause { .. } => {}
        }
    }
}

/// Static per-site configuration, immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteProfile {
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub login_url: Option<String>,
    pub patterns: UrlPatterns,
    #[serde(default)]
    pub locators: BTreeMap<String, LocatorSpec>,
    #[serde(default)]
    pub login_steps: Vec<LoginStep>,
    #[serde(default)]
    pub archive: Option<ArchiveSettings>,
}

impl SiteProfile {
    pub fn locator(&self, role: &str) -> Option<&LocatorSpec> {
        self.locators.get(role)
    }

    /// The spec for `role`, or an empty spec (which never resolves) when the
    /// site does not define it.
    pub fn locator_or_empty(&self, role: &str) -> LocatorSpec {
        self.locators.get(role).cloned().unwrap_or_default()
    }

    pub fn requires_login(&self) -> bool {
        !self.login_steps.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)
            .map_err(|e| AppError::Validation(format!("{}: invalid base_url: {}", self.name, e)))?;

        if let Some(login_url) = &self.login_url {
            Url::parse(login_url)
                .map_err(|e| AppError::Validation(format!("{}: invalid login_url: {}", self.name, e)))?;
        }

        Regex::new(&self.patterns.article)?;
        Regex::new(&self.patterns.subpage)?;
        if let Some(exclude) = &self.patterns.article_exclude {
            Regex::new(exclude)?;
        }

        if self.requires_login() && self.login_url.is_none() {
            return Err(AppError::Validation(format!(
                "{}: login steps configured without login_url",
                self.name
            )));
        }

        let mut roles = Vec::new();
        for step in &self.login_steps {
            step.referenced_roles(&mut roles);
        }
        if let Some(missing) = roles.into_iter().find(|role| !self.locators.contains_key(*role)) {
            return Err(AppError::Validation(format!(
                "{}: login step references unknown locator role '{}'",
                self.name, missing
            )));
        }

        if let Some(archive) = &self.archive {
            if archive.first_issue == 0 || archive.first_issue > archive.last_issue {
                return Err(AppError::Validation(format!(
                    "{}: archive issue range {}..={} is empty",
                    self.name, archive.first_issue, archive.last_issue
                )));
            }
            Regex::new(&archive.article_pattern(2000, 1))?;
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SiteCatalogFile {
    #[serde(default)]
    sites: BTreeMap<String, SiteProfile>,
}

/// All configured site profiles, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SiteCatalog {
    sites: BTreeMap<String, SiteProfile>,
}

impl SiteCatalog {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: SiteCatalogFile = toml::from_str(source)?;
        let mut sites = BTreeMap::new();
        for (name, mut profile) in file.sites {
            profile.name = name.clone();
            profile.validate()?;
            sites.insert(name, profile);
        }
        Ok(Self { sites })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn get(&self, name: &str) -> Result<&SiteProfile> {
        self.sites.get(name).ok_or_else(|| AppError::NotFound {
            resource: format!("site profile '{}'", name),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
