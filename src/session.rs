use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::browser::{DomScope, ElementHandle, PageDriver, ResourceProbe};
use crate::config::ScraperConfig;
use crate::element_finder::ElementFinder;
use crate::models::site_profile::roles;
use crate::models::{CredentialField, LoginStep, NavTarget, SiteProfile};
use crate::utils::error::{AppError, Result};

/// Site account used by the login sequence.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub const EMAIL_ENV: &'static str = "HERALD_SITE_EMAIL";
    pub const PASSWORD_ENV: &'static str = "HERALD_SITE_PASSWORD";

    /// Parses a credentials file: email on the first line, password on the second.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut lines = contents.lines().map(str::trim).filter(|line| !line.is_empty());
        match (lines.next(), lines.next()) {
            (Some(email), Some(password)) => Ok(Self {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err(AppError::Validation(
                "credentials file must contain an email line and a password line".to_string(),
            )),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn from_env() -> Option<Self> {
        match (std::env::var(Self::EMAIL_ENV), std::env::var(Self::PASSWORD_ENV)) {
            (Ok(email), Ok(password)) => Some(Self { email, password }),
            _ => None,
        }
    }

    /// Environment variables take precedence over the file.
    pub fn load(path: &Path) -> Result<Self> {
        match Self::from_env() {
            Some(credentials) => Ok(credentials),
            None => Self::from_file(path),
        }
    }

    fn value(&self, field: CredentialField) -> &str {
        match field {
            CredentialField::Email => &self.email,
            CredentialField::Password => &self.password,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    pub element: Duration,
    pub paywall: Duration,
    pub cookie_banner_delay: Duration,
}

impl From<&ScraperConfig> for SessionTimeouts {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            element: Duration::from_millis(config.element_timeout_ms),
            paywall: Duration::from_millis(config.paywall_timeout_ms),
            cookie_banner_delay: Duration::from_millis(config.cookie_banner_delay_ms),
        }
    }
}

/// The document currently loaded in the session. Replaced on every navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHandle {
    pub url: String,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Loaded(PageHandle),
    /// The probe reported the resource missing; the previous page is still live.
    Skipped,
}

impl Navigation {
    pub fn loaded(&self) -> bool {
        matches!(self, Navigation::Loaded(_))
    }
}

/// Single owner of a browser page for one site.
///
/// All navigation goes through `&mut self`, so only one component can drive
/// the page at a time.
pub struct Session<D: PageDriver, P: ResourceProbe> {
    driver: D,
    probe: P,
    profile: SiteProfile,
    timeouts: SessionTimeouts,
    page: Option<PageHandle>,
    generation: u64,
    scope: DomScope,
    closed: bool,
}

impl<D: PageDriver, P: ResourceProbe> Session<D, P> {
    pub fn new(driver: D, probe: P, profile: SiteProfile, timeouts: SessionTimeouts) -> Self {
        Self {
            driver,
            probe,
            profile,
            timeouts,
            page: None,
            generation: 0,
            scope: DomScope::Document,
            closed: false,
        }
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn page(&self) -> Option<&PageHandle> {
        self.page.as_ref()
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn scope(&self) -> &DomScope {
        &self.scope
    }

    pub fn navigate(&mut self, url: &str) -> Result<Navigation> {
        if self.closed {
            return Err(AppError::Browser("session already closed".to_string()));
        }

        match self.probe.exists(url) {
            Ok(false) => {
                info!(url, "Resource not found, navigation skipped");
                return Ok(Navigation::Skipped);
            }
            Ok(true) => {}
            Err(e) => warn!(url, error = %e, "Existence probe failed, navigating anyway"),
        }

        self.driver.navigate(url)?;
        self.generation += 1;
        self.scope = DomScope::Document;

        let current = self.driver.current_url();
        let handle = PageHandle {
            url: if current.is_empty() { url.to_string() } else { current },
            generation: self.generation,
        };
        self.page = Some(handle.clone());
        Ok(Navigation::Loaded(handle))
    }

    pub fn current_url(&self) -> String {
        self.driver.current_url()
    }

    pub fn page_source(&self) -> Result<String> {
        self.driver.page_source()
    }

    pub fn collect_links(&self) -> Result<Vec<String>> {
        self.driver.collect_links()
    }

    /// Resolves `role` in the active scope.
    pub fn resolve(&self, role: &str) -> Result<ElementHandle> {
        let spec = self.profile.locator_or_empty(role);
        ElementFinder::resolve(&self.driver, &spec, &self.scope, self.timeouts.element, role)
    }

    pub fn click(&mut self, role: &str) -> Result<()> {
        let element = self.resolve(role)?;
        self.driver.click(&element)
    }

    /// Types `value` into `role` and checks the field holds exactly that text.
    pub fn enter_text(&mut self, role: &str, value: &str) -> Result<()> {
        let element = self.resolve(role)?;
        self.driver.type_text(&element, value)?;

        let actual = self.driver.read_value(&element)?;
        if actual != value {
            return Err(AppError::Validation(format!(
                "field '{}' did not accept the typed value",
                role
            )));
        }
        Ok(())
    }

    /// Switches lookups into the frame hosted by `host_role` until the
    /// returned context is dropped.
    pub fn enter_frame(&mut self, host_role: &str) -> Result<ScopedContext<'_, D, P>> {
        let host = self.scoped_host(host_role)?;
        Ok(ScopedContext::new(self, DomScope::Frame(host.strategy)))
    }

    /// Switches lookups into the shadow root attached to `host_role` until
    /// the returned context is dropped.
    pub fn enter_shadow_root(&mut self, host_role: &str) -> Result<ScopedContext<'_, D, P>> {
        let host = self.scoped_host(host_role)?;
        Ok(ScopedContext::new(self, DomScope::ShadowRoot(host.strategy)))
    }

    fn scoped_host(&self, host_role: &str) -> Result<ElementHandle> {
        if self.scope != DomScope::Document {
            return Err(AppError::Validation(format!(
                "cannot enter '{}' from nested scope {}",
                host_role, self.scope
            )));
        }
        self.resolve(host_role)
    }

    /// Runs the site's login sequence, starting from the login page.
    pub fn login(&mut self, credentials: &Credentials) -> Result<()> {
        if !self.profile.requires_login() {
            debug!(site = %self.profile.name, "No login configured");
            return Ok(());
        }

        let steps = self.profile.login_steps.clone();
        let outcome = self
            .navigate_to_target(NavTarget::Login)
            .and_then(|_| self.run_steps(&steps, credentials));

        match outcome {
            Ok(()) => {
                info!(site = %self.profile.name, "Login completed");
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(site = %self.profile.name, error = %e, "Login failed");
                Err(AppError::LoginFailed {
                    site: self.profile.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn run_steps(&mut self, steps: &[LoginStep], credentials: &Credentials) -> Result<()> {
        for step in steps {
            match step {
                LoginStep::EnterText { role, field } => {
                    self.enter_text(role, credentials.value(*field))?;
                }
                LoginStep::Click { role, optional } => match self.click(role) {
                    Err(AppError::ElementNotFound { .. }) if *optional => {
                        warn!(role = %role, "Optional login click skipped");
                    }
                    other => other?,
                },
                LoginStep::Navigate { target } => self.navigate_to_target(*target)?,
                LoginStep::InFrame { host, steps } => {
                    let mut frame = self.enter_frame(host)?;
                    frame.run_steps(steps, credentials)?;
                }
                LoginStep::Pause { millis } => std::thread::sleep(Duration::from_millis(*millis)),
            }
        }
        Ok(())
    }

    fn navigate_to_target(&mut self, target: NavTarget) -> Result<()> {
        let url = match target {
            NavTarget::Base => self.profile.base_url.clone(),
            NavTarget::Login => self.profile.login_url.clone().ok_or_else(|| {
                AppError::Validation(format!("{}: no login_url configured", self.profile.name))
            })?,
        };
        match self.navigate(&url)? {
            Navigation::Loaded(_) => Ok(()),
            Navigation::Skipped => Err(AppError::NavigationSkipped { url }),
        }
    }

    /// Clicks the consent button, piercing the banner's shadow root when the
    /// site declares one. Returns whether a banner was dismissed.
    pub fn dismiss_cookie_banner(&mut self) -> Result<bool> {
        if self.profile.locator(roles::COOKIE_BANNER_BUTTON).is_none() {
            return Ok(false);
        }

        let delay = self.timeouts.cookie_banner_delay;
        let outcome = if self.profile.locator(roles::SHADOW_HOST).is_some() {
            self.enter_shadow_root(roles::SHADOW_HOST).and_then(|mut shadow| {
                std::thread::sleep(delay);
                shadow.click(roles::COOKIE_BANNER_BUTTON)
            })
        } else {
            std::thread::sleep(delay);
            self.click(roles::COOKIE_BANNER_BUTTON)
        };

        match outcome {
            Ok(()) => {
                info!(site = %self.profile.name, "Cookie banner dismissed");
                Ok(true)
            }
            Err(AppError::ElementNotFound { role, attempted }) => {
                warn!(site = %self.profile.name, role = %role, attempted = ?attempted, "Cookie banner not found");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Short-timeout probe for the site's paywall marker.
    pub fn is_paywalled(&self) -> Result<bool> {
        let Some(spec) = self.profile.locator(roles::PAYWALL) else {
            return Ok(false);
        };
        ElementFinder::is_present(&self.driver, spec, &DomScope::Document, self.timeouts.paywall, roles::PAYWALL)
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page = None;
        self.driver.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Lookups inside a frame or shadow root. The session returns to the
/// top-level document when this is dropped.
pub struct ScopedContext<'s, D: PageDriver, P: ResourceProbe> {
    session: &'s mut Session<D, P>,
}

impl<'s, D: PageDriver, P: ResourceProbe> ScopedContext<'s, D, P> {
    fn new(session: &'s mut Session<D, P>, scope: DomScope) -> Self {
        debug!(scope = %scope, "Entering scoped context");
        session.scope = scope;
        Self { session }
    }
}

impl<D: PageDriver, P: ResourceProbe> Deref for ScopedContext<'_, D, P> {
    type Target = Session<D, P>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<D: PageDriver, P: ResourceProbe> DerefMut for ScopedContext<'_, D, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<D: PageDriver, P: ResourceProbe> Drop for ScopedContext<'_, D, P> {
    fn drop(&mut self) {
        debug!(scope = %self.session.scope, "Leaving scoped context");
        self.session.scope = DomScope::Document;
    }
}
