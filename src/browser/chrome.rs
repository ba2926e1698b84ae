use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::browser::driver::{js_lookup, DomScope, ElementHandle, PageDriver};
use crate::config::ScraperConfig;
use crate::models::{LocatorKind, LocatorStrategy};
use crate::utils::error::{AppError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `PageDriver` backed by a single headless Chrome tab.
pub struct ChromeDriver {
    // Dropping the browser kills the Chrome process, so it lives as long as the tab.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    pub fn launch(config: &ScraperConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .window_size(Some((config.window_width, config.window_height)))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?;

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| AppError::Browser(format!("Failed to set user agent: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.navigation_timeout));

        info!(headless = config.headless, "Browser session started");

        Ok(Self { _browser: browser, tab })
    }

    fn evaluate(&self, expression: &str) -> Result<Option<serde_json::Value>> {
        let result = self.tab.evaluate(expression, false).map_err(element_error)?;
        Ok(result.value)
    }

    fn evaluate_flag(&self, expression: &str) -> Result<bool> {
        Ok(matches!(self.evaluate(expression)?, Some(serde_json::Value::Bool(true))))
    }

    fn poll_scoped(&self, scope: &DomScope, strategy: &LocatorStrategy, timeout: Duration) -> Result<bool> {
        let probe = format!("({}) != null", js_lookup(scope, strategy));
        let deadline = Instant::now() + timeout;
        loop {
            if self.evaluate_flag(&probe)? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn stale(element: &ElementHandle) -> AppError {
        AppError::StaleElement(format!("{} in {} no longer present", element.strategy, element.scope))
    }
}

/// A closed DevTools connection means the session is gone; anything else on an
/// element is treated as the page having changed underneath us.
fn element_error(err: anyhow::Error) -> AppError {
    let message = err.to_string();
    if is_connection_lost(&message) {
        AppError::Browser(message)
    } else {
        AppError::StaleElement(message)
    }
}

fn is_connection_lost(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("connection is closed") || message.contains("connection closed")
}

impl PageDriver for ChromeDriver {
    fn navigate(&mut self, url: &str) -> Result<()> {
        let to_error = |e: anyhow::Error| {
            let message = e.to_string();
            if is_connection_lost(&message) {
                AppError::Browser(message)
            } else {
                AppError::NavigationFailed { url: url.to_string(), message }
            }
        };

        self.tab.navigate_to(url).map_err(to_error)?;
        self.tab.wait_until_navigated().map_err(to_error)?;
        debug!(url, final_url = %self.tab.get_url(), "Page loaded");
        Ok(())
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    fn page_source(&self) -> Result<String> {
        self.tab.get_content().map_err(element_error)
    }

    fn wait_for(&self, scope: &DomScope, strategy: &LocatorStrategy, timeout: Duration) -> Result<bool> {
        if *scope != DomScope::Document {
            return self.poll_scoped(scope, strategy, timeout);
        }

        let outcome = match (strategy.kind, strategy.to_css()) {
            (LocatorKind::Xpath, _) | (_, None) => self
                .tab
                .wait_for_xpath_with_custom_timeout(&strategy.selector, timeout)
                .map(|_| ()),
            (_, Some(css)) => self
                .tab
                .wait_for_element_with_custom_timeout(&css, timeout)
                .map(|_| ()),
        };

        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                let message = e.to_string();
                if is_connection_lost(&message) {
                    return Err(AppError::Browser(message));
                }
                debug!(strategy = %strategy, error = %message, "Strategy did not match");
                Ok(false)
            }
        }
    }

    fn click(&mut self, element: &ElementHandle) -> Result<()> {
        if element.scope == DomScope::Document {
            let found = match element.strategy.to_css() {
                Some(css) => self.tab.find_element(&css),
                None => self.tab.find_element_by_xpath(&element.strategy.selector),
            }
            .map_err(element_error)?;
            found.click().map_err(element_error)?;
            return Ok(());
        }

        let script = format!(
            "(function() {{ const el = {}; if (!el) return false; el.click(); return true; }})()",
            js_lookup(&element.scope, &element.strategy)
        );
        if self.evaluate_flag(&script)? {
            Ok(())
        } else {
            Err(Self::stale(element))
        }
    }

    fn type_text(&mut self, element: &ElementHandle, text: &str) -> Result<()> {
        let focus = format!(
            "(function() {{ const el = {}; if (!el) return false; el.focus(); el.value = ''; return true; }})()",
            js_lookup(&element.scope, &element.strategy)
        );
        if !self.evaluate_flag(&focus)? {
            return Err(Self::stale(element));
        }
        self.tab.type_str(text).map_err(element_error)?;
        Ok(())
    }

    fn read_value(&self, element: &ElementHandle) -> Result<String> {
        let script = format!(
            "(function() {{ const el = {}; return el ? String(el.value ?? '') : null; }})()",
            js_lookup(&element.scope, &element.strategy)
        );
        match self.evaluate(&script)? {
            Some(serde_json::Value::String(value)) => Ok(value),
            _ => Err(Self::stale(element)),
        }
    }

    fn collect_links(&self) -> Result<Vec<String>> {
        let script = "JSON.stringify(Array.from(document.querySelectorAll('a[href]')).map(a => a.href))";
        match self.evaluate(script)? {
            Some(serde_json::Value::String(raw)) => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.tab
            .close(true)
            .map_err(|e| AppError::Browser(format!("Failed to close tab: {}", e)))?;
        info!("Browser session closed");
        Ok(())
    }
}
