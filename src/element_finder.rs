use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::{DomScope, ElementHandle, PageDriver};
use crate::models::LocatorSpec;
use crate::utils::error::{AppError, Result};

/// Resolves logical page elements through ordered fallback strategies.
///
/// Strategies are tried one after another, each with its own bounded wait, so
/// list order is a precision ranking: ids first, fragile CSS/XPath last.
pub struct ElementFinder;

impl ElementFinder {
    pub fn resolve<D: PageDriver + ?Sized>(
        driver: &D,
        spec: &LocatorSpec,
        scope: &DomScope,
        timeout: Duration,
        role: &str,
    ) -> Result<ElementHandle> {
        for strategy in spec {
            match driver.wait_for(scope, strategy, timeout) {
                Ok(true) => {
                    debug!(role, strategy = %strategy, scope = %scope, "Element resolved");
                    return Ok(ElementHandle::new(scope.clone(), strategy.clone()));
                }
                Ok(false) => {
                    debug!(role, strategy = %strategy, "Strategy timed out");
                }
                // The page changed mid-lookup; the next strategy gets a fresh attempt
                Err(AppError::StaleElement(reason)) => {
                    debug!(role, strategy = %strategy, reason = %reason, "Strategy hit a stale page");
                }
                Err(e) => return Err(e),
            }
        }

        let attempted = spec.describe();
        warn!(role, scope = %scope, attempted = ?attempted, "Element not found");
        Err(AppError::ElementNotFound {
            role: role.to_string(),
            attempted,
        })
    }

    /// Presence check that maps exhaustion to `false` instead of an error.
    pub fn is_present<D: PageDriver + ?Sized>(
        driver: &D,
        spec: &LocatorSpec,
        scope: &DomScope,
        timeout: Duration,
        role: &str,
    ) -> Result<bool> {
        match Self::resolve(driver, spec, scope, timeout, role) {
            Ok(_) => Ok(true),
            Err(AppError::ElementNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
