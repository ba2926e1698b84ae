use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use crate::utils::error::{AppError, Result};

/// Lightweight existence check run before a page is loaded.
#[cfg_attr(test, mockall::automock)]
pub trait ResourceProbe: Send + Sync {
    /// `false` only when the resource reports 404.
    fn exists(&self, url: &str) -> Result<bool>;
}

/// HEAD request that follows redirects. Blocking, so it can run on the
/// browser thread between navigations.
pub struct HttpResourceProbe {
    client: reqwest::blocking::Client,
}

impl HttpResourceProbe {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

impl ResourceProbe for HttpResourceProbe {
    fn exists(&self, url: &str) -> Result<bool> {
        let response = self.client.head(url).send().map_err(|e| AppError::ProbeFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        debug!(url, status = status.as_u16(), "Resource probe");
        Ok(status != StatusCode::NOT_FOUND)
    }
}
