use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::StoreConfig;
use crate::models::ArticleRecord;
use crate::store::auth::TokenProvider;
use crate::store::{ContentFilter, ContentStore};
use crate::utils::error::{AppError, Result};

const CONTENT_PATH: &str = "api/v1/content/";
const REHYDRATE_PATH: &str = "api/v1/content/rehydrate/";

#[derive(Debug, Deserialize)]
struct ContentItem {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentPage {
    #[serde(default)]
    items: Vec<ContentItem>,
}

/// reqwest client for the remote content store.
pub struct HttpContentStore<T: TokenProvider> {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<T>,
    probe_timeout: Duration,
    auth_retries: u32,
}

impl<T: TokenProvider> HttpContentStore<T> {
    pub fn new(config: &StoreConfig, tokens: Arc<T>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        // Endpoints are joined relative to the base, which therefore needs a trailing slash
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| AppError::Validation(format!("invalid store base_url '{}': {}", config.base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            tokens,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            auth_retries: config.auth_retries,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("cannot build endpoint {}: {}", path, e)))
    }

    /// Sends the request with a bearer token. A 401 drops the token and retries
    /// with a fresh one, up to `auth_retries` times.
    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        for attempt in 0..=self.auth_retries {
            let token = self.tokens.get_token().await?;
            let response = build().bearer_auth(&token).send().await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            warn!(attempt, "Content store rejected token");
            self.tokens.invalidate(&token).await;
        }
        Err(AppError::AuthExpired)
    }
}

#[async_trait]
impl<T: TokenProvider> ContentStore for HttpContentStore<T> {
    async fn content_exists(&self, url: &str) -> Result<bool> {
        let endpoint = self.endpoint(REHYDRATE_PATH)?;
        let response = self
            .send_authorized(|| {
                self.client
                    .get(endpoint.clone())
                    .query(&[("url", url)])
                    .timeout(self.probe_timeout)
            })
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(AppError::ProbeFailed {
                url: url.to_string(),
                reason: format!("unexpected status {}", status),
            }),
        }
    }

    async fn patch_last_verified(&self, url: &str, at: DateTime<Utc>) -> Result<()> {
        let endpoint = self.endpoint(CONTENT_PATH)?;
        let body = json!({ "last_online_verification_date": at.to_rfc3339() });
        self.send_authorized(|| {
            self.client
                .patch(endpoint.clone())
                .query(&[("url", url)])
                .json(&body)
        })
        .await?
        .error_for_status()?;
        debug!(url, "Verification date patched");
        Ok(())
    }

    async fn post_content(&self, record: &ArticleRecord) -> Result<()> {
        let endpoint = self.endpoint(CONTENT_PATH)?;
        self.send_authorized(|| self.client.post(endpoint.clone()).json(record))
            .await?
            .error_for_status()?;
        debug!(url = record.url_or_placeholder(), "Content posted");
        Ok(())
    }

    async fn list_content_by_filter(&self, filter: &ContentFilter) -> Result<Vec<String>> {
        let endpoint = self.endpoint(CONTENT_PATH)?;
        let pairs = filter.pairs();
        let page: ContentPage = self
            .send_authorized(|| self.client.get(endpoint.clone()).query(&pairs))
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page.items.into_iter().map(|item| item.url).collect())
    }
}
