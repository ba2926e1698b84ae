use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    /// Expired, or expiring within `margin`.
    pub fn is_stale(&self, margin: Duration) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at - margin <= Utc::now())
    }
}

/// Issues fresh tokens. Called only when the cached token is missing or stale.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<AuthToken>;
}

/// Shared bearer token for store requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Result<String>;

    /// Drops `token` after the store rejected it. A token that has already
    /// been replaced is left alone.
    async fn invalidate(&self, token: &str);
}

/// Lazily refreshed token behind a single lock.
///
/// The lock is held across the refresh, so concurrent callers wait for the
/// one in-flight refresh and then observe its result.
pub struct CachedTokenProvider<S: TokenSource> {
    source: S,
    cached: Mutex<Option<AuthToken>>,
    refresh_margin: Duration,
}

impl<S: TokenSource> CachedTokenProvider<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            refresh_margin: Duration::seconds(30),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }
}

#[async_trait]
impl<S: TokenSource> TokenProvider for CachedTokenProvider<S> {
    async fn get_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_stale(self.refresh_margin) {
                return Ok(token.access_token.clone());
            }
            debug!("Cached token stale, refreshing");
        }

        let token = self.source.fetch().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn invalidate(&self, token: &str) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|current| current.access_token == token) {
            *cached = None;
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// OpenID Connect password grant against a Keycloak realm.
pub struct KeycloakTokenSource {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    username: String,
    password: String,
}

impl KeycloakTokenSource {
    pub fn new(
        server_url: &str,
        realm: &str,
        client_id: &str,
        username: &str,
        password: &str,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token_url: format!(
                "{}/realms/{}/protocol/openid-connect/token",
                server_url.trim_end_matches('/'),
                realm
            ),
            client_id: client_id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl TokenSource for KeycloakTokenSource {
    async fn fetch(&self) -> Result<AuthToken> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.client_id.as_str()),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("scope", "openid"),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::LoginFailed {
                site: "content store".to_string(),
                message: "token endpoint rejected the credentials".to_string(),
            });
        }

        let body: TokenResponse = response.error_for_status()?.json().await?;
        info!("Obtained content store token");
        Ok(AuthToken {
            access_token: body.access_token,
            expires_at: body.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}
