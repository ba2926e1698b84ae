use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub pipeline: PipelineConfig,
    pub sites_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Seconds
    pub navigation_timeout: u64,
    pub element_timeout_ms: u64,
    pub paywall_timeout_ms: u64,
    pub cookie_banner_delay_ms: u64,
    /// Seconds, for the HEAD check before each navigation
    pub probe_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub base_url: String,
    /// Seconds
    pub request_timeout: u64,
    pub probe_timeout_ms: u64,
    pub probe_concurrency: usize,
    pub probe_attempts: u32,
    pub retry_delay_ms: u64,
    pub auth_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub server_url: String,
    pub realm: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Two-line file (user, password) used when `username`/`password` are unset
    pub credentials_path: Option<String>,
    /// Two-line file with the news-site login
    pub site_credentials_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Upload,
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub crawler_version: String,
    pub enrichment_batch_size: usize,
    pub delivery: DeliveryMode,
    pub spool_path: String,
    pub max_urls: Option<usize>,
    pub max_subpages: Option<usize>,
    pub skip_paywalled: bool,
    pub strip_text_before_upload: bool,
    pub log_dir: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load("config")
    }

    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = config_dir.as_ref();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let layer = |name: &str| dir.join(name).to_string_lossy().into_owned();

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&layer("default")))
            // Add environment-specific config
            .add_source(File::with_name(&layer(&run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name(&layer("local")).required(false))
            // Add environment variables with prefix "HERALD_"
            .add_source(Environment::with_prefix("HERALD").prefix_separator("_").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.element_timeout_ms == 0 {
            return Err(ConfigError::Message("Scraper element_timeout_ms must be greater than 0".into()));
        }

        if self.scraper.paywall_timeout_ms >= self.scraper.element_timeout_ms {
            return Err(ConfigError::Message(
                "Scraper paywall_timeout_ms must be shorter than element_timeout_ms".into(),
            ));
        }

        if self.scraper.navigation_timeout == 0 {
            return Err(ConfigError::Message("Scraper navigation_timeout must be greater than 0".into()));
        }

        if Url::parse(&self.store.base_url).is_err() {
            return Err(ConfigError::Message("Invalid store base URL format".into()));
        }

        if self.store.probe_concurrency == 0 {
            return Err(ConfigError::Message("Store probe_concurrency must be greater than 0".into()));
        }

        if self.store.probe_attempts == 0 {
            return Err(ConfigError::Message("Store probe_attempts must be greater than 0".into()));
        }

        if Url::parse(&self.auth.server_url).is_err() {
            return Err(ConfigError::Message("Invalid auth server URL format".into()));
        }

        if self.pipeline.enrichment_batch_size == 0 {
            return Err(ConfigError::Message("Pipeline enrichment_batch_size must be greater than 0".into()));
        }

        if self.pipeline.delivery == DeliveryMode::Queue && self.pipeline.spool_path.trim().is_empty() {
            return Err(ConfigError::Message("Pipeline spool_path is required for queue delivery".into()));
        }

        Ok(())
    }
}
