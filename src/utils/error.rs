use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Site profile error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Element not found for role '{role}' after trying: {}", attempted.join(", "))]
    ElementNotFound { role: String, attempted: Vec<String> },

    #[error("Navigation skipped, resource not found: {url}")]
    NavigationSkipped { url: String },

    #[error("Navigation to {url} failed: {message}")]
    NavigationFailed { url: String, message: String },

    #[error("Extraction degraded for {url}: missing {missing}")]
    ExtractionDegraded { url: String, missing: String },

    #[error("Existence probe failed for {url}: {reason}")]
    ProbeFailed { url: String, reason: String },

    #[error("Authentication token expired or rejected")]
    AuthExpired,

    #[error("Stale page reference: {0}")]
    StaleElement(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Login failed for {site}: {message}")]
    LoginFailed { site: String, message: String },

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Network-level failures that the reconciliation phase retries before
    /// folding the URL into the "new" partition.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Http(_) | AppError::ProbeFailed { .. } | AppError::AuthExpired
        )
    }

    /// Failures that mean the browser session itself is gone.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Browser(_))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background task failed: {}", err))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
