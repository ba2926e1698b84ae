use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Medium {
    pub readable_id: String,
}

/// Article built incrementally by the content extractor.
///
/// A record is complete once `url` is set. Fields attached by enrichment land
/// in `extra` and are serialized inline with the core fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleRecord {
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_text: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lead_text: String,
    #[serde(rename = "last_online_verification_date")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<Medium>,
    #[serde(default)]
    pub crawler_medium: String,
    #[serde(default)]
    pub crawler_version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArticleRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.url.is_some()
    }

    pub fn stamp_verified(&mut self) {
        self.verified_at = Some(Utc::now());
    }

    /// Tags the record with the crawler that produced it.
    pub fn set_crawler(&mut self, medium: &str, version: &str) {
        self.medium = Some(Medium {
            readable_id: medium.to_string(),
        });
        self.crawler_medium = medium.to_string();
        self.crawler_version = version.to_string();
    }

    /// Attaches an enrichment field. Core fields are never overwritten.
    pub fn attach(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    pub fn url_or_placeholder(&self) -> &str {
        self.url.as_deref().unwrap_or("N/A")
    }
}
