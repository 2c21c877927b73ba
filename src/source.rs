//! Data sources yielding raw text items for a group.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{SourceConfig, SourceKind};
use crate::error::{MonitorError, Result};
use crate::models::{RawItem, RedditListing};

/// Matches every group in [`JsonFileSource`].
pub const ALL_GROUPS: &str = "*";

#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Up to `limit` items for `source_id`, in whatever order the source returns them.
    async fn fetch_items(&self, source_id: &str, limit: usize) -> Result<Vec<RawItem>>;

    fn name(&self) -> &'static str;
}

/// Latest comments of a subreddit from the public listing endpoint.
pub struct RedditSource {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl RedditSource {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        }
    }

    fn comments_url(&self, subreddit: &str) -> String {
        format!("{}/r/{}/comments.json", self.base_url, subreddit)
    }
}

#[async_trait]
impl ItemSource for RedditSource {
    async fn fetch_items(&self, source_id: &str, limit: usize) -> Result<Vec<RawItem>> {
        let url = self.comments_url(source_id);
        let http_err = |source: reqwest::Error| MonitorError::Http {
            url: url.clone(),
            source,
        };

        let body = self
            .client
            .get(&url)
            .query(&[("limit", limit.to_string())])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?
            .text()
            .await
            .map_err(http_err)?;

        let listing: RedditListing = serde_json::from_str(&body)?;
        let total = listing.data.children.len();
        let mut items: Vec<RawItem> = listing
            .data
            .children
            .into_iter()
            .filter_map(|child| child.data.into_item(source_id))
            .collect();

        if items.len() < total {
            warn!(subreddit = source_id, dropped = total - items.len(), "skipped listing entries with bad timestamps");
        }
        items.truncate(limit);
        debug!(subreddit = source_id, count = items.len(), "fetched items");
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}

/// Items stored as a JSON array of `RawItem`.
pub struct JsonFileSource {
    path: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ItemSource for JsonFileSource {
    async fn fetch_items(&self, source_id: &str, limit: usize) -> Result<Vec<RawItem>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let items: Vec<RawItem> = serde_json::from_str(&content)?;

        Ok(items
            .into_iter()
            .filter(|item| source_id == ALL_GROUPS || item.group_id.as_deref() == Some(source_id))
            .take(limit)
            .collect())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

pub fn from_config(cfg: &SourceConfig) -> Box<dyn ItemSource> {
    match (cfg.kind, cfg.path.as_deref()) {
        (SourceKind::File, Some(path)) => Box::new(JsonFileSource::new(path)),
        _ => Box::new(RedditSource::new(&cfg.base_url, &cfg.user_agent)),
    }
}
