//! Items flowing through the monitor.
//!
//! `RawItem` is what a data source yields, `SentimentSample` is a scored item.
//! The `Reddit*` types mirror the public listing JSON and are converted into
//! `RawItem`s as soon as they are decoded.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A text item as produced by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub group_id: Option<String>,
}

/// A scored item. Score is expected in [-1, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSample {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    #[serde(default)]
    pub group_id: Option<String>,
}

impl SentimentSample {
    pub fn new(timestamp: DateTime<Utc>, score: f64) -> Self {
        Self {
            timestamp,
            score,
            group_id: None,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// Stable sort by timestamp; ties keep their arrival order.
pub fn sort_by_time(samples: &mut [SentimentSample]) {
    samples.sort_by_key(|s| s.timestamp);
}

pub fn is_time_ordered(samples: &[SentimentSample]) -> bool {
    samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

#[derive(Debug, Deserialize)]
pub struct RedditListing {
    pub data: RedditListingData,
}

#[derive(Debug, Deserialize)]
pub struct RedditListingData {
    #[serde(default)]
    pub children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
pub struct RedditChild {
    pub data: RedditThing,
}

/// A comment (`body`) or a post (`title` + `selftext`).
#[derive(Debug, Deserialize)]
pub struct RedditThing {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub selftext: Option<String>,
    pub created_utc: f64,
    #[serde(default)]
    pub subreddit: Option<String>,
}

impl RedditThing {
    /// `None` when `created_utc` is not a representable instant.
    pub fn into_item(self, fallback_group: &str) -> Option<RawItem> {
        let secs = self.created_utc.trunc() as i64;
        let timestamp = Utc.timestamp_opt(secs, 0).single()?;

        let text = match self.body {
            Some(body) => body,
            None => {
                let title = self.title.unwrap_or_default();
                let selftext = self.selftext.unwrap_or_default();
                format!("{} {}", title, selftext).trim().to_string()
            }
        };

        Some(RawItem {
            timestamp,
            text,
            group_id: Some(self.subreddit.unwrap_or_else(|| fallback_group.to_string())),
        })
    }
}
