use serde::Deserialize;
use std::fs;
use std::path::Path;

use chrono::FixedOffset;

use crate::error::{MonitorError, Result};
use crate::metrics::{Thresholds, VolatilityMetrics};
use crate::sentiment::{EnsembleMethod, EnsembleScorer, LexiconScorer, PolarityScorer};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Reddit,
    File,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Subreddits (or group ids for the file source) to analyze.
    pub groups: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// JSON file of items, used by the `file` source.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ScorerWeights {
    pub lexicon: f64,
    pub polarity: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            lexicon: 0.5,
            polarity: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct ScorerConfig {
    #[serde(default)]
    pub method: EnsembleMethod,
    #[serde(default)]
    pub weights: ScorerWeights,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TrackerConfig {
    pub window_size: usize,
    /// Rolling volatility at or above this triggers an alert.
    pub alert_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            alert_threshold: 0.3,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct TimeOfDayConfig {
    /// Offset used to read the hour of day. Absent disables the time-of-day section.
    pub utc_offset_hours: Option<i32>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct HistogramConfig {
    pub step: f64,
    pub buckets: usize,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            step: 0.05,
            buckets: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub source: SourceConfig,

    #[serde(default)]
    pub slack_webhook_url: Option<String>,

    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub time_of_day: TimeOfDayConfig,
    #[serde(default)]
    pub histogram: HistogramConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

fn default_limit() -> usize {
    50
}

fn default_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_user_agent() -> String {
    "emotion_volatility/0.1".to_string()
}

fn default_cooldown_secs() -> u64 {
    600
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_report_interval_secs() -> u64 {
    3600
}

impl MonitorConfig {
    /// Loads configuration from `config.yaml` in the current working directory.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml_content = fs::read_to_string(path).map_err(|source| MonitorError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml_content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: MonitorConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(MonitorError::InvalidConfig(msg.to_string()));

        if self.source.groups.is_empty() {
            return invalid("source.groups must name at least one group");
        }
        if self.source.kind == SourceKind::File && self.source.path.is_none() {
            return invalid("source.path is required for the file source");
        }
        if self.tracker.window_size == 0 {
            return invalid("tracker.window_size must be at least 1");
        }
        if !self.tracker.alert_threshold.is_finite() {
            return invalid("tracker.alert_threshold must be finite");
        }
        if self.histogram.buckets == 0 {
            return invalid("histogram.buckets must be at least 1");
        }
        if self.histogram.step.is_nan() || self.histogram.step <= 0.0 {
            return invalid("histogram.step must be positive");
        }
        if self.slack_webhook_url.as_deref().is_some_and(str::is_empty) {
            return invalid("slack_webhook_url is present but empty");
        }
        if self.time_of_day.utc_offset_hours.is_some() && self.time_of_day_offset().is_none() {
            return invalid("time_of_day.utc_offset_hours must be within -23..=23");
        }
        self.thresholds.validate().map_err(MonitorError::InvalidConfig)
    }

    pub fn time_of_day_offset(&self) -> Option<FixedOffset> {
        self.time_of_day
            .utc_offset_hours
            .and_then(|h| FixedOffset::east_opt(h.checked_mul(3600)?))
    }

    /// Batch analyzer configured with these thresholds and time-of-day capability.
    pub fn metrics(&self) -> VolatilityMetrics {
        let metrics = VolatilityMetrics::new(self.thresholds);
        match self.time_of_day_offset() {
            Some(offset) => metrics.with_time_of_day(offset),
            None => metrics,
        }
    }

    pub fn build_scorer(&self) -> EnsembleScorer {
        EnsembleScorer::new(self.scorer.method)
            .with_member(Box::new(LexiconScorer::default()), self.scorer.weights.lexicon)
            .with_member(Box::new(PolarityScorer::default()), self.scorer.weights.polarity)
    }
}
