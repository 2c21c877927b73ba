// src/lib.rs

pub mod common;
pub mod config;
pub mod error;
pub mod indicators;
pub mod metrics;
pub mod models;
pub mod notifier;
pub mod sentiment;
pub mod source;
pub mod stats;
pub mod telemetry;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::indicators::tracker::GroupTrackers;
use crate::metrics::{CrisisRisk, MetricsRecord, split_by_group};
use crate::models::{SentimentSample, sort_by_time};
use crate::sentiment::{SentimentScorer, score_items};
use crate::source::{ALL_GROUPS, ItemSource};
use crate::stats::{VolatilityStats, summary_line};
use crate::telemetry::{TelemetryPacket, TelemetryServer};

use chrono::{DateTime, Local, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// State carried across polling cycles.
pub struct MonitorState {
    trackers: GroupTrackers,
    /// Newest timestamp already fed to each group's tracker.
    high_water: HashMap<String, DateTime<Utc>>,
    last_alert: HashMap<String, Instant>,
    pub stats: VolatilityStats,
    /// Most recent batch record per group.
    pub latest: BTreeMap<String, MetricsRecord>,
}

impl MonitorState {
    pub fn new(cfg: &MonitorConfig) -> Result<Self> {
        Ok(Self {
            trackers: GroupTrackers::new(cfg.tracker.window_size)?,
            high_water: HashMap::new(),
            last_alert: HashMap::new(),
            stats: VolatilityStats::new(cfg.histogram.step, cfg.histogram.buckets),
            latest: BTreeMap::new(),
        })
    }

    pub fn trackers(&self) -> &GroupTrackers {
        &self.trackers
    }

    /// Histogram report for the elapsed interval; the histogram starts over afterwards.
    pub fn take_report(&mut self, cfg: &MonitorConfig) -> String {
        let report = self.stats.generate_report(cfg.report_interval_secs / 60, &self.latest);
        self.stats = VolatilityStats::new(cfg.histogram.step, cfg.histogram.buckets);
        report
    }

    /// True when `key` has not alerted within the cooldown; records the alert if so.
    fn alert_due(&mut self, key: &str, cooldown_secs: u64) -> bool {
        let now = Instant::now();
        let due = match self.last_alert.get(key) {
            None => true,
            Some(last) => now.duration_since(*last).as_secs() >= cooldown_secs,
        };
        if due {
            self.last_alert.insert(key.to_string(), now);
        }
        due
    }
}

/// One polling pass: fetch and score every configured group, stream new samples
/// through the per-group trackers, then analyze each group's batch.
///
/// Returns the number of scored samples. A group whose fetch fails is skipped.
pub async fn run_cycle(
    source: &dyn ItemSource,
    scorer: Arc<dyn SentimentScorer>,
    cfg: &MonitorConfig,
    state: &mut MonitorState,
    telemetry: &TelemetryServer,
) -> Result<usize> {
    let mut batches: BTreeMap<String, Vec<SentimentSample>> = BTreeMap::new();

    for group in &cfg.source.groups {
        let items = match source.fetch_items(group, cfg.source.limit).await {
            Ok(items) => items,
            Err(e) => {
                warn!("⚠️ Could not fetch {} items for `{}`: {}", source.name(), group, e);
                continue;
            }
        };

        let samples = score_items(&items, scorer.as_ref());
        if group == ALL_GROUPS {
            batches.extend(split_by_group(&samples));
        } else {
            batches.insert(group.clone(), samples);
        }
    }

    let mut processed = 0;
    for (group, samples) in batches.iter_mut() {
        sort_by_time(samples);
        processed += samples.len();
        stream_new_samples(group, samples, cfg, state, telemetry)?;
    }

    let metrics = cfg.metrics();
    let mut tasks = JoinSet::new();
    for (group, samples) in batches {
        tasks.spawn_blocking(move || {
            let record = metrics.compute(&samples);
            (group, record)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (group, record) = match joined {
            Ok(result) => result,
            Err(e) => {
                error!("❌ Metrics task failed: {}", e);
                continue;
            }
        };

        info!("{}", summary_line(&group, &record));

        if record.crisis_risk == CrisisRisk::High {
            warn!("🚨 High crisis risk in `{}` (score {})", group, record.crisis_risk_score);
            if let Some(url) = &cfg.slack_webhook_url {
                if state.alert_due(&format!("crisis:{}", group), cfg.cooldown_secs) {
                    notifier::send_crisis_alert(url.clone(), &group, &record);
                }
            }
        }

        telemetry.send(TelemetryPacket::Metrics {
            group: group.clone(),
            timestamp: Utc::now().timestamp(),
            record: Box::new(record.clone()),
        });
        state.latest.insert(group, record);
    }

    Ok(processed)
}

/// Feeds samples newer than the group's high-water mark into its tracker.
/// `samples` must already be sorted by time.
fn stream_new_samples(
    group: &str,
    samples: &[SentimentSample],
    cfg: &MonitorConfig,
    state: &mut MonitorState,
    telemetry: &TelemetryServer,
) -> Result<()> {
    let mark = state.high_water.get(group).copied();
    let fresh = samples.iter().filter(|s| mark.is_none_or(|m| s.timestamp > m));

    let mut fed = 0;
    for sample in fresh {
        let vol = state.trackers.update(group, sample.score)?;
        fed += 1;

        let warm = state.trackers.get(group).is_some_and(|t| t.is_warm());
        if warm {
            state.stats.record(vol);
        }

        telemetry.send(TelemetryPacket::Sample {
            group: group.to_string(),
            timestamp: sample.timestamp.timestamp(),
            score: sample.score,
            volatility: vol,
        });

        if warm && vol >= cfg.tracker.alert_threshold && state.alert_due(group, cfg.cooldown_secs) {
            let time_str = sample
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string();
            warn!("🌪️ Volatility alert for `{}`: {:.3} at {}", group, vol, time_str);
            if let Some(url) = &cfg.slack_webhook_url {
                notifier::send_volatility_alert(url.clone(), group, vol, cfg.tracker.alert_threshold, &time_str);
            }
        }
    }

    if let Some(last) = samples.last() {
        let newest = mark.map_or(last.timestamp, |m| m.max(last.timestamp));
        state.high_water.insert(group.to_string(), newest);
    }
    debug!(group, fed, "streamed new samples");
    Ok(())
}
