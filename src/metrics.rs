//! Batch volatility analysis over a complete, time-ordered sequence of samples.
//!
//! `VolatilityMetrics::compute` is a pure transform: it only reads its input and
//! returns a fresh `MetricsRecord`, so independent batches can be computed on
//! separate threads.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::indicators::patterns::{
    self, CrisisWindow, StabilityPeriod, count_extremes, count_swings, crisis_windows,
    longest_run_below, population_std, stability_periods,
};
use crate::indicators::trend::{Significance, TrendDirection, TrendFitter};
use crate::models::{SentimentSample, is_time_ordered, sort_by_time};

/// Group key for samples that carry no group id.
pub const UNGROUPED: &str = "ungrouped";

/// Tunable constants of the analysis. Defaults are the reference threshold set.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub swing: f64,
    pub stability: f64,
    pub min_stable_run: usize,
    pub trend_slope: f64,
    pub significance_level: f64,
    /// Scores above `band` are positive, below `-band` negative.
    pub band: f64,
    pub extreme: f64,
    pub crisis_volatility: f64,
    pub recent_window: usize,
    pub recent_min_samples: usize,
    pub recent_mean: f64,
    pub extreme_negative: f64,
    pub extreme_negative_fraction: f64,
    pub negative_streak_limit: usize,
    pub crisis_window_size: usize,
    pub crisis_window_mean: f64,
    pub crisis_window_std: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            swing: 0.3,
            stability: 0.15,
            min_stable_run: 3,
            trend_slope: 0.01,
            significance_level: 0.05,
            band: 0.1,
            extreme: 0.8,
            crisis_volatility: 0.5,
            recent_window: 10,
            recent_min_samples: 3,
            recent_mean: -0.3,
            extreme_negative: -0.7,
            extreme_negative_fraction: 0.2,
            negative_streak_limit: 5,
            crisis_window_size: 5,
            crisis_window_mean: -0.4,
            crisis_window_std: 0.6,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), String> {
        let floats = [
            ("swing", self.swing),
            ("stability", self.stability),
            ("trend_slope", self.trend_slope),
            ("significance_level", self.significance_level),
            ("band", self.band),
            ("extreme", self.extreme),
            ("crisis_volatility", self.crisis_volatility),
            ("recent_mean", self.recent_mean),
            ("extreme_negative", self.extreme_negative),
            ("extreme_negative_fraction", self.extreme_negative_fraction),
            ("crisis_window_mean", self.crisis_window_mean),
            ("crisis_window_std", self.crisis_window_std),
        ];
        if let Some((name, _)) = floats.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("threshold `{}` must be finite", name));
        }
        if self.band < 0.0 {
            return Err("threshold `band` must not be negative".into());
        }
        if self.recent_window == 0 {
            return Err("threshold `recent_window` must be at least 1".into());
        }
        Ok(())
    }
}

/// Heuristic crisis rubric bucket. Not a statistical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CrisisRisk {
    Low,
    Medium,
    High,
}

impl CrisisRisk {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= 4 => CrisisRisk::High,
            s if s >= 2 => CrisisRisk::Medium,
            _ => CrisisRisk::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrisisRisk::Low => "Low",
            CrisisRisk::Medium => "Medium",
            CrisisRisk::High => "High",
        }
    }
}

impl fmt::Display for CrisisRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean score per time-of-day bucket; 0 for an empty bucket.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TimeOfDayPattern {
    /// hours [6, 12)
    pub morning_avg: f64,
    /// hours [12, 18)
    pub afternoon_avg: f64,
    /// hours [18, 24)
    pub evening_avg: f64,
    /// hours [0, 6)
    pub night_avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAverage {
    pub date: NaiveDate,
    pub avg_sentiment: f64,
    pub count: usize,
}

/// Summary of one batch run. Full precision; rounding is left to presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub posts_analyzed: usize,

    pub mean_sentiment: f64,
    pub volatility_score: f64,
    pub sentiment_range: f64,
    pub overall_volatility_score: f64,

    pub emotional_swings: usize,
    pub swing_frequency: f64,

    pub stability_periods: Vec<StabilityPeriod>,
    pub stability_periods_count: usize,
    pub avg_stability_duration: f64,
    pub stability_ratio: f64,

    pub trend_direction: TrendDirection,
    pub trend_slope: f64,
    pub trend_p_value: f64,
    pub trend_significance: Significance,

    pub crisis_risk: CrisisRisk,
    pub crisis_risk_score: u8,
    pub crisis_windows: Vec<CrisisWindow>,
    pub negative_streak: usize,
    pub extreme_events: usize,
    pub extreme_positive: usize,
    pub extreme_negative: usize,

    pub time_span_days: i64,

    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub neutral_ratio: f64,

    /// `None` when the time-of-day capability is disabled or the batch is empty.
    pub time_of_day: Option<TimeOfDayPattern>,
}

impl MetricsRecord {
    /// The record for a batch with nothing to analyze.
    pub fn empty() -> Self {
        Self {
            posts_analyzed: 0,
            mean_sentiment: 0.0,
            volatility_score: 0.0,
            sentiment_range: 0.0,
            overall_volatility_score: 0.0,
            emotional_swings: 0,
            swing_frequency: 0.0,
            stability_periods: Vec::new(),
            stability_periods_count: 0,
            avg_stability_duration: 0.0,
            stability_ratio: 0.0,
            trend_direction: TrendDirection::InsufficientData,
            trend_slope: 0.0,
            trend_p_value: 1.0,
            trend_significance: Significance::NotSignificant,
            crisis_risk: CrisisRisk::Low,
            crisis_risk_score: 0,
            crisis_windows: Vec::new(),
            negative_streak: 0,
            extreme_events: 0,
            extreme_positive: 0,
            extreme_negative: 0,
            time_span_days: 0,
            positive_ratio: 0.0,
            negative_ratio: 0.0,
            neutral_ratio: 0.0,
            time_of_day: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.posts_analyzed == 0
    }
}

/// Batch analyzer. Stateless between calls.
#[derive(Debug, Clone, Copy)]
pub struct VolatilityMetrics {
    thresholds: Thresholds,
    time_of_day: Option<FixedOffset>,
}

impl Default for VolatilityMetrics {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl VolatilityMetrics {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            time_of_day: None,
        }
    }

    /// Enables the time-of-day section, bucketing hours in the given offset.
    pub fn with_time_of_day(mut self, offset: FixedOffset) -> Self {
        self.time_of_day = Some(offset);
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn compute(&self, samples: &[SentimentSample]) -> MetricsRecord {
        if samples.is_empty() {
            return MetricsRecord::empty();
        }
        if samples.iter().any(|s| !s.score.is_finite()) {
            warn!(count = samples.len(), "batch contains a non-finite score, returning empty record");
            return MetricsRecord::empty();
        }

        if is_time_ordered(samples) {
            self.compute_ordered(samples)
        } else {
            debug!(count = samples.len(), "input not sorted, sorting a copy");
            let mut sorted = samples.to_vec();
            sort_by_time(&mut sorted);
            self.compute_ordered(&sorted)
        }
    }

    fn compute_ordered(&self, samples: &[SentimentSample]) -> MetricsRecord {
        let th = &self.thresholds;
        let scores: Vec<f64> = samples.iter().map(|s| s.score).collect();
        let n = scores.len();
        let nf = n as f64;

        // --- Basic statistics ---
        let mean_sentiment = patterns::mean(&scores);
        let volatility_score = population_std(scores.iter().copied());
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let sentiment_range = max - min;

        // --- Swings ---
        let emotional_swings = count_swings(&scores, th.swing);
        let swing_frequency = emotional_swings as f64 / nf;

        // --- Stability ---
        let periods = stability_periods(&scores, th.stability, th.min_stable_run);
        let stable_total: usize = periods.iter().map(|p| p.duration).sum();
        let avg_stability_duration = if periods.is_empty() {
            0.0
        } else {
            stable_total as f64 / periods.len() as f64
        };
        let stability_ratio = stable_total as f64 / nf;

        // --- Trend ---
        let fitter = TrendFitter::new(3, th.trend_slope, th.significance_level);
        let fit = fitter.fit(&scores);
        let trend_direction = fitter.direction(fit.as_ref());
        let (trend_slope, trend_p_value) = fit.map_or((0.0, 1.0), |f| (f.slope, f.p_value));
        let trend_significance = fitter.significance(trend_p_value);

        // --- Risk ---
        let negative_streak = longest_run_below(&scores, -th.band);
        let (extreme_positive, extreme_negative) = count_extremes(&scores, th.extreme);
        let crisis_risk_score = self.crisis_score(&scores, volatility_score, negative_streak);
        let crisis_windows = crisis_windows(
            &scores,
            th.crisis_window_size,
            th.crisis_window_mean,
            th.crisis_window_std,
        );

        // --- Distribution ---
        let positive = scores.iter().filter(|&&s| s > th.band).count();
        let negative = scores.iter().filter(|&&s| s < -th.band).count();
        let neutral = n - positive - negative;

        let time_span_days = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_days(),
            _ => 0,
        };

        let overall_volatility_score = (volatility_score / 2.0).min(1.0) * 0.4
            + (emotional_swings as f64 / 10.0).min(1.0) * 0.3
            + (sentiment_range / 2.0).min(1.0) * 0.3;

        MetricsRecord {
            posts_analyzed: n,
            mean_sentiment,
            volatility_score,
            sentiment_range,
            overall_volatility_score,
            emotional_swings,
            swing_frequency,
            stability_periods_count: periods.len(),
            stability_periods: periods,
            avg_stability_duration,
            stability_ratio,
            trend_direction,
            trend_slope,
            trend_p_value,
            trend_significance,
            crisis_risk: CrisisRisk::from_score(crisis_risk_score),
            crisis_risk_score,
            crisis_windows,
            negative_streak,
            extreme_events: extreme_positive + extreme_negative,
            extreme_positive,
            extreme_negative,
            time_span_days,
            positive_ratio: positive as f64 / nf,
            negative_ratio: negative as f64 / nf,
            neutral_ratio: neutral as f64 / nf,
            time_of_day: self.time_of_day.map(|offset| time_of_day_pattern(samples, offset)),
        }
    }

    /// Additive rubric: +2 high volatility, +2 negative recent tail,
    /// +1 too many extremely negative samples, +1 long negative streak.
    fn crisis_score(&self, scores: &[f64], std: f64, negative_streak: usize) -> u8 {
        let th = &self.thresholds;
        let mut score = 0;

        if std > th.crisis_volatility {
            score += 2;
        }

        let tail = &scores[scores.len().saturating_sub(th.recent_window)..];
        if tail.len() > th.recent_min_samples && patterns::mean(tail) < th.recent_mean {
            score += 2;
        }

        let very_negative = scores.iter().filter(|&&s| s < th.extreme_negative).count();
        if very_negative as f64 > scores.len() as f64 * th.extreme_negative_fraction {
            score += 1;
        }

        if negative_streak > th.negative_streak_limit {
            score += 1;
        }

        score
    }

    /// One record per group id; samples without a group go under [`UNGROUPED`].
    pub fn compute_by_group(&self, samples: &[SentimentSample]) -> BTreeMap<String, MetricsRecord> {
        split_by_group(samples)
            .into_iter()
            .map(|(group, batch)| {
                let record = self.compute(&batch);
                (group, record)
            })
            .collect()
    }
}

/// Partitions samples by group id, keeping each group's arrival order.
pub fn split_by_group(samples: &[SentimentSample]) -> BTreeMap<String, Vec<SentimentSample>> {
    let mut groups: BTreeMap<String, Vec<SentimentSample>> = BTreeMap::new();
    for sample in samples {
        let key = sample.group_id.as_deref().unwrap_or(UNGROUPED).to_string();
        groups.entry(key).or_default().push(sample.clone());
    }
    groups
}

fn time_of_day_pattern(samples: &[SentimentSample], offset: FixedOffset) -> TimeOfDayPattern {
    // morning, afternoon, evening, night
    let mut sums = [0.0; 4];
    let mut counts = [0usize; 4];

    for s in samples {
        let hour = s.timestamp.with_timezone(&offset).hour();
        let bucket = match hour {
            6..=11 => 0,
            12..=17 => 1,
            18..=23 => 2,
            _ => 3,
        };
        sums[bucket] += s.score;
        counts[bucket] += 1;
    }

    let avg = |i: usize| if counts[i] == 0 { 0.0 } else { sums[i] / counts[i] as f64 };
    TimeOfDayPattern {
        morning_avg: avg(0),
        afternoon_avg: avg(1),
        evening_avg: avg(2),
        night_avg: avg(3),
    }
}

/// Mean score per UTC calendar day, ordered by date.
pub fn daily_averages(samples: &[SentimentSample]) -> Vec<DailyAverage> {
    let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for s in samples.iter().filter(|s| s.score.is_finite()) {
        let entry = days.entry(s.timestamp.date_naive()).or_insert((0.0, 0));
        entry.0 += s.score;
        entry.1 += 1;
    }
    days.into_iter()
        .map(|(date, (sum, count))| DailyAverage {
            date,
            avg_sentiment: sum / count as f64,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    /// One sample per hour starting at midnight UTC.
    fn hourly(scores: &[f64]) -> Vec<SentimentSample> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| SentimentSample::new(base() + Duration::hours(i as i64), s))
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_record() {
        let record = VolatilityMetrics::default().compute(&[]);
        assert_eq!(record.posts_analyzed, 0);
        assert!(record.is_empty());
        assert_eq!(record.trend_direction, TrendDirection::InsufficientData);
        assert_eq!(record.crisis_risk, CrisisRisk::Low);
    }

    #[test]
    fn non_finite_score_yields_empty_record() {
        let record = VolatilityMetrics::default().compute(&hourly(&[0.1, f64::NAN, 0.2]));
        assert!(record.is_empty());
    }

    #[test]
    fn single_sample_uses_insufficient_data_defaults() {
        let record = VolatilityMetrics::default().compute(&hourly(&[0.4]));
        assert_eq!(record.posts_analyzed, 1);
        assert_eq!(record.volatility_score, 0.0);
        assert_eq!(record.trend_direction, TrendDirection::InsufficientData);
        assert_eq!(record.trend_slope, 0.0);
        assert_eq!(record.trend_p_value, 1.0);
        assert_eq!(record.stability_periods_count, 0);
        assert_eq!(record.avg_stability_duration, 0.0);
        assert_eq!(record.positive_ratio, 1.0);
    }

    #[test]
    fn swing_count_and_frequency() {
        let record = VolatilityMetrics::default().compute(&hourly(&[0.0, 0.5, 0.5, -0.5]));
        assert_eq!(record.emotional_swings, 2);
        assert_eq!(record.swing_frequency, 0.5);
    }

    #[test]
    fn stability_boundary_keeps_only_leading_run() {
        let record = VolatilityMetrics::default().compute(&hourly(&[0.0, 0.05, 0.0, 0.9]));
        assert_eq!(record.stability_periods_count, 1);
        let period = &record.stability_periods[0];
        assert_eq!(period.duration, 3);
        assert!((period.avg_sentiment - 0.0167).abs() < 1e-3);
        assert_eq!(record.stability_ratio, 0.75);
        assert_eq!(record.avg_stability_duration, 3.0);
    }

    // The crisis level is a heuristic rubric (additive points, bucketed), not a
    // statistical model; these cases pin the rubric's arithmetic.
    #[test]
    fn crisis_rubric_flat_extreme_negative_is_high() {
        let record = VolatilityMetrics::default().compute(&hourly(&[-0.8; 15]));
        assert_eq!(record.volatility_score, 0.0);
        assert_eq!(record.negative_streak, 15);
        assert_eq!(record.crisis_risk_score, 4);
        assert_eq!(record.crisis_risk, CrisisRisk::High);
    }

    #[test]
    fn crisis_rubric_volatility_alone_is_medium() {
        let scores: Vec<f64> = (0..12).map(|i| if i % 2 == 0 { 0.6 } else { -0.6 }).collect();
        let record = VolatilityMetrics::default().compute(&hourly(&scores));
        assert!(record.volatility_score > 0.5);
        assert_eq!(record.crisis_risk_score, 2);
        assert_eq!(record.crisis_risk, CrisisRisk::Medium);
    }

    #[test]
    fn crisis_rubric_short_tail_does_not_count() {
        // tail of 3 samples is not more than the 3-sample minimum
        let record = VolatilityMetrics::default().compute(&hourly(&[-0.5, -0.5, -0.5]));
        assert_eq!(record.crisis_risk_score, 0);
        assert_eq!(record.crisis_risk, CrisisRisk::Low);
    }

    #[test]
    fn crisis_bucket_edges() {
        assert_eq!(CrisisRisk::from_score(0), CrisisRisk::Low);
        assert_eq!(CrisisRisk::from_score(1), CrisisRisk::Low);
        assert_eq!(CrisisRisk::from_score(2), CrisisRisk::Medium);
        assert_eq!(CrisisRisk::from_score(3), CrisisRisk::Medium);
        assert_eq!(CrisisRisk::from_score(6), CrisisRisk::High);
    }

    #[test]
    fn rising_scores_are_improving_and_significant() {
        let scores: Vec<f64> = (0..10).map(|i| -0.2 + i as f64 * 0.05).collect();
        let record = VolatilityMetrics::default().compute(&hourly(&scores));
        assert_eq!(record.trend_direction, TrendDirection::Improving);
        assert_eq!(record.trend_significance, Significance::Significant);
        assert!(record.trend_p_value < 0.001);
    }

    #[test]
    fn extremes_and_distribution() {
        let record = VolatilityMetrics::default()
            .compute(&hourly(&[0.9, 0.85, -0.95, 0.0, 0.1, -0.1, -0.5, 0.3]));
        assert_eq!(record.extreme_positive, 2);
        assert_eq!(record.extreme_negative, 1);
        assert_eq!(record.extreme_events, 3);
        assert_eq!(record.positive_ratio, 3.0 / 8.0);
        assert_eq!(record.negative_ratio, 2.0 / 8.0);
        assert_eq!(record.neutral_ratio, 3.0 / 8.0);
    }

    #[test]
    fn time_span_is_floored_to_whole_days() {
        let samples = vec![
            SentimentSample::new(base(), 0.0),
            SentimentSample::new(base() + Duration::hours(47), 0.0),
        ];
        assert_eq!(VolatilityMetrics::default().compute(&samples).time_span_days, 1);
    }

    #[test]
    fn unsorted_input_gives_same_record_as_sorted() {
        let sorted = hourly(&[0.1, -0.4, 0.6, 0.2, -0.1]);
        let mut shuffled = sorted.clone();
        shuffled.reverse();
        let metrics = VolatilityMetrics::default();
        assert_eq!(metrics.compute(&sorted), metrics.compute(&shuffled));
    }

    #[test]
    fn time_of_day_is_opt_in() {
        let samples = hourly(&[0.0; 24]);
        assert!(VolatilityMetrics::default().compute(&samples).time_of_day.is_none());
    }

    #[test]
    fn time_of_day_buckets_by_hour() {
        // hour h gets score h/100
        let scores: Vec<f64> = (0..24).map(|h| h as f64 / 100.0).collect();
        let metrics = VolatilityMetrics::default().with_time_of_day(FixedOffset::east_opt(0).unwrap());
        let pattern = metrics.compute(&hourly(&scores)).time_of_day.unwrap();
        assert!((pattern.night_avg - 0.025).abs() < 1e-12);
        assert!((pattern.morning_avg - 0.085).abs() < 1e-12);
        assert!((pattern.afternoon_avg - 0.145).abs() < 1e-12);
        assert!((pattern.evening_avg - 0.205).abs() < 1e-12);
    }

    #[test]
    fn time_of_day_empty_bucket_is_zero_and_offset_applies() {
        // 02:00 UTC is 08:00 at +06:00
        let samples = vec![SentimentSample::new(base() + Duration::hours(2), 0.6)];
        let offset = FixedOffset::east_opt(6 * 3600).unwrap();
        let pattern = VolatilityMetrics::default()
            .with_time_of_day(offset)
            .compute(&samples)
            .time_of_day
            .unwrap();
        assert_eq!(pattern.morning_avg, 0.6);
        assert_eq!(pattern.night_avg, 0.0);
        assert_eq!(pattern.afternoon_avg, 0.0);
    }

    #[test]
    fn overall_score_is_capped_weighted_blend() {
        let scores: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let record = VolatilityMetrics::default().compute(&hourly(&scores));
        // std 1 -> 0.5, swings 29 -> capped 1, range 2 -> 1
        assert!((record.overall_volatility_score - (0.2 + 0.3 + 0.3)).abs() < 1e-12);
    }

    #[test]
    fn crisis_windows_are_reported() {
        let record = VolatilityMetrics::default().compute(&hourly(&[-1.0, 0.5, -1.0, 0.3, -1.0, 0.0]));
        assert_eq!(record.crisis_windows.len(), 1);
        assert_eq!(record.crisis_windows[0].position, 0);
    }

    #[test]
    fn groups_are_analyzed_separately() {
        let mut samples = hourly(&[0.5, 0.5, 0.5, -0.9, -0.9]);
        for s in samples.iter_mut().take(3) {
            s.group_id = Some("happy".into());
        }
        samples[3].group_id = Some("sad".into());

        let by_group = VolatilityMetrics::default().compute_by_group(&samples);
        assert_eq!(by_group.len(), 3);
        assert_eq!(by_group["happy"].posts_analyzed, 3);
        assert_eq!(by_group["sad"].posts_analyzed, 1);
        assert_eq!(by_group[UNGROUPED].posts_analyzed, 1);
    }

    #[test]
    fn daily_averages_group_by_calendar_day() {
        let samples = hourly(&[0.2; 30]);
        let days = daily_averages(&samples);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].count, 24);
        assert_eq!(days[1].count, 6);
        assert!((days[1].avg_sentiment - 0.2).abs() < 1e-12);
    }

    #[test]
    fn default_thresholds_validate() {
        assert!(Thresholds::default().validate().is_ok());
        let bad = Thresholds {
            swing: f64::NAN,
            ..Thresholds::default()
        };
        assert!(bad.validate().is_err());
    }
}
