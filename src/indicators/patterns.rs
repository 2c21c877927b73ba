//! Shared statistics over ordered sentiment scores.
//!
//! Every function here is total: empty or short inputs return zero values
//! instead of failing.

use serde::Serialize;

/// A maximal run of consecutive samples whose adjacent differences stay within
/// the stability threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityPeriod {
    pub start_index: usize,
    pub end_index: usize,
    pub duration: usize,
    pub avg_sentiment: f64,
}

/// A window of consecutive samples that is both strongly negative on average and
/// internally volatile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrisisWindow {
    pub position: usize,
    pub mean: f64,
    pub std: f64,
    pub severity: f64,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by N).
///
/// Deviations are taken relative to the first value before averaging, so a
/// constant series yields exactly 0.
pub fn population_std<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let mut probe = iter.clone();
    let Some(pivot) = probe.next() else {
        return 0.0;
    };

    let (n, shifted_sum) = iter
        .clone()
        .fold((0usize, 0.0), |(n, sum), v| (n + 1, sum + (v - pivot)));
    let shifted_mean = shifted_sum / n as f64;

    let variance = iter
        .map(|v| ((v - pivot) - shifted_mean).powi(2))
        .sum::<f64>()
        / n as f64;

    variance.sqrt()
}

/// Counts adjacent pairs whose absolute difference exceeds `threshold`.
pub fn count_swings(scores: &[f64], threshold: f64) -> usize {
    scores
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() > threshold)
        .count()
}

/// Scans adjacent differences and closes a run whenever one exceeds `threshold`.
/// Runs shorter than `min_len` are discarded, including the trailing one.
pub fn stability_periods(scores: &[f64], threshold: f64, min_len: usize) -> Vec<StabilityPeriod> {
    let mut periods = Vec::new();
    if scores.len() < min_len {
        return periods;
    }

    let mut start = 0;
    for i in 1..scores.len() {
        if (scores[i] - scores[i - 1]).abs() > threshold {
            if let Some(period) = close_period(scores, start, i, min_len) {
                periods.push(period);
            }
            start = i;
        }
    }

    if let Some(period) = close_period(scores, start, scores.len(), min_len) {
        periods.push(period);
    }

    periods
}

fn close_period(scores: &[f64], start: usize, end: usize, min_len: usize) -> Option<StabilityPeriod> {
    let duration = end - start;
    if duration < min_len {
        return None;
    }
    Some(StabilityPeriod {
        start_index: start,
        end_index: end - 1,
        duration,
        avg_sentiment: mean(&scores[start..end]),
    })
}

/// Length of the longest run of consecutive scores strictly below `threshold`.
pub fn longest_run_below(scores: &[f64], threshold: f64) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for &s in scores {
        if s < threshold {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Returns `(above, below)`: scores greater than `threshold` and scores less than `-threshold`.
pub fn count_extremes(scores: &[f64], threshold: f64) -> (usize, usize) {
    scores.iter().fold((0, 0), |(pos, neg), &s| {
        if s > threshold {
            (pos + 1, neg)
        } else if s < -threshold {
            (pos, neg + 1)
        } else {
            (pos, neg)
        }
    })
}

/// Every full window of `size` samples with mean below `max_mean` and
/// population std above `min_std`.
pub fn crisis_windows(scores: &[f64], size: usize, max_mean: f64, min_std: f64) -> Vec<CrisisWindow> {
    if size == 0 {
        return Vec::new();
    }
    scores
        .windows(size)
        .enumerate()
        .filter_map(|(position, window)| {
            let m = mean(window);
            let std = population_std(window.iter().copied());
            (m < max_mean && std > min_std).then(|| CrisisWindow {
                position,
                mean: m,
                std,
                severity: m.abs() * std,
            })
        })
        .collect()
}
