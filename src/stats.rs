use std::collections::BTreeMap;

use crate::metrics::MetricsRecord;

/// Histogram of rolling volatility values over one reporting interval.
pub struct VolatilityStats {
    pub buckets: Vec<usize>,
    pub count: u32,
    pub step: f64,
}

impl VolatilityStats {
    pub fn new(step: f64, bucket_count: usize) -> Self {
        Self {
            buckets: vec![0; bucket_count.max(1)],
            count: 0,
            step,
        }
    }

    /// Records a new volatility sample into the appropriate bucket.
    pub fn record(&mut self, vol: f64) {
        if !vol.is_finite() || vol < 0.0 {
            return;
        }
        self.count += 1;
        let max_idx = self.buckets.len() - 1;

        // Values past the last bucket are clamped into it.
        let index = ((vol / self.step) as usize).min(max_idx);
        self.buckets[index] += 1;
    }

    /// Histogram plus one summary line per group. Empty buckets are skipped.
    pub fn generate_report(&self, interval_minutes: u64, groups: &BTreeMap<String, MetricsRecord>) -> String {
        let total_buckets = self.buckets.len();
        let active_buckets = self.buckets.iter().filter(|&&c| c > 0).count();

        let mut report = format!(
            "📊 *Emotional Volatility Distribution ({} min)*\nStep: `{:.2}` | Total Samples: `{}`\n```\n",
            interval_minutes, self.step, self.count
        );

        for (i, &count) in self.buckets.iter().enumerate() {
            if count == 0 {
                continue;
            }

            let lower = i as f64 * self.step;
            let upper = (i + 1) as f64 * self.step;

            // 0-20%: calm, 20-60%: unsettled, 60-90%: volatile, >90%: extreme
            let progress = i as f64 / total_buckets as f64;
            let icon = if progress < 0.2 { "🔵" }
            else if progress < 0.6 { "🟡" }
            else if progress < 0.9 { "🔴" }
            else { "🔥" };

            let label = if i < (total_buckets - 1) {
                format!("{:.2}-{:.2}", lower, upper)
            } else {
                format!("{:.2}+", lower)
            };

            let percentage = if self.count > 0 { (count as f64 / self.count as f64) * 100.0 } else { 0.0 };
            let bar = "█".repeat(percentage.round() as usize);

            report.push_str(&format!("{} {:<11}: {:<4} ({:.1}%)\n", icon, label, bar, percentage));
        }

        if active_buckets == 0 {
            report.push_str("   (No volatility data recorded in this interval)\n");
        } else if total_buckets > active_buckets {
            report.push_str("\n----------------------------------\n");
            report.push_str(&format!("ℹ️ {} empty buckets hidden\n", total_buckets - active_buckets));
        }
        report.push_str("```");

        if !groups.is_empty() {
            report.push_str("\n*Latest batch per group*\n");
            for (group, record) in groups {
                report.push_str(&summary_line(group, record));
                report.push('\n');
            }
        }

        report
    }
}

/// One line summarizing a group's metrics, rounded for display.
pub fn summary_line(group: &str, record: &MetricsRecord) -> String {
    if record.is_empty() {
        return format!("• `{}`: no data", group);
    }
    format!(
        "• `{}`: {} posts | vol `{:.3}` | swings `{}` | stability `{:.1}%` | trend {} | risk *{}*",
        group,
        record.posts_analyzed,
        record.volatility_score,
        record.emotional_swings,
        record.stability_ratio * 100.0,
        record.trend_direction,
        record.crisis_risk
    )
}
