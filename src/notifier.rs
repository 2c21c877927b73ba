use serde_json::json;
use tracing::{error, info};

use crate::indicators::trend::TrendDirection;
use crate::metrics::MetricsRecord;

/// Message for a group whose rolling volatility crossed the alert threshold.
pub fn format_volatility_alert(group: &str, volatility: f64, threshold: f64, time_str: &str) -> String {
    format!(
        "🌪️ *Emotional Volatility Alert* 🌪️\n\
        > *Group*: `{}`\n\
        > *Rolling Volatility*: *{:.3}* (Threshold: {:.2})\n\
        > *Time*: `{}`",
        group, volatility, threshold, time_str
    )
}

/// Message for a batch whose crisis rubric landed in the High bucket.
pub fn format_crisis_alert(group: &str, record: &MetricsRecord) -> String {
    let trend_arrow = match record.trend_direction {
        TrendDirection::Improving => "📈",
        TrendDirection::Declining => "📉",
        _ => "➡️",
    };

    format!(
        "🚨 *Crisis Risk: {}* 🚨\n\
        > *Group*: `{}` ({} posts over {} days)\n\
        > --------------------------------\n\
        > *Mean Sentiment*: `{:.3}`  *Volatility*: `{:.3}`\n\
        > *Negative Streak*: `{}`  *Extreme Events*: `{}`\n\
        > *Trend*: {} {} (slope `{:.4}`, {})",
        record.crisis_risk,
        group, record.posts_analyzed, record.time_span_days,
        record.mean_sentiment, record.volatility_score,
        record.negative_streak, record.extreme_events,
        trend_arrow, record.trend_direction, record.trend_slope, record.trend_significance
    )
}

fn post(webhook_url: String, message: String, what: &'static str) {
    let client = reqwest::Client::new();
    tokio::spawn(async move {
        match client.post(webhook_url).json(&json!({"text": message})).send().await {
            Ok(_) => info!("🚀 {} delivered successfully.", what),
            Err(e) => error!("❌ Failed to send {}: {:?}", what, e),
        }
    });
}

pub fn send_volatility_alert(webhook_url: String, group: &str, volatility: f64, threshold: f64, time_str: &str) {
    post(webhook_url, format_volatility_alert(group, volatility, threshold, time_str), "volatility alert");
}

pub fn send_crisis_alert(webhook_url: String, group: &str, record: &MetricsRecord) {
    post(webhook_url, format_crisis_alert(group, record), "crisis alert");
}

pub fn send_report(webhook_url: String, report: String) {
    post(webhook_url, report, "report");
}
