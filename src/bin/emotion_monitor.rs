use std::sync::Arc;

use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

use emotion_volatility::config::MonitorConfig;
use emotion_volatility::notifier;
use emotion_volatility::sentiment::SentimentScorer;
use emotion_volatility::source;
use emotion_volatility::telemetry::TelemetryServer;
use emotion_volatility::{run_cycle, MonitorState};

/// Log timestamps in the local timezone instead of UTC.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f"))
    }
}

#[tokio::main]
async fn main() {
    // RUST_LOG controls the level, "info" when unset.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_timer(LocalTimer)
        .init();

    // Optional first argument overrides ./config.yaml. Bad config exits immediately.
    let loaded = match std::env::args().nth(1) {
        Some(path) => MonitorConfig::load_from(path),
        None => MonitorConfig::load(),
    };
    let cfg = match loaded {
        Ok(c) => c,
        Err(e) => {
            error!("❌ Critical Error: Failed to load configuration: {}", e);
            return;
        }
    };

    let mut state = match MonitorState::new(&cfg) {
        Ok(s) => s,
        Err(e) => {
            error!("❌ Critical Error: Invalid tracker settings: {}", e);
            return;
        }
    };

    let scorer: Arc<dyn SentimentScorer> = Arc::new(cfg.build_scorer());
    let source = source::from_config(&cfg.source);
    let telemetry = TelemetryServer::new(cfg.telemetry.enabled, cfg.telemetry.port);

    info!(
        "🚀 Starting Emotion Volatility Monitor ({} source, {} groups, scorer: {})...",
        source.name(),
        cfg.source.groups.len(),
        scorer.name()
    );

    let mut last_report = Instant::now();
    loop {
        match run_cycle(source.as_ref(), scorer.clone(), &cfg, &mut state, &telemetry).await {
            Ok(count) => info!("✅ Cycle complete: {} items scored.", count),
            Err(e) => error!("⚠️ Cycle failed: {}", e),
        }

        if last_report.elapsed().as_secs() >= cfg.report_interval_secs {
            let report = state.take_report(&cfg);
            match &cfg.slack_webhook_url {
                Some(url) => notifier::send_report(url.clone(), report),
                None => info!("\n{}", report),
            }
            last_report = Instant::now();
        }

        sleep(Duration::from_secs(cfg.poll_interval_secs)).await;
    }
}
