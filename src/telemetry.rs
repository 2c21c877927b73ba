use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::accept_async;
use tungstenite::Message;
use tracing::{info, error, warn, debug};

use crate::metrics::MetricsRecord;

/// One JSON message for live dashboards.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "msg_type")]
pub enum TelemetryPacket {
    /// A scored item and the group's rolling volatility after it.
    #[serde(rename = "SAMPLE")]
    Sample {
        group: String,
        timestamp: i64,
        score: f64,
        volatility: f64,
    },
    /// A finished batch analysis for a group.
    #[serde(rename = "METRICS")]
    Metrics {
        group: String,
        timestamp: i64,
        record: Box<MetricsRecord>,
    },
}

pub struct TelemetryServer {
    tx: broadcast::Sender<String>,
    enabled: bool,
}

impl TelemetryServer {
    /// Starts listening on `127.0.0.1:port` when enabled. Must be called inside a tokio runtime.
    pub fn new(enabled: bool, port: u16) -> Self {
        // Slow consumers lag and drop packets; the sender never blocks.
        let (tx, _rx) = broadcast::channel(2000);

        if enabled {
            let tx_clone = tx.clone();

            tokio::spawn(async move {
                let addr = format!("127.0.0.1:{}", port);
                match TcpListener::bind(&addr).await {
                    Ok(listener) => {
                        info!("📡 [Telemetry] Server running on ws://{}", addr);

                        while let Ok((stream, _)) = listener.accept().await {
                            let tx_inner = tx_clone.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, tx_inner).await;
                            });
                        }
                    }
                    Err(e) => {
                        error!("❌ [Telemetry] Failed to bind port {}: {}", port, e);
                    }
                }
            });
        } else {
            info!("📡 [Telemetry] Disabled by config.");
        }

        Self { tx, enabled }
    }

    /// A server that drops every packet.
    pub fn disabled() -> Self {
        let (tx, _rx) = broadcast::channel(1);
        Self { tx, enabled: false }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn send(&self, packet: TelemetryPacket) {
        if !self.enabled {
            return;
        }

        // Serialize only when someone is listening.
        if self.tx.receiver_count() > 0 {
            match serde_json::to_string(&packet) {
                Ok(msg) => {
                    let _ = self.tx.send(msg);
                }
                Err(e) => debug!("telemetry packet not serializable: {}", e),
            }
        }
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, tx: broadcast::Sender<String>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut ws_sender, _ws_receiver) = ws_stream.split();
    let mut rx = tx.subscribe();

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("telemetry client lagging, skipped {} packets", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_packet_is_tagged() {
        let packet = TelemetryPacket::Sample {
            group: "depression".into(),
            timestamp: 1_700_000_000,
            score: -0.4,
            volatility: 0.25,
        };
        let json: serde_json::Value = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["msg_type"], "SAMPLE");
        assert_eq!(json["group"], "depression");
        assert_eq!(json["volatility"], 0.25);
    }

    #[test]
    fn metrics_packet_carries_record_fields() {
        let packet = TelemetryPacket::Metrics {
            group: "g".into(),
            timestamp: 0,
            record: Box::new(MetricsRecord::empty()),
        };
        let json: serde_json::Value = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["msg_type"], "METRICS");
        assert_eq!(json["record"]["posts_analyzed"], 0);
        assert_eq!(json["record"]["trend_direction"], "Insufficient Data");
    }

    #[tokio::test]
    async fn disabled_server_drops_packets() {
        let server = TelemetryServer::disabled();
        let mut rx = server.subscribe();
        server.send(TelemetryPacket::Sample {
            group: "g".into(),
            timestamp: 0,
            score: 0.0,
            volatility: 0.0,
        });
        assert!(rx.try_recv().is_err());
    }
}
