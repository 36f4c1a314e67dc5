use crate::engine::SharedEngine;
use rumqttc::{AsyncClient, QoS};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::task;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct WatchdogHealth {
    pub uptime_seconds: u64,
    pub telemetry_messages: u64,
    pub shutdowns_triggered: u64,
    /// Seconds since the last active classification; None before the first
    /// telemetry arrival.
    pub idle_seconds: Option<i64>,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<parking_lot::Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(parking_lot::Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, engine: &SharedEngine) -> WatchdogHealth {
        let now = OffsetDateTime::now_utc();
        let eng = engine.lock();
        WatchdogHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            telemetry_messages: eng.telemetry_count(),
            shutdowns_triggered: eng.shutdowns_triggered(),
            idle_seconds: eng.idle_for(now).map(|d| d.whole_seconds()),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }

    /// Publishes watchdog health on its topic every 30s.
    pub fn spawn_health_publisher(&self, client: AsyncClient, engine: SharedEngine) {
        let tracker = self.clone();

        task::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let health = tracker.get_health(&engine);
                match serde_json::to_string(&health) {
                    Ok(payload) => {
                        if let Err(e) = client
                            .publish("printwatch/health@v1", QoS::AtLeastOnce, false, payload)
                            .await
                        {
                            warn!(error = ?e, "failed to publish health");
                        } else {
                            debug!(
                                uptime = health.uptime_seconds,
                                messages = health.telemetry_messages,
                                "published watchdog health"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize health"),
                }
            }
        });
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
