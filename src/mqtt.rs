//! MQTT transport adapter
//!
//! Subscribes to the printer status topic and feeds decoded partial reports
//! into the engine, one arrival at a time. Undecodable payloads are logged
//! and skipped; broker errors back off and retry. The single event loop also
//! drives outbound publishes (notifications, health).

use crate::config::WatchdogConfig;
use crate::engine::SharedEngine;
use crate::health::HealthTracker;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task;
use tracing::{error, warn};

pub fn create_mqtt_client(cfg: &WatchdogConfig) -> (AsyncClient, EventLoop) {
    let client_id = format!("printwatch-{}", std::process::id());
    let mut opts = MqttOptions::new(client_id, &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(15));
    AsyncClient::new(opts, 10)
}

pub fn spawn_telemetry_listener(
    engine: SharedEngine,
    client: AsyncClient,
    mut eventloop: EventLoop,
    status_topic: String,
    health: HealthTracker,
) {
    task::spawn(async move {
        if let Err(e) = client.subscribe(&status_topic, QoS::AtLeastOnce).await {
            error!(topic = %status_topic, error = ?e, "MQTT subscribe failed");
            return;
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == status_topic => {
                    match serde_json::from_slice(&p.payload) {
                        Ok(status) => engine.lock().on_telemetry(&status),
                        Err(e) => warn!(error = %e, "undecodable status payload, skipping"),
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => health.mark_mqtt_connected(),
                Ok(_) => {}
                Err(e) => {
                    error!(error = ?e, "MQTT connection error");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}
