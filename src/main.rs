//! Printwatch - MQTT idle watchdog for a 3D printer
//!
//! Watches partial status reports pushed over MQTT, merges them into a
//! best-known printer state, and powers the printer off through a smart
//! plug once it has shown no activity for the idle threshold:
//! - Telemetry ingest and merge (`models`, `mqtt`)
//! - Idle/staleness decision engine, one instance per printer (`engine`)
//! - Power actuator and notification seams (`actuator`, `notify`)
//! - Health publishing + small REST API for inspection (`health`, `http`)

mod actuator;
mod config;
mod engine;
mod health;
mod http;
mod models;
mod mqtt;
mod notify;

use crate::actuator::ShellPowerSwitch;
use crate::engine::{EngineThresholds, WatchEngine};
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::notify::MqttNotifier;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // fine if .env is missing

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "printwatch=info".into()),
        )
        .init();

    let cfg = config::load_config().await;
    info!(
        device = %cfg.device_name,
        idle_threshold_secs = cfg.idle_threshold_secs,
        max_status_interval_secs = cfg.max_status_interval_secs,
        "printwatch starting"
    );

    // One MQTT client for everything: telemetry in, notifications and
    // health out. The listener task drives the shared event loop.
    let (mqtt_client, eventloop) = mqtt::create_mqtt_client(&cfg);

    let power = ShellPowerSwitch::new(cfg.power.command.clone(), cfg.power.timeout_secs);
    let notifier = MqttNotifier::new(mqtt_client.clone(), &cfg.mqtt.notify_topic);

    let thresholds = EngineThresholds {
        idle_threshold: cfg.idle_threshold(),
        max_status_interval: cfg.max_status_interval(),
        bed_threshold_temp: cfg.bed_threshold_temp,
        nozzle_high_temp: cfg.nozzle_high_temp,
    };
    let engine =
        WatchEngine::new(&cfg.device_name, thresholds, Box::new(power), Box::new(notifier))
            .shared();

    let health_tracker = HealthTracker::new();

    mqtt::spawn_telemetry_listener(
        engine.clone(),
        mqtt_client.clone(),
        eventloop,
        cfg.mqtt.status_topic.clone(),
        health_tracker.clone(),
    );
    health_tracker.spawn_health_publisher(mqtt_client, engine.clone());

    let app_state = AppState { engine, health_tracker };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    info!(%addr, "listening");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}
