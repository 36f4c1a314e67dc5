use serde::{Deserialize, Serialize};
use std::path::Path;
use time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchdogConfig {
    /// Human-readable name of the smart plug / switch the printer hangs off.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// How long the printer must show no activity before we power it off.
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
    /// Telemetry silence after which tracked state is no longer trusted.
    #[serde(default = "default_max_status_interval_secs")]
    pub max_status_interval_secs: u64,
    /// Bed temperature (°C) above which the printer counts as active.
    #[serde(default = "default_bed_threshold_temp")]
    pub bed_threshold_temp: f32,
    /// Nozzle temperature (°C) treated as residual heat from recent work.
    #[serde(default = "default_nozzle_high_temp")]
    pub nozzle_high_temp: f32,
    #[serde(default)]
    pub mqtt: MqttConf,
    #[serde(default)]
    pub power: PowerConf,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    /// Topic carrying partial status reports for the tracked printer.
    pub status_topic: String,
    /// Topic notifications are published on (best-effort).
    pub notify_topic: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PowerConf {
    /// Command template for the power switch, with `{device}` and `{state}`
    /// placeholders. ex: "mijia-cli set --dev_name {device} --prop_name on --value {state}"
    pub command: Option<String>,
    /// Hard deadline on the power command.
    #[serde(default = "default_power_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_device_name() -> String { "3d-printer".into() }
fn default_idle_threshold_secs() -> u64 { 15 * 60 }
fn default_max_status_interval_secs() -> u64 { 5 * 60 }
fn default_bed_threshold_temp() -> f32 { 40.0 }
fn default_nozzle_high_temp() -> f32 { 85.0 }
fn default_http_port() -> u16 { 8080 }
fn default_power_timeout_secs() -> u64 { 30 }

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            status_topic: "printwatch/status@v1".into(),
            notify_topic: "printwatch/notify@v1".into(),
        }
    }
}

impl Default for PowerConf {
    fn default() -> Self {
        Self { command: None, timeout_secs: default_power_timeout_secs() }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            idle_threshold_secs: default_idle_threshold_secs(),
            max_status_interval_secs: default_max_status_interval_secs(),
            bed_threshold_temp: default_bed_threshold_temp(),
            nozzle_high_temp: default_nozzle_high_temp(),
            mqtt: MqttConf::default(),
            power: PowerConf::default(),
            http_port: default_http_port(),
        }
    }
}

impl WatchdogConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::seconds(self.idle_threshold_secs as i64)
    }

    pub fn max_status_interval(&self) -> Duration {
        Duration::seconds(self.max_status_interval_secs as i64)
    }
}

pub async fn load_config() -> WatchdogConfig {
    let path = std::env::var("PRINTWATCH_CONFIG").unwrap_or_else(|_| "printwatch.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return WatchdogConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            warn!(path, error = %e, "invalid config, using defaults");
            WatchdogConfig::default()
        })
    } else {
        warn!(path, "no config file, using defaults");
        WatchdogConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let cfg = WatchdogConfig::default();
        assert_eq!(cfg.idle_threshold(), Duration::minutes(15));
        assert_eq!(cfg.max_status_interval(), Duration::minutes(5));
        assert_eq!(cfg.bed_threshold_temp, 40.0);
        assert_eq!(cfg.nozzle_high_temp, 85.0);
        assert!(cfg.power.command.is_none());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let cfg: WatchdogConfig = serde_yaml::from_str(
            r#"
device_name: workshop-plug
idle_threshold_secs: 600
power:
  command: "mijia-cli set --dev_name {device} --prop_name on --value {state}"
"#,
        )
        .unwrap();

        assert_eq!(cfg.device_name, "workshop-plug");
        assert_eq!(cfg.idle_threshold(), Duration::minutes(10));
        assert_eq!(cfg.max_status_interval(), Duration::minutes(5));
        assert_eq!(cfg.power.timeout_secs, 30);
        assert_eq!(cfg.mqtt.port, 1883);
    }
}
