//! Best-effort notification seam
//!
//! Notifications describe what the watchdog did (or failed to do). They are
//! fire-and-forget: a failed send is logged by the caller and never stops
//! the engine.

use rumqttc::{AsyncClient, QoS};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to enqueue notification: {0}")]
    Publish(String),
}

pub trait Notifier: Send {
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Publishes notification events on an MQTT topic.
pub struct MqttNotifier {
    client: AsyncClient,
    topic: String,
}

impl MqttNotifier {
    pub fn new(client: AsyncClient, topic: &str) -> Self {
        Self { client, topic: topic.to_string() }
    }
}

impl Notifier for MqttNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&serde_json::json!({
            "event_id": Uuid::new_v4().to_string(),
            "title": title,
            "body": body,
            "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }))?;

        // try_publish enqueues without waiting on the event loop, which keeps
        // this callable from inside the engine critical section.
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| NotifyError::Publish(e.to_string()))
    }
}
