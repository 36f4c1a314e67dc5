//! REST surface of the watchdog
//!
//! Read-only inspection of the tracked state plus one manual action:
//! - GET  /health         liveness probe, always open
//! - GET  /system/health  watchdog health (uptime, counters, MQTT state)
//! - GET  /status         current aggregate view + idle/staleness ages
//! - POST /power/off      manual power-off through the same coordinator path
//!
//! Mutating routes require the `x-api-key` header (PRINTWATCH_API_KEY).

use crate::engine::SharedEngine;
use crate::health::{HealthTracker, WatchdogHealth};
use crate::models::AggregateStatus;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub engine: SharedEngine,
    pub health_tracker: HealthTracker,
}

#[derive(serde::Serialize)]
struct StatusView {
    device: String,
    status: AggregateStatus,
    active: Option<&'static str>,
    idle_seconds: Option<i64>,
    last_telemetry: Option<String>,
    telemetry_messages: u64,
    shutdowns_triggered: u64,
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    // Read-only routes stay open.
    if req.method() == axum::http::Method::GET {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("PRINTWATCH_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        warn!("PRINTWATCH_API_KEY not set - mutating API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/status", get(get_status))
        .route("/power/off", post(power_off))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

async fn get_system_health(State(app): State<AppState>) -> Json<WatchdogHealth> {
    Json(app.health_tracker.get_health(&app.engine))
}

async fn get_status(State(app): State<AppState>) -> Json<StatusView> {
    let now = OffsetDateTime::now_utc();
    let eng = app.engine.lock();
    Json(StatusView {
        device: eng.device_name().to_string(),
        status: eng.status().clone(),
        active: eng.activity().map(|r| r.as_str()),
        idle_seconds: eng.idle_for(now).map(|d| d.whole_seconds()),
        last_telemetry: eng
            .last_telemetry_at()
            .and_then(|t| t.format(&Rfc3339).ok()),
        telemetry_messages: eng.telemetry_count(),
        shutdowns_triggered: eng.shutdowns_triggered(),
    })
}

async fn power_off(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    app.engine.lock().force_shutdown("manual power-off request");
    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}
