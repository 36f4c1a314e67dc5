//! Idle-detection decision engine
//!
//! One `WatchEngine` instance tracks one printer. Every telemetry arrival
//! runs the same pipeline: staleness check → merge → activity classification
//! → idle-clock update → threshold check → (maybe) power-off. The host wraps
//! the engine in `Shared<WatchEngine>` so the whole pipeline is one critical
//! section; two near-simultaneous arrivals can never both cross the idle
//! threshold. The power command runs inside that section but is bounded by
//! the actuator deadline, so arrivals during a shutdown wait briefly instead
//! of racing it.

use crate::actuator::PowerSwitch;
use crate::models::{AggregateStatus, PartialStatus};
use crate::notify::Notifier;
use parking_lot::Mutex;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};

pub type SharedEngine = Arc<Mutex<WatchEngine>>;

/// Which rule classified the printer as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityReason {
    StageInProgress,
    BedHeating,
    BedWarm,
    NozzleHot,
    NozzleHeating,
}

impl ActivityReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityReason::StageInProgress => "print stage in progress",
            ActivityReason::BedHeating => "bed target set",
            ActivityReason::BedWarm => "bed above threshold",
            ActivityReason::NozzleHot => "nozzle residual heat",
            ActivityReason::NozzleHeating => "nozzle target set",
        }
    }
}

/// Thresholds the classifier and clocks run against. Copied out of the
/// config at construction; constants here are defaults, not invariants.
#[derive(Debug, Clone)]
pub struct EngineThresholds {
    pub idle_threshold: Duration,
    pub max_status_interval: Duration,
    pub bed_threshold_temp: f32,
    pub nozzle_high_temp: f32,
}

pub struct WatchEngine {
    device_name: String,
    thresholds: EngineThresholds,
    status: AggregateStatus,
    /// Stamp of the most recent merge; None until the first report arrives.
    last_telemetry_at: Option<OffsetDateTime>,
    /// Most recent moment the classifier found activity. Initialized by the
    /// first arrival so the countdown never predates observed telemetry.
    last_active_at: Option<OffsetDateTime>,
    /// Guards against a second shutdown interleaving the first.
    shutting_down: bool,
    telemetry_count: u64,
    shutdowns_triggered: u64,
    power: Box<dyn PowerSwitch>,
    notifier: Box<dyn Notifier>,
}

impl WatchEngine {
    pub fn new(
        device_name: &str,
        thresholds: EngineThresholds,
        power: Box<dyn PowerSwitch>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            device_name: device_name.to_string(),
            thresholds,
            status: AggregateStatus::default(),
            last_telemetry_at: None,
            last_active_at: None,
            shutting_down: false,
            telemetry_count: 0,
            shutdowns_triggered: 0,
            power,
            notifier,
        }
    }

    pub fn shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    /// Entry point for the telemetry listener: one call per arrival.
    pub fn on_telemetry(&mut self, incoming: &PartialStatus) {
        self.handle_at(incoming, OffsetDateTime::now_utc());
    }

    /// Same pipeline with an explicit clock, so the time-based behavior is
    /// testable without sleeping.
    pub fn handle_at(&mut self, incoming: &PartialStatus, now: OffsetDateTime) {
        self.telemetry_count += 1;

        // A long silence invalidates prior inferences: wipe before merging.
        if let Some(last) = self.last_telemetry_at {
            let silent_for = now - last;
            if silent_for > self.thresholds.max_status_interval {
                info!(
                    device = %self.device_name,
                    silent_secs = silent_for.whole_seconds(),
                    "telemetry went stale, resetting tracked state"
                );
                self.reset_tracking(now);
            }
        }
        self.last_telemetry_at = Some(now);

        self.status.merge(incoming);

        let activity = self.activity();
        if activity.is_some() || self.last_active_at.is_none() {
            self.last_active_at = Some(now);
        }

        let idle_for = now - self.last_active_at.unwrap_or(now);
        debug!(
            device = %self.device_name,
            active = activity.map(ActivityReason::as_str),
            idle_secs = idle_for.whole_seconds(),
            "telemetry processed"
        );

        if idle_for >= self.thresholds.idle_threshold {
            let reason = format!(
                "no activity for {}s (threshold {}s)",
                idle_for.whole_seconds(),
                self.thresholds.idle_threshold.whole_seconds()
            );
            self.shutdown(&reason, now);
        }
    }

    /// Activity rule set over the current aggregate. Unknown fields never
    /// count as evidence of inactivity.
    pub fn activity(&self) -> Option<ActivityReason> {
        if let Some(stage) = self.status.stage {
            if !stage.is_settled() {
                return Some(ActivityReason::StageInProgress);
            }
        }
        if let Some(temps) = &self.status.temps {
            if temps.bed_target.is_some_and(|v| v != 0.0) {
                return Some(ActivityReason::BedHeating);
            }
            if temps.bed.is_some_and(|v| v > self.thresholds.bed_threshold_temp) {
                return Some(ActivityReason::BedWarm);
            }
            if temps.nozzle.is_some_and(|v| v > self.thresholds.nozzle_high_temp) {
                return Some(ActivityReason::NozzleHot);
            }
            if temps.nozzle_target.is_some_and(|v| v > 0.0) {
                return Some(ActivityReason::NozzleHeating);
            }
        }
        None
    }

    /// Manual trigger, same coordinator path as the idle threshold.
    pub fn force_shutdown(&mut self, reason: &str) {
        self.shutdown(reason, OffsetDateTime::now_utc());
    }

    /// Terminal action of an episode: log, power off, notify, reset.
    ///
    /// The reset happens unconditionally, actuator success or not — a
    /// failed power-off must start a fresh episode rather than fire again
    /// on every following arrival.
    fn shutdown(&mut self, reason: &str, now: OffsetDateTime) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        warn!(
            device = %self.device_name,
            reason,
            status = ?self.status,
            "shutdown conditions met, powering off printer"
        );

        match self.power.set_power(&self.device_name, false) {
            Ok(()) => {
                self.shutdowns_triggered += 1;
                info!(device = %self.device_name, "printer powered off");
                if let Err(e) = self.notifier.notify(
                    "printer powered off",
                    &format!("{}: {}", self.device_name, reason),
                ) {
                    warn!(error = %e, "notification failed");
                }
            }
            Err(e) => {
                error!(device = %self.device_name, error = %e, "power-off failed");
                if let Err(ne) = self.notifier.notify(
                    "printer power-off FAILED",
                    &format!("{}: {} ({})", self.device_name, e, reason),
                ) {
                    warn!(error = %ne, "notification failed");
                }
            }
        }

        self.reset_tracking(now);
        self.shutting_down = false;
    }

    fn reset_tracking(&mut self, now: OffsetDateTime) {
        self.status.reset();
        self.last_telemetry_at = Some(now);
        self.last_active_at = Some(now);
    }

    // --- read-only accessors for the status/health surfaces ---

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn status(&self) -> &AggregateStatus {
        &self.status
    }

    pub fn last_telemetry_at(&self) -> Option<OffsetDateTime> {
        self.last_telemetry_at
    }

    pub fn idle_for(&self, now: OffsetDateTime) -> Option<Duration> {
        self.last_active_at.map(|t| now - t)
    }

    pub fn telemetry_count(&self) -> u64 {
        self.telemetry_count
    }

    pub fn shutdowns_triggered(&self) -> u64 {
        self.shutdowns_triggered
    }
}
