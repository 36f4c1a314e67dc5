//! Telemetry data model for the printer watchdog
//!
//! Two shapes of the same data:
//! - `PartialStatus`: one MQTT report, every field optional — absent means
//!   "not reported this time", never "false/zero"
//! - `AggregateStatus`: the cumulative best-known state, enriched report by
//!   report and only ever replaced wholesale on a tracking reset

use serde::{Deserialize, Serialize};

/// Print stage as reported by the printer.
///
/// `Idle`, `Finish` and `Failed` are the settled stages; everything else
/// (including stages we don't recognize) counts as a job in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrintStage {
    Printing,
    Prepare,
    Paused,
    Idle,
    Finish,
    Failed,
    /// Stage string we don't know about; treated as in-progress.
    #[serde(other)]
    Other,
}

impl PrintStage {
    /// True for stages where no job is running anymore (or yet).
    pub fn is_settled(self) -> bool {
        matches!(self, PrintStage::Idle | PrintStage::Finish | PrintStage::Failed)
    }
}

/// Nested temperature block. Shared between partial reports and the
/// aggregate, so the merge can recurse field-by-field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    pub bed: Option<f32>,
    pub bed_target: Option<f32>,
    pub nozzle: Option<f32>,
    pub nozzle_target: Option<f32>,
}

impl Temperatures {
    fn merge(&mut self, incoming: &Temperatures) {
        if let Some(v) = incoming.bed {
            self.bed = Some(v);
        }
        if let Some(v) = incoming.bed_target {
            self.bed_target = Some(v);
        }
        if let Some(v) = incoming.nozzle {
            self.nozzle = Some(v);
        }
        if let Some(v) = incoming.nozzle_target {
            self.nozzle_target = Some(v);
        }
    }
}

/// One telemetry report from the status topic.
///
/// `gcode_file`, `layer`, `progress_percent` and `fan_speeds` are opaque to
/// the decision logic; they are merged and exposed on the status API only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialStatus {
    pub stage: Option<PrintStage>,
    pub temps: Option<Temperatures>,
    pub gcode_file: Option<String>,
    pub layer: Option<u32>,
    pub progress_percent: Option<f32>,
    pub fan_speeds: Option<Vec<u32>>,
}

/// Best-known state of the printer, built up by merging partial reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStatus {
    pub stage: Option<PrintStage>,
    pub temps: Option<Temperatures>,
    pub gcode_file: Option<String>,
    pub layer: Option<u32>,
    pub progress_percent: Option<f32>,
    pub fan_speeds: Option<Vec<u32>>,
}

impl AggregateStatus {
    /// Fold one report into the aggregate.
    ///
    /// Present fields win, absent fields never erase what we already know.
    /// The nested `temps` record merges field-by-field (and is created on
    /// first sight); scalars and sequences are replaced wholesale.
    pub fn merge(&mut self, incoming: &PartialStatus) {
        if let Some(stage) = incoming.stage {
            self.stage = Some(stage);
        }
        if let Some(temps) = &incoming.temps {
            self.temps.get_or_insert_with(Temperatures::default).merge(temps);
        }
        if let Some(file) = &incoming.gcode_file {
            self.gcode_file = Some(file.clone());
        }
        if let Some(layer) = incoming.layer {
            self.layer = Some(layer);
        }
        if let Some(progress) = incoming.progress_percent {
            self.progress_percent = Some(progress);
        }
        if let Some(fans) = &incoming.fan_speeds {
            self.fan_speeds = Some(fans.clone());
        }
    }

    /// Back to all-unknown, as at engine start.
    pub fn reset(&mut self) {
        *self = AggregateStatus::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temps(bed: Option<f32>, bed_target: Option<f32>, nozzle: Option<f32>, nozzle_target: Option<f32>) -> Temperatures {
        Temperatures { bed, bed_target, nozzle, nozzle_target }
    }

    #[test]
    fn empty_partial_is_a_noop() {
        let mut agg = AggregateStatus::default();
        agg.stage = Some(PrintStage::Printing);
        agg.temps = Some(temps(Some(60.0), Some(60.0), Some(220.0), Some(220.0)));
        agg.gcode_file = Some("benchy.gcode".to_string());
        let before = agg.clone();

        agg.merge(&PartialStatus::default());

        assert_eq!(agg.stage, before.stage);
        assert_eq!(agg.temps, before.temps);
        assert_eq!(agg.gcode_file, before.gcode_file);
    }

    #[test]
    fn present_fields_never_become_absent() {
        let mut agg = AggregateStatus::default();
        agg.merge(&PartialStatus {
            stage: Some(PrintStage::Printing),
            temps: Some(temps(Some(60.0), Some(60.0), None, None)),
            ..Default::default()
        });

        // Later report only carries the nozzle reading.
        agg.merge(&PartialStatus {
            temps: Some(temps(None, None, Some(215.0), None)),
            ..Default::default()
        });

        assert_eq!(agg.stage, Some(PrintStage::Printing));
        let t = agg.temps.as_ref().unwrap();
        assert_eq!(t.bed, Some(60.0));
        assert_eq!(t.bed_target, Some(60.0));
        assert_eq!(t.nozzle, Some(215.0));
        assert_eq!(t.nozzle_target, None);
    }

    #[test]
    fn later_present_values_win() {
        let mut agg = AggregateStatus::default();
        agg.merge(&PartialStatus {
            stage: Some(PrintStage::Printing),
            layer: Some(12),
            ..Default::default()
        });
        agg.merge(&PartialStatus {
            stage: Some(PrintStage::Finish),
            ..Default::default()
        });

        assert_eq!(agg.stage, Some(PrintStage::Finish));
        assert_eq!(agg.layer, Some(12));
    }

    #[test]
    fn nested_temps_created_on_first_sight() {
        let mut agg = AggregateStatus::default();
        assert!(agg.temps.is_none());

        agg.merge(&PartialStatus {
            temps: Some(temps(None, None, None, Some(250.0))),
            ..Default::default()
        });

        assert_eq!(agg.temps.as_ref().unwrap().nozzle_target, Some(250.0));
        assert_eq!(agg.temps.as_ref().unwrap().bed, None);
    }

    #[test]
    fn sequences_are_replaced_wholesale() {
        let mut agg = AggregateStatus::default();
        agg.merge(&PartialStatus {
            fan_speeds: Some(vec![100, 100, 30]),
            ..Default::default()
        });
        agg.merge(&PartialStatus {
            fan_speeds: Some(vec![0]),
            ..Default::default()
        });

        assert_eq!(agg.fan_speeds, Some(vec![0]));
    }

    #[test]
    fn unknown_stage_string_decodes_as_other() {
        let status: PartialStatus =
            serde_json::from_str(r#"{"stage": "SLICING"}"#).unwrap();
        assert_eq!(status.stage, Some(PrintStage::Other));
        assert!(!PrintStage::Other.is_settled());
    }
}
