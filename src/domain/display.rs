// Dashboard view of the rig
use super::control::ControlState;
use super::sensor::SensorSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySnapshot {
    pub panel_temp: Option<f64>,
    pub ambient_temp: Option<f64>,
    pub light_intensity: Option<f64>,
    pub humidity: Option<f64>,
    pub panel_voltage: Option<f64>,
    pub panel_current: Option<f64>,
    pub panel_power: Option<f64>,
    pub panel_energy: Option<f64>,
    #[serde(flatten)]
    pub relays: BTreeMap<String, bool>,
    pub cooling_status: bool,
    /// Web override flag.
    pub manual_mode: bool,
    /// Device's own switch, reported as `globalManualMode`.
    pub device_manual_mode: Option<bool>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DisplaySnapshot {
    pub fn compose(reading: SensorSnapshot, control: &ControlState) -> Self {
        let cooling_status = if control.is_manual() {
            control.operator_desired_state
        } else {
            reading.any_relay_on()
        };

        Self {
            panel_temp: reading.panel_temp,
            ambient_temp: reading.ambient_temp,
            light_intensity: reading.light_intensity,
            humidity: reading.humidity,
            panel_voltage: reading.panel_voltage,
            panel_current: reading.panel_current,
            panel_power: reading.panel_power,
            panel_energy: reading.panel_energy,
            relays: reading.relays,
            cooling_status,
            manual_mode: control.is_manual(),
            device_manual_mode: reading.device_manual_mode,
            timestamp: reading.timestamp,
            error: None,
        }
    }

    pub fn degraded(channels: &[String], error: String) -> Self {
        let control = ControlState::new(Utc::now());
        Self {
            error: Some(error),
            ..Self::compose(SensorSnapshot::fallback(channels), &control)
        }
    }
}
