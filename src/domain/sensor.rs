// Sensor reading domain models
use super::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Relay channels are reported by the device as `ssr1`, `ssr3`, ...
pub const RELAY_PREFIX: &str = "ssr";

/// Reading pushed by the ESP32, using the device's own field names.
/// Every field is optional; `null` counts as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceReading {
    pub t_ds: Option<f64>,
    pub t_dht: Option<f64>,
    pub lux: Option<f64>,
    pub h_dht: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub energy: Option<f64>,
    #[serde(rename = "globalManualMode")]
    pub global_manual_mode: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A validated partial update in canonical field names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorPatch {
    pub panel_temp: Option<f64>,
    pub ambient_temp: Option<f64>,
    pub light_intensity: Option<f64>,
    pub humidity: Option<f64>,
    pub panel_voltage: Option<f64>,
    pub panel_current: Option<f64>,
    pub panel_power: Option<f64>,
    pub panel_energy: Option<f64>,
    pub relays: BTreeMap<String, bool>,
    pub device_manual_mode: Option<bool>,
}

fn within(
    field: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> Result<Option<f64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v) if !v.is_finite() => Err(ValidationError::NotFinite { field }),
        Some(v) if v < min || v > max => Err(ValidationError::OutOfRange {
            field,
            value: v,
            min,
            max,
        }),
        Some(v) => Ok(Some(v)),
    }
}

fn at_least(field: &'static str, value: Option<f64>, min: f64) -> Result<Option<f64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v) if !v.is_finite() => Err(ValidationError::NotFinite { field }),
        Some(v) if v < min => Err(ValidationError::BelowMinimum { field, value: v, min }),
        Some(v) => Ok(Some(v)),
    }
}

impl SensorPatch {
    /// Validate a device reading. Only the configured relay channels are
    /// taken; any other `ssr*` key is dropped.
    pub fn from_reading(reading: DeviceReading, channels: &[String]) -> Result<Self, ValidationError> {
        let mut relays = BTreeMap::new();
        for (key, value) in reading.extra {
            if !key.starts_with(RELAY_PREFIX) {
                continue;
            }
            if !channels.contains(&key) {
                tracing::debug!("Ignoring unconfigured relay channel {}", key);
                continue;
            }
            match value {
                Value::Bool(on) => {
                    relays.insert(key, on);
                }
                Value::Null => {}
                _ => return Err(ValidationError::NotBoolean { field: key }),
            }
        }

        Ok(Self {
            panel_temp: within("panelTemp", reading.t_ds, 1.0, 80.0)?,
            ambient_temp: within("ambientTemp", reading.t_dht, -50.0, 50.0)?,
            light_intensity: within("lightIntensity", reading.lux, 0.0, 100_000.0)?,
            humidity: within("humidity", reading.h_dht, 0.0, 100.0)?,
            panel_voltage: within("panelVoltage", reading.voltage, 0.0, 20.0)?,
            panel_current: within("panelCurrent", reading.current, 0.0, 10.0)?,
            panel_power: at_least("panelPower", reading.power, 0.0)?,
            panel_energy: at_least("panelEnergy", reading.energy, 0.0)?,
            relays,
            device_manual_mode: reading.global_manual_mode,
        })
    }
}

/// The latest known state of the rig, as stored in the latest-reading
/// document and appended to history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorSnapshot {
    pub panel_temp: Option<f64>,
    pub ambient_temp: Option<f64>,
    pub light_intensity: Option<f64>,
    pub humidity: Option<f64>,
    pub panel_voltage: Option<f64>,
    pub panel_current: Option<f64>,
    pub panel_power: Option<f64>,
    pub panel_energy: Option<f64>,
    pub relays: BTreeMap<String, bool>,
    pub cooling_status: bool,
    /// Physical auto/manual switch on the device. Not the web override.
    pub device_manual_mode: Option<bool>,
    pub timestamp: Option<DateTime<Utc>>,
}

fn overwrite<T: Copy>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

impl SensorSnapshot {
    /// Merge a patch field by field. Absent fields keep their stored value.
    pub fn merge(&self, patch: &SensorPatch, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        overwrite(&mut next.panel_temp, patch.panel_temp);
        overwrite(&mut next.ambient_temp, patch.ambient_temp);
        overwrite(&mut next.light_intensity, patch.light_intensity);
        overwrite(&mut next.humidity, patch.humidity);
        overwrite(&mut next.panel_voltage, patch.panel_voltage);
        overwrite(&mut next.panel_current, patch.panel_current);
        overwrite(&mut next.panel_energy, patch.panel_energy);
        overwrite(&mut next.device_manual_mode, patch.device_manual_mode);
        for (channel, on) in &patch.relays {
            next.relays.insert(channel.clone(), *on);
        }

        next.panel_power = match (next.panel_voltage, next.panel_current) {
            (Some(voltage), Some(current)) => Some(voltage * current),
            _ => patch.panel_power.or(next.panel_power),
        };
        next.timestamp = Some(now);
        next
    }

    /// Drive every configured relay channel to the same state. Channels
    /// outside the configured set are removed.
    pub fn apply_decision(&mut self, decision: bool, channels: &[String]) {
        self.relays.retain(|channel, _| channels.contains(channel));
        for channel in channels {
            self.relays.insert(channel.clone(), decision);
        }
        self.cooling_status = decision;
    }

    pub fn any_relay_on(&self) -> bool {
        self.relays.values().any(|on| *on)
    }

    /// Reading shown when the store cannot be reached.
    pub fn fallback(channels: &[String]) -> Self {
        Self {
            panel_temp: Some(25.0),
            ambient_temp: Some(28.0),
            light_intensity: Some(500.0),
            humidity: Some(60.0),
            panel_voltage: Some(12.0),
            panel_current: Some(0.5),
            panel_power: Some(6.0),
            panel_energy: Some(0.0),
            relays: channels.iter().map(|c| (c.clone(), false)).collect(),
            cooling_status: false,
            device_manual_mode: Some(false),
            timestamp: None,
        }
    }
}
