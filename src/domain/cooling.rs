// Cooling threshold configuration and the actuator decision
use super::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PANEL_TEMP_THRESHOLD: f64 = 30.0;
pub const DEFAULT_HYSTERESIS: f64 = 2.0;
pub const THRESHOLD_MIN: f64 = 0.0;
pub const THRESHOLD_MAX: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoolingConfig {
    pub panel_temp_cooling_threshold: f64,
    pub timestamp: DateTime<Utc>,
}

impl CoolingConfig {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            panel_temp_cooling_threshold: DEFAULT_PANEL_TEMP_THRESHOLD,
            timestamp: now,
        }
    }

    pub fn with_threshold(threshold: f64, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let field = "panelTempCoolingThreshold";
        if !threshold.is_finite() {
            return Err(ValidationError::NotFinite { field });
        }
        if !(THRESHOLD_MIN..=THRESHOLD_MAX).contains(&threshold) {
            return Err(ValidationError::OutOfRange {
                field,
                value: threshold,
                min: THRESHOLD_MIN,
                max: THRESHOLD_MAX,
            });
        }
        Ok(Self {
            panel_temp_cooling_threshold: threshold,
            timestamp: now,
        })
    }
}

/// Body of a threshold change request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdUpdate {
    pub panel_temp_cooling_threshold: f64,
}

/// Automatic decision with a dead band below the threshold.
///
/// ON at or above `threshold`, OFF at or below `threshold - hysteresis`,
/// otherwise the previous decision is held. An unknown temperature is OFF.
pub fn hysteresis_decision(temp: Option<f64>, threshold: f64, hysteresis: f64, previous: bool) -> bool {
    match temp {
        Some(t) if t.is_finite() => {
            if t >= threshold {
                true
            } else if t <= threshold - hysteresis {
                false
            } else {
                previous
            }
        }
        _ => false,
    }
}

/// Plain comparison used when the threshold itself changes.
pub fn threshold_decision(temp: Option<f64>, threshold: f64) -> bool {
    matches!(temp, Some(t) if t.is_finite() && t >= threshold)
}
