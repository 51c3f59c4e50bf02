// Web override state and operator commands
use super::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlMode {
    /// Operator forces the actuator to `operator_desired_state`.
    Manual,
    #[default]
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlState {
    #[serde(default)]
    pub mode: ControlMode,
    #[serde(default)]
    pub operator_desired_state: bool,
    #[serde(default)]
    pub last_automatic_decision: bool,
    pub timestamp: DateTime<Utc>,
}

impl ControlState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            mode: ControlMode::Automatic,
            operator_desired_state: false,
            last_automatic_decision: false,
            timestamp: now,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.mode == ControlMode::Manual
    }

    /// State the actuator should be in right now.
    pub fn effective_state(&self) -> bool {
        match self.mode {
            ControlMode::Manual => self.operator_desired_state,
            ControlMode::Automatic => self.last_automatic_decision,
        }
    }

    pub fn apply(&mut self, command: ControlCommand, now: DateTime<Utc>) {
        if let Some(manual) = command.manual_mode {
            self.mode = if manual { ControlMode::Manual } else { ControlMode::Automatic };
        }
        if let Some(desired) = command.cooler_state {
            self.operator_desired_state = desired;
        }
        self.timestamp = now;
    }

    pub fn view(&self) -> ControlStateView {
        ControlStateView {
            manual_mode_active: self.is_manual(),
            manual_cooler_state: self.effective_state(),
            // The device reads this field whichever mode is active
            auto_cooler_state: self.effective_state(),
            timestamp: self.timestamp,
        }
    }
}

/// Shape polled by the device from `/getcontrol`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlStateView {
    pub manual_mode_active: bool,
    pub manual_cooler_state: bool,
    pub auto_cooler_state: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlCommand {
    pub manual_mode: Option<bool>,
    pub cooler_state: Option<bool>,
}

impl ControlCommand {
    /// Pick the boolean `manualMode` / `coolerState` fields out of a request
    /// body. Anything that is not a boolean is ignored.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let command = Self {
            manual_mode: body.get("manualMode").and_then(Value::as_bool),
            cooler_state: body.get("coolerState").and_then(Value::as_bool),
        };
        if command.manual_mode.is_none() && command.cooler_state.is_none() {
            return Err(ValidationError::NoValidParameters);
        }
        Ok(command)
    }
}
