// HTTP request handlers
use crate::domain::control::{ControlCommand, ControlStateView};
use crate::domain::cooling::{CoolingConfig, ThresholdUpdate};
use crate::domain::display::DisplaySnapshot;
use crate::domain::sensor::{DeviceReading, SensorSnapshot};
use crate::infrastructure::http_response::ApiError;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub start_after_timestamp: Option<DateTime<Utc>>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Latest reading merged with the web override, for the dashboard
pub async fn sensor_data(State(state): State<Arc<AppState>>) -> Json<DisplaySnapshot> {
    Json(state.engine.display_state().await)
}

/// Sensor push from the ESP32
pub async fn update_sensor_data(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeviceReading>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(reading) = payload?;
    tracing::debug!("Received data from device: {:?}", reading);

    let outcome = state.engine.on_sensor_update(reading).await?;
    Ok(Json(json!({
        "message": "Data updated successfully",
        "coolingStatus": outcome.decision,
        "mode": outcome.mode,
    })))
}

/// Override command from the dashboard: `{ manualMode?, coolerState? }`
pub async fn update_control(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let command = ControlCommand::from_json(&body)?;

    let control = state.engine.on_control_command(command).await?;
    Ok(Json(json!({
        "message": "Control state updated",
        "newControlState": control.view(),
    })))
}

/// Polled by the ESP32
pub async fn get_control(State(state): State<Arc<AppState>>) -> Result<Json<ControlStateView>, ApiError> {
    let control = state.engine.control_state().await?;
    Ok(Json(control.view()))
}

pub async fn historical_data(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<SensorSnapshot>>, ApiError> {
    let Query(query) = query?;
    let history = state
        .engine
        .history(query.limit, query.start_after_timestamp)
        .await?;
    Ok(Json(history))
}

pub async fn get_cooling_settings(State(state): State<Arc<AppState>>) -> Result<Json<CoolingConfig>, ApiError> {
    Ok(Json(state.engine.cooling_config().await?))
}

pub async fn update_cooling_settings(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ThresholdUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(update) = payload?;
    let outcome = state
        .engine
        .on_threshold_change(update.panel_temp_cooling_threshold)
        .await?;

    Ok(Json(json!({
        "message": "Cooling settings updated",
        "settings": outcome.config,
        "reevaluation": outcome.reevaluation,
    })))
}
