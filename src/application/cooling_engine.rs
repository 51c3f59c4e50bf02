// Cooling engine - Arbitrates between automatic control and the web override
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::control::{ControlCommand, ControlMode, ControlState};
use crate::domain::cooling::{
    hysteresis_decision, threshold_decision, CoolingConfig, DEFAULT_HYSTERESIS,
};
use crate::domain::display::DisplaySnapshot;
use crate::domain::error::ValidationError;
use crate::domain::sensor::{DeviceReading, SensorPatch, SensorSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("telemetry store unavailable: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub hysteresis: f64,
    pub relay_channels: Vec<String>,
    pub history_default_limit: usize,
    pub history_max_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hysteresis: DEFAULT_HYSTERESIS,
            relay_channels: vec!["ssr1".to_string(), "ssr3".to_string(), "ssr4".to_string()],
            history_default_limit: 50,
            history_max_limit: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorUpdateOutcome {
    pub mode: ControlMode,
    pub decision: bool,
    pub snapshot: SensorSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reevaluation {
    pub mode: ControlMode,
    pub panel_temp: Option<f64>,
    pub decision: bool,
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct ThresholdChangeOutcome {
    pub config: CoolingConfig,
    pub reevaluation: Reevaluation,
}

#[derive(Clone)]
pub struct CoolingEngine {
    store: Arc<dyn TelemetryStore>,
    settings: EngineSettings,
}

impl CoolingEngine {
    pub fn new(store: Arc<dyn TelemetryStore>, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    /// Merge a device reading, decide the actuator state and record both.
    pub async fn on_sensor_update(&self, reading: DeviceReading) -> EngineResult<SensorUpdateOutcome> {
        let patch = SensorPatch::from_reading(reading, &self.settings.relay_channels)?;
        let (control, config, latest) =
            futures::try_join!(self.control_state(), self.cooling_config(), self.latest_reading())?;

        let now = Utc::now();
        let mut snapshot = latest.unwrap_or_default().merge(&patch, now);

        let decision = match control.mode {
            ControlMode::Manual => control.operator_desired_state,
            ControlMode::Automatic => {
                let previous = control.last_automatic_decision;
                let decision = hysteresis_decision(
                    snapshot.panel_temp,
                    config.panel_temp_cooling_threshold,
                    self.settings.hysteresis,
                    previous,
                );
                if decision != previous {
                    self.record_automatic_decision(decision, now).await?;
                    tracing::info!(
                        panel_temp = ?snapshot.panel_temp,
                        threshold = config.panel_temp_cooling_threshold,
                        decision,
                        "Automatic cooling decision changed"
                    );
                }
                decision
            }
        };

        snapshot.apply_decision(decision, &self.settings.relay_channels);
        self.store.save_latest_reading(&snapshot).await?;
        self.store.append_history(&snapshot).await?;

        tracing::debug!(mode = ?control.mode, decision, "Sensor update recorded");
        Ok(SensorUpdateOutcome {
            mode: control.mode,
            decision,
            snapshot,
        })
    }

    pub async fn on_control_command(&self, command: ControlCommand) -> EngineResult<ControlState> {
        let mut state = self.control_state().await?;
        state.apply(command, Utc::now());
        self.store.save_control_state(&state).await?;

        tracing::info!(
            mode = ?state.mode,
            operator_desired_state = state.operator_desired_state,
            "Control state updated"
        );
        Ok(state)
    }

    /// Store a new threshold and re-evaluate the latest reading against it
    /// right away. The re-evaluation is a plain comparison without the hold.
    pub async fn on_threshold_change(&self, threshold: f64) -> EngineResult<ThresholdChangeOutcome> {
        let now = Utc::now();
        let config = CoolingConfig::with_threshold(threshold, now)?;
        let (control, latest) = futures::try_join!(self.control_state(), self.latest_reading())?;

        self.store.save_cooling_config(&config).await?;

        let panel_temp = latest.as_ref().and_then(|s| s.panel_temp);
        let mode = control.mode;
        let reevaluation = match mode {
            ControlMode::Automatic => {
                let decision = threshold_decision(panel_temp, threshold);
                let changed = decision != control.last_automatic_decision;

                if let Some(mut snapshot) = latest {
                    snapshot.apply_decision(decision, &self.settings.relay_channels);
                    self.store.save_latest_reading(&snapshot).await?;
                }
                if changed {
                    self.record_automatic_decision(decision, now).await?;
                }

                Reevaluation {
                    mode: ControlMode::Automatic,
                    panel_temp,
                    decision,
                    changed,
                }
            }
            ControlMode::Manual => {
                let desired = control.operator_desired_state;
                if let Some(mut snapshot) = latest.filter(|s| s.cooling_status != desired) {
                    snapshot.cooling_status = desired;
                    self.store.save_latest_reading(&snapshot).await?;
                }

                Reevaluation {
                    mode: ControlMode::Manual,
                    panel_temp,
                    decision: desired,
                    changed: false,
                }
            }
        };

        tracing::info!(
            threshold,
            decision = reevaluation.decision,
            changed = reevaluation.changed,
            "Cooling threshold updated"
        );
        Ok(ThresholdChangeOutcome { config, reevaluation })
    }

    /// Dashboard view. Falls back to default readings when the store fails.
    pub async fn display_state(&self) -> DisplaySnapshot {
        let loaded = futures::try_join!(self.store.load_latest_reading(), self.store.load_control_state());

        match loaded {
            Ok((latest, control)) => {
                let control = control.unwrap_or_else(|| ControlState::new(Utc::now()));
                DisplaySnapshot::compose(latest.unwrap_or_default(), &control)
            }
            Err(e) => {
                tracing::warn!("Serving fallback display state: {:#}", e);
                DisplaySnapshot::degraded(
                    &self.settings.relay_channels,
                    format!("telemetry store unavailable: {e}"),
                )
            }
        }
    }

    /// Current control state, created with defaults on first access.
    pub async fn control_state(&self) -> EngineResult<ControlState> {
        if let Some(state) = self.store.load_control_state().await? {
            return Ok(state);
        }
        let state = ControlState::new(Utc::now());
        self.store.save_control_state(&state).await?;
        tracing::info!("Initialized default control state");
        Ok(state)
    }

    /// Current cooling config, created with defaults on first access.
    pub async fn cooling_config(&self) -> EngineResult<CoolingConfig> {
        if let Some(config) = self.store.load_cooling_config().await? {
            return Ok(config);
        }
        let config = CoolingConfig::new(Utc::now());
        self.store.save_cooling_config(&config).await?;
        tracing::info!(
            threshold = config.panel_temp_cooling_threshold,
            "Initialized default cooling settings"
        );
        Ok(config)
    }

    pub async fn history(
        &self,
        limit: Option<usize>,
        start_after: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<SensorSnapshot>> {
        let limit = limit
            .unwrap_or(self.settings.history_default_limit)
            .clamp(1, self.settings.history_max_limit);
        Ok(self.store.query_history(limit, start_after).await?)
    }

    async fn latest_reading(&self) -> EngineResult<Option<SensorSnapshot>> {
        Ok(self.store.load_latest_reading().await?)
    }

    /// Writes only the automatic decision, so an override saved since the
    /// control state was read is left alone.
    async fn record_automatic_decision(&self, decision: bool, now: DateTime<Utc>) -> EngineResult<()> {
        self.store.save_automatic_decision(decision, now).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn engine() -> (CoolingEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(1_000));
        (CoolingEngine::new(store.clone(), EngineSettings::default()), store)
    }

    fn reading(body: serde_json::Value) -> DeviceReading {
        serde_json::from_value(body).unwrap()
    }

    async fn push_temp(engine: &CoolingEngine, temp: f64) -> bool {
        engine
            .on_sensor_update(reading(json!({ "t_ds": temp })))
            .await
            .unwrap()
            .decision
    }

    #[tokio::test]
    async fn test_defaults_created_on_first_access() {
        let (engine, store) = engine();
        assert!(store.load_cooling_config().await.unwrap().is_none());

        let config = engine.cooling_config().await.unwrap();
        assert_eq!(config.panel_temp_cooling_threshold, 30.0);
        assert!(store.load_cooling_config().await.unwrap().is_some());

        let control = engine.control_state().await.unwrap();
        assert_eq!(control.mode, ControlMode::Automatic);
        assert!(store.load_control_state().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_hysteresis_across_updates() {
        let (engine, store) = engine();

        assert!(push_temp(&engine, 30.1).await);
        assert!(push_temp(&engine, 29.5).await);
        assert!(push_temp(&engine, 28.5).await);
        assert!(!push_temp(&engine, 28.0).await);
        assert!(!push_temp(&engine, 29.9).await);
        assert!(push_temp(&engine, 30.0).await);

        let control = store.load_control_state().await.unwrap().unwrap();
        assert!(control.last_automatic_decision);
    }

    #[tokio::test]
    async fn test_decision_written_to_all_relays_and_history() {
        let (engine, store) = engine();
        let outcome = engine
            .on_sensor_update(reading(json!({"t_ds": 35, "ssr1": false})))
            .await
            .unwrap();

        assert!(outcome.decision);
        let latest = store.load_latest_reading().await.unwrap().unwrap();
        assert!(latest.cooling_status);
        assert_eq!(latest.relays.len(), 3);
        assert!(latest.relays.values().all(|on| *on));

        let history = store.query_history(10, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], latest);
    }

    #[tokio::test]
    async fn test_unconfigured_relay_keys_are_not_stored() {
        let (engine, store) = engine();
        let mut body = serde_json::Map::new();
        for i in 0..200 {
            body.insert(format!("ssr_junk{i}"), json!(true));
        }
        body.insert("ssrX".to_string(), json!(false));
        body.insert("ssr3".to_string(), json!(false));
        engine
            .on_sensor_update(reading(serde_json::Value::Object(body)))
            .await
            .unwrap();
        push_temp(&engine, 35.0).await;

        let latest = store.load_latest_reading().await.unwrap().unwrap();
        let channels: Vec<&str> = latest.relays.keys().map(String::as_str).collect();
        assert_eq!(channels, ["ssr1", "ssr3", "ssr4"]);
        for snapshot in store.query_history(10, None).await.unwrap() {
            assert_eq!(snapshot.relays.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_manual_override_freezes_decision() {
        let (engine, store) = engine();
        engine
            .on_control_command(ControlCommand { manual_mode: Some(true), cooler_state: Some(true) })
            .await
            .unwrap();

        assert!(push_temp(&engine, 10.0).await);
        assert!(push_temp(&engine, 75.0).await);
        assert!(push_temp(&engine, 5.0).await);

        // Automatic decision was never recomputed while overridden
        let control = store.load_control_state().await.unwrap().unwrap();
        assert!(!control.last_automatic_decision);

        engine
            .on_control_command(ControlCommand { manual_mode: Some(false), cooler_state: None })
            .await
            .unwrap();
        assert!(!push_temp(&engine, 5.0).await);
    }

    #[tokio::test]
    async fn test_partial_update_keeps_panel_temp() {
        let (engine, store) = engine();
        push_temp(&engine, 33.0).await;

        let outcome = engine.on_sensor_update(reading(json!({"lux": 800}))).await.unwrap();
        assert_eq!(outcome.snapshot.panel_temp, Some(33.0));
        assert!(outcome.decision);

        let latest = store.load_latest_reading().await.unwrap().unwrap();
        assert_eq!(latest.panel_temp, Some(33.0));
        assert_eq!(latest.light_intensity, Some(800.0));
    }

    #[tokio::test]
    async fn test_missing_temperature_fails_safe() {
        let (engine, _store) = engine();
        let outcome = engine.on_sensor_update(reading(json!({"lux": 800}))).await.unwrap();
        assert!(!outcome.decision);
    }

    #[tokio::test]
    async fn test_invalid_reading_stores_nothing() {
        let (engine, store) = engine();
        push_temp(&engine, 25.0).await;

        let err = engine
            .on_sensor_update(reading(json!({"t_ds": 200, "lux": 5})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::OutOfRange { .. })));

        let latest = store.load_latest_reading().await.unwrap().unwrap();
        assert_eq!(latest.panel_temp, Some(25.0));
        assert_eq!(latest.light_intensity, None);
        assert_eq!(store.query_history(10, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_change_reevaluates_immediately() {
        let (engine, store) = engine();
        assert!(!push_temp(&engine, 27.0).await);

        let outcome = engine.on_threshold_change(25.0).await.unwrap();
        assert_eq!(outcome.config.panel_temp_cooling_threshold, 25.0);
        assert_eq!(
            outcome.reevaluation,
            Reevaluation {
                mode: ControlMode::Automatic,
                panel_temp: Some(27.0),
                decision: true,
                changed: true
            }
        );

        let latest = store.load_latest_reading().await.unwrap().unwrap();
        assert!(latest.cooling_status);
        assert!(latest.relays.values().all(|on| *on));
        let control = store.load_control_state().await.unwrap().unwrap();
        assert!(control.view().manual_cooler_state);
    }

    #[tokio::test]
    async fn test_threshold_change_in_manual_mode_keeps_operator_state() {
        let (engine, store) = engine();
        push_temp(&engine, 27.0).await;
        engine
            .on_control_command(ControlCommand { manual_mode: Some(true), cooler_state: Some(true) })
            .await
            .unwrap();

        let outcome = engine.on_threshold_change(40.0).await.unwrap();
        assert_eq!(outcome.reevaluation.mode, ControlMode::Manual);
        assert!(outcome.reevaluation.decision);
        assert!(!outcome.reevaluation.changed);

        let latest = store.load_latest_reading().await.unwrap().unwrap();
        assert!(latest.cooling_status);
        let control = store.load_control_state().await.unwrap().unwrap();
        assert!(!control.last_automatic_decision);
    }

    #[tokio::test]
    async fn test_threshold_out_of_range_is_rejected() {
        let (engine, store) = engine();
        let err = engine.on_threshold_change(81.0).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(store.load_cooling_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_display_state_merges_control() {
        let (engine, _store) = engine();
        engine
            .on_sensor_update(reading(json!({"t_ds": 32, "voltage": 12, "current": 1})))
            .await
            .unwrap();

        let display = engine.display_state().await;
        assert!(display.cooling_status);
        assert!(!display.manual_mode);
        assert_eq!(display.panel_power, Some(12.0));
        assert!(display.error.is_none());

        engine
            .on_control_command(ControlCommand { manual_mode: Some(true), cooler_state: Some(false) })
            .await
            .unwrap();
        let display = engine.display_state().await;
        assert!(!display.cooling_status);
        assert!(display.manual_mode);
    }

    #[tokio::test]
    async fn test_history_limit_is_clamped() {
        let (engine, _store) = engine();
        for temp in [20.0, 21.0, 22.0] {
            push_temp(&engine, temp).await;
        }

        let history = engine.history(Some(0), None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].panel_temp, Some(22.0));

        let history = engine.history(None, None).await.unwrap();
        assert_eq!(history.len(), 3);
    }

    /// Saves a Manual override behind the engine's back right after the
    /// engine has read the control state.
    struct OverrideDuringUpdate {
        inner: MemoryStore,
        overridden: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl TelemetryStore for OverrideDuringUpdate {
        async fn load_control_state(&self) -> anyhow::Result<Option<ControlState>> {
            let state = self.inner.load_control_state().await?;
            if !self.overridden.swap(true, std::sync::atomic::Ordering::SeqCst) {
                let mut manual = ControlState::new(Utc::now());
                manual.apply(
                    ControlCommand { manual_mode: Some(true), cooler_state: Some(false) },
                    Utc::now(),
                );
                self.inner.save_control_state(&manual).await?;
            }
            Ok(state)
        }
        async fn save_control_state(&self, state: &ControlState) -> anyhow::Result<()> {
            self.inner.save_control_state(state).await
        }
        async fn save_automatic_decision(&self, decision: bool, now: DateTime<Utc>) -> anyhow::Result<()> {
            self.inner.save_automatic_decision(decision, now).await
        }
        async fn load_cooling_config(&self) -> anyhow::Result<Option<CoolingConfig>> {
            self.inner.load_cooling_config().await
        }
        async fn save_cooling_config(&self, config: &CoolingConfig) -> anyhow::Result<()> {
            self.inner.save_cooling_config(config).await
        }
        async fn load_latest_reading(&self) -> anyhow::Result<Option<SensorSnapshot>> {
            self.inner.load_latest_reading().await
        }
        async fn save_latest_reading(&self, snapshot: &SensorSnapshot) -> anyhow::Result<()> {
            self.inner.save_latest_reading(snapshot).await
        }
        async fn append_history(&self, snapshot: &SensorSnapshot) -> anyhow::Result<()> {
            self.inner.append_history(snapshot).await
        }
        async fn query_history(
            &self,
            limit: usize,
            start_after: Option<DateTime<Utc>>,
        ) -> anyhow::Result<Vec<SensorSnapshot>> {
            self.inner.query_history(limit, start_after).await
        }
    }

    #[tokio::test]
    async fn test_automatic_decision_does_not_revert_concurrent_override() {
        let inner = MemoryStore::new(100);
        inner.save_control_state(&ControlState::new(Utc::now())).await.unwrap();
        let store = Arc::new(OverrideDuringUpdate {
            inner,
            overridden: std::sync::atomic::AtomicBool::new(false),
        });
        let engine = CoolingEngine::new(store.clone(), EngineSettings::default());

        // Read as Automatic, so the hysteresis turns cooling on
        assert!(push_temp(&engine, 35.0).await);

        let control = store.inner.load_control_state().await.unwrap().unwrap();
        assert_eq!(control.mode, ControlMode::Manual);
        assert!(!control.operator_desired_state);
        assert!(control.last_automatic_decision);
    }

    struct UnavailableStore;

    #[async_trait]
    impl TelemetryStore for UnavailableStore {
        async fn load_control_state(&self) -> anyhow::Result<Option<ControlState>> {
            anyhow::bail!("connection refused")
        }
        async fn save_control_state(&self, _state: &ControlState) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn load_cooling_config(&self) -> anyhow::Result<Option<CoolingConfig>> {
            anyhow::bail!("connection refused")
        }
        async fn save_cooling_config(&self, _config: &CoolingConfig) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn load_latest_reading(&self) -> anyhow::Result<Option<SensorSnapshot>> {
            anyhow::bail!("connection refused")
        }
        async fn save_latest_reading(&self, _snapshot: &SensorSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn append_history(&self, _snapshot: &SensorSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn query_history(
            &self,
            _limit: usize,
            _start_after: Option<DateTime<Utc>>,
        ) -> anyhow::Result<Vec<SensorSnapshot>> {
            anyhow::bail!("connection refused")
        }
        async fn save_automatic_decision(&self, _decision: bool, _now: DateTime<Utc>) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let engine = CoolingEngine::new(Arc::new(UnavailableStore), EngineSettings::default());

        let display = engine.display_state().await;
        assert!(display.error.is_some());
        assert_eq!(display.panel_temp, Some(25.0));

        let err = engine.on_sensor_update(reading(json!({"t_ds": 30}))).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert!(matches!(engine.on_threshold_change(25.0).await, Err(EngineError::Store(_))));
    }
}
