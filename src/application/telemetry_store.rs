// Repository trait for the external document store
use crate::domain::control::ControlState;
use crate::domain::cooling::CoolingConfig;
use crate::domain::sensor::SensorSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// The documents the cooling engine reads and writes. Each method maps to a
/// single document read or write; nothing here spans documents atomically.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn load_control_state(&self) -> anyhow::Result<Option<ControlState>>;

    async fn save_control_state(&self, state: &ControlState) -> anyhow::Result<()>;

    /// Update only `lastAutomaticDecision` and `timestamp`, leaving the mode
    /// and operator state as currently stored.
    async fn save_automatic_decision(&self, decision: bool, now: DateTime<Utc>) -> anyhow::Result<()>;

    async fn load_cooling_config(&self) -> anyhow::Result<Option<CoolingConfig>>;

    async fn save_cooling_config(&self, config: &CoolingConfig) -> anyhow::Result<()>;

    /// Most recent merged snapshot
    async fn load_latest_reading(&self) -> anyhow::Result<Option<SensorSnapshot>>;

    async fn save_latest_reading(&self, snapshot: &SensorSnapshot) -> anyhow::Result<()>;

    /// Append-only history log
    async fn append_history(&self, snapshot: &SensorSnapshot) -> anyhow::Result<()>;

    /// Newest first, strictly older than `start_after` when given
    async fn query_history(
        &self,
        limit: usize,
        start_after: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<SensorSnapshot>>;
}
