// In-process document store for local runs and tests
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::control::ControlState;
use crate::domain::cooling::CoolingConfig;
use crate::domain::sensor::SensorSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Documents {
    control_state: Option<ControlState>,
    cooling_config: Option<CoolingConfig>,
    latest_reading: Option<SensorSnapshot>,
    history: VecDeque<SensorSnapshot>,
}

/// Owned by the hosting process and shared through `Arc`. Nothing survives
/// a restart; oldest history entries are dropped past `history_capacity`.
#[derive(Debug)]
pub struct MemoryStore {
    documents: RwLock<Documents>,
    history_capacity: usize,
}

impl MemoryStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            documents: RwLock::new(Documents::default()),
            history_capacity: history_capacity.max(1),
        }
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn load_control_state(&self) -> Result<Option<ControlState>> {
        Ok(self.documents.read().await.control_state.clone())
    }

    async fn save_control_state(&self, state: &ControlState) -> Result<()> {
        self.documents.write().await.control_state = Some(state.clone());
        Ok(())
    }

    async fn save_automatic_decision(&self, decision: bool, now: DateTime<Utc>) -> Result<()> {
        let mut documents = self.documents.write().await;
        let state = documents.control_state.get_or_insert_with(|| ControlState::new(now));
        state.last_automatic_decision = decision;
        state.timestamp = now;
        Ok(())
    }

    async fn load_cooling_config(&self) -> Result<Option<CoolingConfig>> {
        Ok(self.documents.read().await.cooling_config.clone())
    }

    async fn save_cooling_config(&self, config: &CoolingConfig) -> Result<()> {
        self.documents.write().await.cooling_config = Some(config.clone());
        Ok(())
    }

    async fn load_latest_reading(&self) -> Result<Option<SensorSnapshot>> {
        Ok(self.documents.read().await.latest_reading.clone())
    }

    async fn save_latest_reading(&self, snapshot: &SensorSnapshot) -> Result<()> {
        self.documents.write().await.latest_reading = Some(snapshot.clone());
        Ok(())
    }

    async fn append_history(&self, snapshot: &SensorSnapshot) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.history.push_back(snapshot.clone());
        while documents.history.len() > self.history_capacity {
            documents.history.pop_front();
        }
        Ok(())
    }

    async fn query_history(
        &self,
        limit: usize,
        start_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<SensorSnapshot>> {
        let documents = self.documents.read().await;
        let mut entries: Vec<SensorSnapshot> = documents
            .history
            .iter()
            .rev()
            .filter(|s| match (start_after, s.timestamp) {
                (Some(cursor), Some(ts)) => ts < cursor,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();

        // Stable sort keeps later inserts first on equal timestamps
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}
