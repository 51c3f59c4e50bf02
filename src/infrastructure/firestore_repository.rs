// Firestore REST repository implementation
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::control::ControlState;
use crate::domain::cooling::CoolingConfig;
use crate::domain::sensor::SensorSnapshot;
use crate::infrastructure::config::{FirestoreSettings, StoreSettings};
use crate::infrastructure::firestore_value::{decode_fields, encode_fields, TIMESTAMP_FIELD};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FirestoreRepository {
    client: reqwest::Client,
    documents_url: String,
    access_token: Option<String>,
    paths: StoreSettings,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RunQueryResponse {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

impl FirestoreRepository {
    pub fn new(firestore: &FirestoreSettings, paths: StoreSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(firestore.timeout_secs))
            .build()
            .context("Failed to build Firestore HTTP client")?;

        Ok(Self {
            client,
            documents_url: format!(
                "{}/projects/{}/databases/{}/documents",
                firestore.api_base.trim_end_matches('/'),
                urlencoding::encode(&firestore.project_id),
                urlencoding::encode(&firestore.database),
            ),
            access_token: firestore.access_token.clone().filter(|t| !t.is_empty()),
            paths,
        })
    }

    fn document_url(&self, path: &str) -> String {
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}", self.documents_url, segments.join("/"))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn ensure_success(response: Response, target: &str) -> Result<Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Firestore request for {} failed with status {}: {}", target, status, body);
        }
        Ok(response)
    }

    fn decode_document<T: DeserializeOwned>(document: &FirestoreDocument, target: &str) -> Result<T> {
        let value = decode_fields(&document.fields)?;
        serde_json::from_value(value).with_context(|| format!("Unexpected shape for Firestore document {}", target))
    }

    async fn get_document<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self
            .authorize(self.client.get(self.document_url(path)))
            .send()
            .await
            .with_context(|| format!("Failed to fetch Firestore document {}", path))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document = Self::ensure_success(response, path)
            .await?
            .json::<FirestoreDocument>()
            .await
            .context("Failed to parse Firestore document")?;

        Self::decode_document(&document, path).map(Some)
    }

    /// Create or fully replace a document.
    async fn put_document<T: Serialize>(&self, path: &str, value: &T) -> Result<()> {
        let body = json!({ "fields": encode_fields(&serde_json::to_value(value)?)? });
        let response = self
            .authorize(self.client.patch(self.document_url(path)).json(&body))
            .send()
            .await
            .with_context(|| format!("Failed to write Firestore document {}", path))?;

        Self::ensure_success(response, path).await?;
        tracing::debug!("Wrote Firestore document {}", path);
        Ok(())
    }
}

/// Control state field owned by the automatic controller.
const LAST_AUTOMATIC_DECISION_FIELD: &str = "lastAutomaticDecision";

/// Structured query for a page of history, newest first.
fn history_query(collection: &str, limit: usize, start_after: Option<DateTime<Utc>>) -> Value {
    let mut query = json!({
        "from": [{ "collectionId": collection }],
        "orderBy": [{ "field": { "fieldPath": TIMESTAMP_FIELD }, "direction": "DESCENDING" }],
        "limit": limit,
    });

    if let Some(cursor) = start_after {
        query["where"] = json!({
            "fieldFilter": {
                "field": { "fieldPath": TIMESTAMP_FIELD },
                "op": "LESS_THAN",
                "value": { "timestampValue": cursor.to_rfc3339_opts(SecondsFormat::Micros, true) }
            }
        });
    }

    json!({ "structuredQuery": query })
}

#[async_trait]
impl TelemetryStore for FirestoreRepository {
    async fn load_control_state(&self) -> Result<Option<ControlState>> {
        self.get_document(&self.paths.control_state).await
    }

    async fn save_control_state(&self, state: &ControlState) -> Result<()> {
        self.put_document(&self.paths.control_state, state).await
    }

    async fn save_automatic_decision(&self, decision: bool, now: DateTime<Utc>) -> Result<()> {
        let path = &self.paths.control_state;
        let body = json!({
            "fields": encode_fields(&json!({
                LAST_AUTOMATIC_DECISION_FIELD: decision,
                TIMESTAMP_FIELD: now,
            }))?
        });
        // The mask limits the write to these fields; mode and operator state stay as stored
        let request = self
            .client
            .patch(self.document_url(path))
            .query(&[
                ("updateMask.fieldPaths", LAST_AUTOMATIC_DECISION_FIELD),
                ("updateMask.fieldPaths", TIMESTAMP_FIELD),
            ])
            .json(&body);
        let response = self
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Failed to update automatic decision in {}", path))?;

        Self::ensure_success(response, path).await?;
        tracing::debug!(decision, "Updated automatic decision in {}", path);
        Ok(())
    }

    async fn load_cooling_config(&self) -> Result<Option<CoolingConfig>> {
        self.get_document(&self.paths.cooling_settings).await
    }

    async fn save_cooling_config(&self, config: &CoolingConfig) -> Result<()> {
        self.put_document(&self.paths.cooling_settings, config).await
    }

    async fn load_latest_reading(&self) -> Result<Option<SensorSnapshot>> {
        self.get_document(&self.paths.latest_reading).await
    }

    async fn save_latest_reading(&self, snapshot: &SensorSnapshot) -> Result<()> {
        self.put_document(&self.paths.latest_reading, snapshot).await
    }

    async fn append_history(&self, snapshot: &SensorSnapshot) -> Result<()> {
        let collection = &self.paths.history_collection;
        let body = json!({ "fields": encode_fields(&serde_json::to_value(snapshot)?)? });
        let response = self
            .authorize(self.client.post(self.document_url(collection)).json(&body))
            .send()
            .await
            .with_context(|| format!("Failed to append to Firestore collection {}", collection))?;

        Self::ensure_success(response, collection).await?;
        Ok(())
    }

    async fn query_history(
        &self,
        limit: usize,
        start_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<SensorSnapshot>> {
        let collection = &self.paths.history_collection;
        let body = history_query(collection, limit, start_after);

        tracing::debug!("Executing Firestore history query: {}", body);
        let response = self
            .authorize(self.client.post(format!("{}:runQuery", self.documents_url)).json(&body))
            .send()
            .await
            .context("Failed to send history query to Firestore")?;

        let rows = Self::ensure_success(response, collection)
            .await?
            .json::<Vec<RunQueryResponse>>()
            .await
            .context("Failed to parse Firestore query response")?;

        // Rows without a document only carry read metadata
        rows.iter()
            .filter_map(|row| row.document.as_ref())
            .map(|document| Self::decode_document(document, collection))
            .collect()
    }
}
