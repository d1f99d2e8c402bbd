//! HTTP client for the predictive maintenance service.
//!
//! Speaks the reference HTTP+JSON API: `/health`, `/devices`,
//! `/latest/{asset}` and `/predict/fusion`. Malformed documents degrade to
//! absent or zero fields rather than failing the tick.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, Response, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::fusion::{FusionPort, FusionRequest};
use crate::telemetry::TelemetrySource;
use crate::types::{AssetId, FusionResult, Reading, WIRE_CHANNELS};

/// Document keys that are never treated as telemetry channels.
const BOOKKEEPING_FIELDS: [&str; 5] = ["_id", "device_id", "device_type", "timestamp", "label"];

/// Client for the predictive maintenance HTTP API.
#[derive(Debug, Clone)]
pub struct PredictiveServiceClient {
    client: Client,
    base_url: Url,
}

/// Fusion response as sent by the service. Every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FusionResponse {
    failure_prob_lstm: Option<f64>,
    prob_failure_rf: Option<f64>,
    ae_score: Option<f64>,
    ae_scaled: Option<f64>,
    health_score: Option<f64>,
    fused_risk: Option<f64>,
    /// Present when the service fell back to placeholder scores.
    error: Option<String>,
}

impl FusionResponse {
    fn into_result(self) -> EngineResult<FusionResult> {
        if let Some(reason) = self.error {
            return Err(EngineError::FusionRejected(reason));
        }
        Ok(FusionResult {
            fused_risk: self.fused_risk.unwrap_or(0.0),
            lstm_failure_prob: self.failure_prob_lstm.unwrap_or(0.0),
            rf_failure_prob: self.prob_failure_rf.unwrap_or(0.0),
            ae_raw_score: self.ae_score.unwrap_or(0.0),
            ae_scaled_score: self.ae_scaled.unwrap_or(0.0),
            health_score: self.health_score.unwrap_or(0.0),
        })
    }
}

impl PredictiveServiceClient {
    /// Create a client for the service at `endpoint`.
    pub fn new(endpoint: &str, timeout: Duration) -> EngineResult<Self> {
        let base_url = Url::parse(endpoint).map_err(|e| {
            EngineError::Configuration(format!("invalid service endpoint {endpoint}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::Configuration(format!(
                "service endpoint {endpoint} cannot carry a path"
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// Service base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check service health.
    pub async fn health_check(&self) -> EngineResult<Value> {
        self.get(&["health"]).await
    }

    fn url(&self, segments: &[&str]) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EngineError::Configuration("service endpoint cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> EngineResult<T> {
        let url = self.url(segments)?;
        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> EngineResult<T> {
        let url = self.url(segments)?;
        let response = self.client.post(url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> EngineResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Upstream {
                status: status.as_u16(),
                path: response.url().path().to_string(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl TelemetrySource for PredictiveServiceClient {
    async fn list_assets(&self) -> EngineResult<Vec<AssetId>> {
        let ids: Vec<String> = self.get(&["devices"]).await?;
        Ok(ids.into_iter().map(AssetId::from).collect())
    }

    async fn latest_reading(&self, asset_id: &AssetId) -> EngineResult<Reading> {
        let doc: Value = self.get(&["latest", asset_id.as_str()]).await?;
        Ok(reading_from_document(asset_id, &doc))
    }
}

#[async_trait]
impl FusionPort for PredictiveServiceClient {
    async fn predict(&self, request: &FusionRequest) -> EngineResult<FusionResult> {
        let response: FusionResponse = self.post(&["predict", "fusion"], request).await?;
        response.into_result()
    }
}

/// Build a reading from a latest-reading document.
///
/// Missing channels become absent; extra numeric fields become extra channels.
pub fn reading_from_document(asset_id: &AssetId, doc: &Value) -> Reading {
    let asset = doc
        .get("device_id")
        .and_then(Value::as_str)
        .map(AssetId::from)
        .unwrap_or_else(|| asset_id.clone());
    let timestamp = doc
        .get("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    let mut reading = Reading::new(asset, timestamp);
    for channel in WIRE_CHANNELS {
        reading = reading.with_channel(channel, doc.get(channel).and_then(Value::as_f64));
    }

    if let Some(fields) = doc.as_object() {
        for (key, value) in fields {
            if BOOKKEEPING_FIELDS.contains(&key.as_str()) || reading.channels.contains_key(key) {
                continue;
            }
            if let Some(v) = value.as_f64() {
                reading.channels.insert(key.clone(), Some(v));
            }
        }
    }

    reading
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        Value::Number(ms) => ms
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        // Extended JSON: {"$date": ...}
        Value::Object(map) => map.get("$date").and_then(parse_timestamp),
        _ => None,
    }
}
