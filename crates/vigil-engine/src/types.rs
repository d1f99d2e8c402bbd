//! Core domain types shared by every stage of the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel carrying the asset temperature.
pub const TEMPERATURE: &str = "temperature";
/// Channel carrying the vibration amplitude.
pub const VIBRATION: &str = "vibration";
/// Channel carrying the shaft speed.
pub const RPM: &str = "rpm";
/// Channel carrying ambient humidity.
pub const HUMIDITY: &str = "humidity";

/// Channels sent to the predictor, in wire column order.
pub const WIRE_CHANNELS: [&str; 4] = [TEMPERATURE, VIBRATION, RPM, HUMIDITY];

/// Identifier of a monitored industrial asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create an asset id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AssetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One telemetry sample for an asset.
///
/// Channel values may be absent; absence is preserved through the buffer and
/// only resolved by the consumer that needs a concrete number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub asset_id: AssetId,
    pub timestamp: DateTime<Utc>,
    pub channels: BTreeMap<String, Option<f64>>,
}

impl Reading {
    /// Create a reading with no channels.
    pub fn new(asset_id: AssetId, timestamp: DateTime<Utc>) -> Self {
        Self {
            asset_id,
            timestamp,
            channels: BTreeMap::new(),
        }
    }

    /// Set a channel value (builder style).
    pub fn with_channel(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.channels.insert(name.into(), value);
        self
    }

    /// Present value of a channel, if any.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.channels.get(name).copied().flatten()
    }

    /// Fill a missing asset id and drop non-finite values to absent.
    pub fn normalized(mut self, asset_id: &AssetId) -> Self {
        if self.asset_id.is_empty() {
            self.asset_id = asset_id.clone();
        }
        for value in self.channels.values_mut() {
            if value.is_some_and(|v| !v.is_finite()) {
                *value = None;
            }
        }
        self
    }
}

/// Structured risk result returned by the external predictor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FusionResult {
    /// Fused failure likelihood in [0, 1].
    pub fused_risk: f64,
    /// LSTM sequence model failure probability.
    pub lstm_failure_prob: f64,
    /// Random forest failure probability over the aggregates.
    pub rf_failure_prob: f64,
    /// Autoencoder reconstruction error.
    pub ae_raw_score: f64,
    /// Autoencoder score mapped into [0, 1].
    pub ae_scaled_score: f64,
    /// Health score reported by the predictor (high means healthy).
    pub health_score: f64,
}

impl FusionResult {
    /// Force the probability-like fields into [0, 1]; NaN becomes 0.
    pub fn clamped(self) -> Self {
        Self {
            fused_risk: unit(self.fused_risk),
            lstm_failure_prob: unit(self.lstm_failure_prob),
            rf_failure_prob: unit(self.rf_failure_prob),
            ae_scaled_score: unit(self.ae_scaled_score),
            ..self
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

/// An alert raised for an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Synthetic id: asset id joined with the emission time in milliseconds.
    pub id: String,
    pub asset_id: AssetId,
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
