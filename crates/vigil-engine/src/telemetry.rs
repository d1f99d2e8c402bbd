//! Telemetry sources and the per-tick ingestor.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::types::{AssetId, Reading};

/// Source of periodic asset telemetry.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Assets the source knows about.
    ///
    /// Sources without discovery leave manual asset entry as the only path.
    async fn list_assets(&self) -> EngineResult<Vec<AssetId>> {
        Err(EngineError::Unsupported("list_assets"))
    }

    /// Most recent reading for an asset.
    async fn latest_reading(&self, asset_id: &AssetId) -> EngineResult<Reading>;
}

/// Pulls one normalized reading per polling tick.
///
/// Transient source failures are logged and turned into a skipped tick.
#[derive(Clone)]
pub struct TelemetryIngestor {
    source: Arc<dyn TelemetrySource>,
}

impl TelemetryIngestor {
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        Self { source }
    }

    /// Fetch the latest reading, or `None` if this tick should be skipped.
    pub async fn poll(&self, asset_id: &AssetId) -> Option<Reading> {
        match self.source.latest_reading(asset_id).await {
            Ok(reading) => {
                let reading = reading.normalized(asset_id);
                debug!(asset_id = %asset_id, timestamp = %reading.timestamp, "Reading ingested");
                Some(reading)
            }
            Err(e) => {
                warn!(asset_id = %asset_id, error = %e, "Telemetry poll failed, skipping tick");
                None
            }
        }
    }

    /// Known assets, or empty when discovery is unavailable.
    pub async fn list_assets(&self) -> Vec<AssetId> {
        match self.source.list_assets().await {
            Ok(assets) => assets,
            Err(EngineError::Unsupported(_)) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Asset listing failed");
                Vec::new()
            }
        }
    }
}
