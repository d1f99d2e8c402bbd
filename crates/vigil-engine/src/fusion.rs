//! Rate-limited prediction requests against the external fusion predictor.
//!
//! At most one request per asset is outstanding at any time. The in-flight
//! slot is held by a guard owned by the pending request, so it is released
//! when the request completes, fails, or is dropped mid-flight.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::AggregateSet;
use crate::buffer::Window;
use crate::error::EngineResult;
use crate::types::{AssetId, FusionResult, WIRE_CHANNELS};

/// The external multi-model predictor.
#[async_trait]
pub trait FusionPort: Send + Sync {
    /// Run one fused prediction over a window and its aggregates.
    async fn predict(&self, request: &FusionRequest) -> EngineResult<FusionResult>;
}

/// Wire payload for a fusion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionRequest {
    /// One `[temperature, vibration, rpm, humidity]` row per reading.
    pub window: Vec<[f64; 4]>,

    /// Aggregates flattened to `{channel}_mean` / `{channel}_std`.
    pub agg: BTreeMap<String, f64>,
}

impl FusionRequest {
    /// Build the payload. Absent values become 0 here and nowhere else.
    pub fn build(window: &Window<'_>, aggregates: &AggregateSet) -> Self {
        let rows = window
            .iter()
            .map(|reading| WIRE_CHANNELS.map(|channel| reading.value(channel).unwrap_or(0.0)))
            .collect();

        Self {
            window: rows,
            agg: aggregates.flatten(&WIRE_CHANNELS),
        }
    }
}

/// Why no request was issued this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionSkip {
    /// The window has not reached the analysis length yet.
    WarmingUp { have: usize, need: usize },
    /// A request for this asset is still outstanding.
    InFlight,
}

/// Issues fusion requests with a per-asset in-flight guard.
#[derive(Clone)]
pub struct FusionClient {
    port: Arc<dyn FusionPort>,
    analysis_len: usize,
    in_flight: Arc<DashMap<AssetId, DateTime<Utc>>>,
}

impl FusionClient {
    /// Create a client that only fires on windows of `analysis_len` readings.
    pub fn new(port: Arc<dyn FusionPort>, analysis_len: usize) -> Self {
        Self {
            port,
            analysis_len,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Claim the asset's request slot and build the payload.
    pub fn prepare(
        &self,
        asset_id: &AssetId,
        window: &Window<'_>,
        aggregates: &AggregateSet,
    ) -> Result<PendingFusion, FusionSkip> {
        if window.len() < self.analysis_len {
            return Err(FusionSkip::WarmingUp {
                have: window.len(),
                need: self.analysis_len,
            });
        }

        let guard = self.try_claim(asset_id).ok_or(FusionSkip::InFlight)?;

        Ok(PendingFusion {
            port: self.port.clone(),
            request: FusionRequest::build(window, aggregates),
            guard,
        })
    }

    /// Whether a request for this asset is outstanding.
    pub fn is_in_flight(&self, asset_id: &AssetId) -> bool {
        self.in_flight.contains_key(asset_id)
    }

    /// When the outstanding request for this asset was issued.
    pub fn in_flight_since(&self, asset_id: &AssetId) -> Option<DateTime<Utc>> {
        self.in_flight.get(asset_id).map(|since| *since)
    }

    /// Analysis length a window must reach before a request fires.
    pub fn analysis_len(&self) -> usize {
        self.analysis_len
    }

    fn try_claim(&self, asset_id: &AssetId) -> Option<InFlightGuard> {
        match self.in_flight.entry(asset_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Some(InFlightGuard {
                    asset_id: asset_id.clone(),
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }
}

/// A claimed, not yet resolved, fusion request.
pub struct PendingFusion {
    port: Arc<dyn FusionPort>,
    request: FusionRequest,
    guard: InFlightGuard,
}

impl PendingFusion {
    /// Asset the request was issued for.
    pub fn asset_id(&self) -> &AssetId {
        &self.guard.asset_id
    }

    /// Payload that will be sent.
    pub fn request(&self) -> &FusionRequest {
        &self.request
    }

    /// Perform the round trip. Failures are logged and yield `None`.
    pub async fn resolve(self) -> Option<FusionResult> {
        let PendingFusion {
            port,
            request,
            guard,
        } = self;

        debug!(asset_id = %guard.asset_id, rows = request.window.len(), "Requesting fusion");

        let outcome = port.predict(&request).await;
        let asset_id = guard.asset_id.clone();
        drop(guard);

        match outcome {
            Ok(result) => Some(result.clamped()),
            Err(e) => {
                warn!(asset_id = %asset_id, error = %e, "Fusion request dropped");
                None
            }
        }
    }
}

/// Releases the asset's in-flight slot on drop.
struct InFlightGuard {
    asset_id: AssetId,
    in_flight: Arc<DashMap<AssetId, DateTime<Utc>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.asset_id);
    }
}
