//! Process-wide monitor for continuous asset monitoring.
//!
//! The Monitor runs one session task per monitored asset and shares a single
//! fusion client and alert manager between them, so in-flight guards,
//! cooldowns and the alert log outlive individual sessions.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::alert::AlertManager;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fusion::{FusionClient, FusionPort};
use crate::session::{MonitorSession, SessionSnapshot};
use crate::telemetry::{TelemetryIngestor, TelemetrySource};
use crate::types::{Alert, AssetId, FusionResult};

/// Events emitted by the monitor and its sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A session was started.
    MonitoringStarted { asset_id: AssetId },

    /// A session was stopped.
    MonitoringStopped { asset_id: AssetId },

    /// A reading entered the buffer.
    ReadingIngested { asset_id: AssetId, window_len: usize },

    /// A fusion result was applied.
    FusionCompleted {
        asset_id: AssetId,
        result: FusionResult,
    },

    /// A fusion request failed; the tick produced no result.
    FusionDropped { asset_id: AssetId },

    /// Countdown recomputed. `None` means no estimate.
    CountdownUpdated {
        asset_id: AssetId,
        seconds: Option<u64>,
    },

    /// An alert was raised.
    AlertRaised(Alert),
}

/// Running session task.
struct SessionHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Monitor for a set of assets.
pub struct Monitor {
    /// Configuration.
    config: EngineConfig,

    /// Telemetry ingestor shared by all sessions.
    ingestor: TelemetryIngestor,

    /// Fusion client shared by all sessions.
    fusion: FusionClient,

    /// Alerting state, process-wide.
    alerts: Arc<AlertManager>,

    /// Running sessions.
    sessions: DashMap<AssetId, SessionHandle>,

    /// Latest snapshot per asset.
    snapshots: Arc<DashMap<AssetId, SessionSnapshot>>,

    /// Event broadcaster.
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl Monitor {
    /// Create a monitor over a telemetry source and a predictor.
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn TelemetrySource>,
        predictor: Arc<dyn FusionPort>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(1024);

        Ok(Self {
            ingestor: TelemetryIngestor::new(source),
            fusion: FusionClient::new(predictor, config.window.length),
            alerts: Arc::new(AlertManager::new(config.alerts.clone())),
            sessions: DashMap::new(),
            snapshots: Arc::new(DashMap::new()),
            event_tx,
            config,
        })
    }

    /// Subscribe to monitor events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    /// Start monitoring an asset. Must be called inside a Tokio runtime.
    #[instrument(skip(self))]
    pub fn start_monitoring(&self, asset_id: AssetId) -> EngineResult<()> {
        if asset_id.is_empty() {
            return Err(EngineError::Configuration("asset id must not be empty".to_string()));
        }

        let slot = match self.sessions.entry(asset_id.clone()) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyMonitoring(asset_id)),
            Entry::Vacant(slot) => slot,
        };

        info!(asset_id = %asset_id, "Starting monitoring");

        let session = MonitorSession::new(
            asset_id.clone(),
            &self.config,
            self.fusion.clone(),
            self.alerts.clone(),
            self.event_tx.clone(),
        );
        self.snapshots.insert(asset_id.clone(), session.snapshot());

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(session.run(self.ingestor.clone(), stop_rx, self.snapshots.clone()));
        slot.insert(SessionHandle { stop_tx, task });

        let _ = self
            .event_tx
            .send(MonitorEvent::MonitoringStarted { asset_id });

        Ok(())
    }

    /// Stop monitoring an asset.
    ///
    /// Returns once the session task has ended. A pending fusion round trip
    /// is abandoned and its result never reaches the alert manager.
    #[instrument(skip(self))]
    pub async fn stop_monitoring(&self, asset_id: &AssetId) -> EngineResult<()> {
        let (_, handle) = self
            .sessions
            .remove(asset_id)
            .ok_or_else(|| EngineError::NotMonitoring(asset_id.clone()))?;

        info!(asset_id = %asset_id, "Stopping monitoring");

        let _ = handle.stop_tx.send(true);
        handle.task.abort();
        if let Err(e) = handle.task.await {
            if !e.is_cancelled() {
                debug!(asset_id = %asset_id, error = %e, "Session task ended abnormally");
            }
        }

        self.snapshots.remove(asset_id);
        let _ = self.event_tx.send(MonitorEvent::MonitoringStopped {
            asset_id: asset_id.clone(),
        });

        Ok(())
    }

    /// Make `asset_id` the only monitored asset.
    ///
    /// Every other session is stopped; alert cooldowns and the alert log are
    /// kept.
    #[instrument(skip(self))]
    pub async fn switch_asset(&self, asset_id: AssetId) -> EngineResult<()> {
        for other in self.monitored_assets() {
            if other != asset_id {
                self.stop_monitoring(&other).await?;
            }
        }

        if self.is_monitoring(&asset_id) {
            return Ok(());
        }
        self.start_monitoring(asset_id)
    }

    /// Stop every session.
    pub async fn stop_all(&self) {
        for asset_id in self.monitored_assets() {
            // Concurrent stops may have removed it already
            let _ = self.stop_monitoring(&asset_id).await;
        }
    }

    pub fn is_monitoring(&self, asset_id: &AssetId) -> bool {
        self.sessions.contains_key(asset_id)
    }

    /// Monitored assets, sorted.
    pub fn monitored_assets(&self) -> Vec<AssetId> {
        let mut assets: Vec<AssetId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        assets.sort();
        assets
    }

    /// Latest snapshot of a monitored asset.
    pub fn snapshot(&self, asset_id: &AssetId) -> Option<SessionSnapshot> {
        self.snapshots.get(asset_id).map(|s| s.clone())
    }

    /// Shared alert manager.
    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    /// Shared telemetry ingestor.
    pub fn ingestor(&self) -> &TelemetryIngestor {
        &self.ingestor
    }

    /// Whether a fusion request for the asset is outstanding.
    pub fn is_fusion_in_flight(&self, asset_id: &AssetId) -> bool {
        self.fusion.is_in_flight(asset_id)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        for entry in self.sessions.iter() {
            entry.value().task.abort();
        }
    }
}
