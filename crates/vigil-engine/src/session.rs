//! Per-asset monitoring session.
//!
//! A session owns one asset's buffer, anomaly history and countdown. The
//! tick pipeline is split in two halves so the polling loop can keep its
//! cadence while a fusion round trip is pending: [`MonitorSession::ingest`]
//! runs synchronously on every reading, [`MonitorSession::apply`] runs when a
//! fusion result arrives.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::aggregate::{self, AggregateSet};
use crate::alert::AlertManager;
use crate::anomaly::{AnomalyHistory, CountdownEstimator};
use crate::buffer::SlidingWindowBuffer;
use crate::config::EngineConfig;
use crate::fusion::{FusionClient, FusionSkip, PendingFusion};
use crate::monitor::MonitorEvent;
use crate::telemetry::TelemetryIngestor;
use crate::types::{Alert, AssetId, FusionResult, Reading};

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub asset_id: AssetId,
    pub latest: Option<Reading>,
    pub window_len: usize,
    pub retained_len: usize,
    pub aggregates: AggregateSet,
    pub last_result: Option<FusionResult>,
    /// Approximate seconds until fused risk reaches 1.
    pub countdown_secs: Option<u64>,
    pub taken_at: DateTime<Utc>,
}

/// Outcome of the synchronous half of a tick.
pub struct Ingested {
    /// Window length after the push.
    pub window_len: usize,
    /// Claimed request, or why none was issued.
    pub fusion: Result<PendingFusion, FusionSkip>,
}

/// Outcome of a full inline tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub window_len: usize,
    pub result: Option<FusionResult>,
    pub skipped: Option<FusionSkip>,
    pub countdown_secs: Option<u64>,
    pub alert: Option<Alert>,
}

/// Analysis state for one monitored asset.
pub struct MonitorSession {
    asset_id: AssetId,
    polling_interval: Duration,
    buffer: SlidingWindowBuffer,
    history: AnomalyHistory,
    estimator: CountdownEstimator,
    fusion: FusionClient,
    alerts: Arc<AlertManager>,
    events: broadcast::Sender<MonitorEvent>,
    last_result: Option<FusionResult>,
    countdown: Option<u64>,
    last_aggregates: AggregateSet,
}

impl MonitorSession {
    /// Create a session with empty buffers.
    pub fn new(
        asset_id: AssetId,
        config: &EngineConfig,
        fusion: FusionClient,
        alerts: Arc<AlertManager>,
        events: broadcast::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            asset_id,
            polling_interval: config.polling.interval,
            buffer: SlidingWindowBuffer::from_config(&config.window),
            history: AnomalyHistory::new(config.trend.history_capacity),
            estimator: CountdownEstimator::from_config(config.polling.interval, &config.trend),
            fusion,
            alerts,
            events,
            last_result: None,
            countdown: None,
            last_aggregates: AggregateSet::default(),
        }
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    /// Buffer the reading, recompute aggregates and try to claim a fusion
    /// request.
    pub fn ingest(&mut self, reading: Reading) -> Ingested {
        let window = self.buffer.push(reading);
        let aggregates = aggregate::compute(&window);
        let window_len = window.len();
        let fusion = self.fusion.prepare(&self.asset_id, &window, &aggregates);
        self.last_aggregates = aggregates;

        if matches!(fusion, Err(FusionSkip::InFlight)) {
            debug!(asset_id = %self.asset_id, "Fusion still in flight, skipping request");
        }

        let _ = self.events.send(MonitorEvent::ReadingIngested {
            asset_id: self.asset_id.clone(),
            window_len,
        });

        Ingested { window_len, fusion }
    }

    /// Fold a fusion result into the history, countdown and alerts.
    pub fn apply(&mut self, result: FusionResult, now: DateTime<Utc>) -> (Option<u64>, Option<Alert>) {
        self.history.record_at(now, result.ae_scaled_score);
        self.countdown = self.estimator.estimate(&self.history, result.fused_risk);
        self.last_result = Some(result);

        let _ = self.events.send(MonitorEvent::FusionCompleted {
            asset_id: self.asset_id.clone(),
            result,
        });
        let _ = self.events.send(MonitorEvent::CountdownUpdated {
            asset_id: self.asset_id.clone(),
            seconds: self.countdown,
        });

        let alert = self.alerts.evaluate(&self.asset_id, &result, now);
        if let Some(alert) = &alert {
            let _ = self.events.send(MonitorEvent::AlertRaised(alert.clone()));
        }

        (self.countdown, alert)
    }

    /// Run a whole tick inline, awaiting the fusion round trip.
    pub async fn tick(&mut self, reading: Reading, now: DateTime<Utc>) -> TickReport {
        let Ingested { window_len, fusion } = self.ingest(reading);
        let mut report = TickReport {
            window_len,
            countdown_secs: self.countdown,
            ..Default::default()
        };

        match fusion {
            Ok(pending) => match pending.resolve().await {
                Some(result) => {
                    let (countdown, alert) = self.apply(result, now);
                    report.result = Some(result);
                    report.countdown_secs = countdown;
                    report.alert = alert;
                }
                None => self.report_dropped(),
            },
            Err(skip) => report.skipped = Some(skip),
        }

        report
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            asset_id: self.asset_id.clone(),
            latest: self.buffer.latest().cloned(),
            window_len: self.buffer.window().len(),
            retained_len: self.buffer.len(),
            aggregates: self.last_aggregates.clone(),
            last_result: self.last_result,
            countdown_secs: self.countdown,
            taken_at: Utc::now(),
        }
    }

    pub fn last_result(&self) -> Option<&FusionResult> {
        self.last_result.as_ref()
    }

    pub fn countdown(&self) -> Option<u64> {
        self.countdown
    }

    pub fn history(&self) -> &AnomalyHistory {
        &self.history
    }

    fn report_dropped(&self) {
        let _ = self.events.send(MonitorEvent::FusionDropped {
            asset_id: self.asset_id.clone(),
        });
    }

    /// Polling loop. Returns when the stop signal flips or its sender is
    /// dropped; a pending round trip is aborted on exit and its result is
    /// never applied.
    pub(crate) async fn run(
        mut self,
        ingestor: TelemetryIngestor,
        mut stop_rx: watch::Receiver<bool>,
        snapshots: Arc<DashMap<AssetId, SessionSnapshot>>,
    ) {
        let mut ticker = tokio::time::interval(self.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (result_tx, mut result_rx) = mpsc::channel::<Option<FusionResult>>(1);
        // Round trips outlive the in-flight slot by the final send, so more
        // than one task may briefly exist.
        let mut pending: Vec<AbortOnDrop> = Vec::new();

        info!(asset_id = %self.asset_id, interval_ms = self.polling_interval.as_millis() as u64, "Session started");

        loop {
            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }

                Some(outcome) = result_rx.recv() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                    match outcome {
                        Some(result) => {
                            self.apply(result, Utc::now());
                        }
                        None => self.report_dropped(),
                    }
                    snapshots.insert(self.asset_id.clone(), self.snapshot());
                }

                _ = ticker.tick() => {
                    let Some(reading) = ingestor.poll(&self.asset_id).await else {
                        continue;
                    };

                    let Ingested { fusion, .. } = self.ingest(reading);
                    if let Ok(request) = fusion {
                        let tx = result_tx.clone();
                        pending.retain(|task| !task.0.is_finished());
                        pending.push(AbortOnDrop(tokio::spawn(async move {
                            let outcome = request.resolve().await;
                            let _ = tx.send(outcome).await;
                        })));
                    }
                    snapshots.insert(self.asset_id.clone(), self.snapshot());
                }
            }
        }

        drop(pending);
        info!(asset_id = %self.asset_id, "Session stopped");
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
