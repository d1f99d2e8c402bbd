//! Daemon lifecycle: wire the engine, monitor one asset, report events.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use vigil_engine::simulation::{SimulatedPredictor, SimulatedSource};
use vigil_engine::{
    AlertLevel, AssetId, FusionPort, Monitor, MonitorEvent, PredictiveServiceClient,
    TelemetrySource,
};

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};

/// What the daemon should do once wired up.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Asset to monitor; the first listed asset when unset.
    pub asset: Option<String>,

    /// Print known assets and exit.
    pub list_assets: bool,

    /// Use the offline simulation instead of the predictive service.
    pub simulate: bool,
}

/// Telemetry source and predictor for the configured mode.
pub async fn build_backends(
    config: &DaemonConfig,
    simulate: bool,
) -> DaemonResult<(Arc<dyn TelemetrySource>, Arc<dyn FusionPort>)> {
    if simulate {
        info!(devices = config.simulation.devices, "Using simulated fleet");
        let source: Arc<dyn TelemetrySource> =
            Arc::new(SimulatedSource::new(config.simulation.clone()));
        let predictor: Arc<dyn FusionPort> = Arc::new(SimulatedPredictor::new());
        return Ok((source, predictor));
    }

    let client = Arc::new(PredictiveServiceClient::new(
        &config.service.endpoint,
        config.request_timeout(),
    )?);

    if config.service.probe_health {
        match client.health_check().await {
            Ok(status) => info!(endpoint = %client.base_url(), %status, "Predictive service reachable"),
            Err(e) => warn!(endpoint = %client.base_url(), error = %e, "Predictive service health check failed"),
        }
    }

    let source: Arc<dyn TelemetrySource> = client.clone();
    let predictor: Arc<dyn FusionPort> = client;
    Ok((source, predictor))
}

/// Pick the asset to monitor.
pub fn select_asset(requested: Option<&str>, listed: &[AssetId]) -> DaemonResult<AssetId> {
    match requested {
        Some(id) if !id.trim().is_empty() => Ok(AssetId::new(id.trim())),
        _ => listed.first().cloned().ok_or(DaemonError::NoAssets),
    }
}

/// Run the daemon until a shutdown signal arrives.
pub async fn run(config: DaemonConfig, options: RunOptions) -> DaemonResult<()> {
    let (source, predictor) = build_backends(&config, options.simulate).await?;
    let monitor = Monitor::new(config.to_engine_config(), source, predictor)?;

    let assets = monitor.ingestor().list_assets().await;
    if options.list_assets {
        for asset in &assets {
            println!("{asset}");
        }
        return Ok(());
    }

    let asset = select_asset(options.asset.as_deref(), &assets)?;
    let reporter = tokio::spawn(report_events(monitor.subscribe()));

    monitor.start_monitoring(asset.clone())?;
    info!(asset_id = %asset, known_assets = assets.len(), "Vigil daemon running");

    let outcome = shutdown_signal().await;

    monitor.stop_all().await;
    reporter.abort();
    info!("Vigil daemon stopped");

    outcome
}

/// Log monitor events until the channel closes.
pub async fn report_events(mut events: broadcast::Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => log_event(&event),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event reporter lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::MonitoringStarted { asset_id } => {
            info!(asset_id = %asset_id, "Monitoring started")
        }
        MonitorEvent::MonitoringStopped { asset_id } => {
            info!(asset_id = %asset_id, "Monitoring stopped")
        }
        MonitorEvent::ReadingIngested {
            asset_id,
            window_len,
        } => debug!(asset_id = %asset_id, window_len, "Reading ingested"),
        MonitorEvent::FusionCompleted { asset_id, result } => info!(
            asset_id = %asset_id,
            fused_risk = result.fused_risk,
            lstm = result.lstm_failure_prob,
            rf = result.rf_failure_prob,
            ae_scaled = result.ae_scaled_score,
            health = result.health_score,
            "Fusion result"
        ),
        MonitorEvent::FusionDropped { asset_id } => {
            warn!(asset_id = %asset_id, "Fusion dropped for this tick")
        }
        MonitorEvent::CountdownUpdated { asset_id, seconds } => match seconds {
            Some(secs) => info!(
                asset_id = %asset_id,
                countdown_secs = secs,
                "Approximate time to failure threshold (trend estimate)"
            ),
            None => debug!(asset_id = %asset_id, "No countdown: anomaly trend flat or short"),
        },
        MonitorEvent::AlertRaised(alert) => match alert.level {
            AlertLevel::Critical => {
                error!(asset_id = %alert.asset_id, alert_id = %alert.id, "{}", alert.message)
            }
            AlertLevel::Warning => {
                warn!(asset_id = %alert.asset_id, alert_id = %alert.id, "{}", alert.message)
            }
        },
    }
}

#[cfg(unix)]
async fn terminate() -> std::io::Result<()> {
    let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    signal.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> std::io::Result<()> {
    std::future::pending().await
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() -> DaemonResult<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        result = terminate() => {
            result?;
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
    Ok(())
}
