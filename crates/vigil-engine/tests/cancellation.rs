use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use vigil_engine::types::TEMPERATURE;
use vigil_engine::{
    AssetId, EngineConfig, EngineResult, FusionPort, FusionRequest, FusionResult, Monitor,
    MonitorEvent, Reading, TelemetrySource,
};

struct SteadySource;

#[async_trait]
impl TelemetrySource for SteadySource {
    async fn latest_reading(&self, asset_id: &AssetId) -> EngineResult<Reading> {
        Ok(Reading::new(asset_id.clone(), Utc::now()).with_channel(TEMPERATURE, Some(70.0)))
    }
}

/// Predictor that answers with critical risk only once released.
#[derive(Default)]
struct BlockingPort {
    calls: AtomicUsize,
    release: Notify,
}

#[async_trait]
impl FusionPort for BlockingPort {
    async fn predict(&self, _request: &FusionRequest) -> EngineResult<FusionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(FusionResult {
            fused_risk: 0.95,
            ..Default::default()
        })
    }
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.window.length = 3;
    config.polling.interval = Duration::from_millis(100);
    config
}

#[tokio::test(start_paused = true)]
async fn stopped_session_never_applies_late_result() {
    let port = Arc::new(BlockingPort::default());
    let monitor = Monitor::new(config(), Arc::new(SteadySource), port.clone()).unwrap();
    let asset = AssetId::new("kiln-1");

    monitor.start_monitoring(asset.clone()).unwrap();

    // Ticks at 0, 100 and 200ms fill the window; later ticks see the slot taken
    tokio::time::sleep(Duration::from_millis(650)).await;
    assert_eq!(port.calls.load(Ordering::SeqCst), 1);
    assert!(monitor.is_fusion_in_flight(&asset));

    monitor.stop_monitoring(&asset).await.unwrap();
    port.release.notify_waiters();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(monitor.alerts().recent_alerts().is_empty());
    assert!(monitor.alerts().cooldown_until(&asset).is_none());
    assert_eq!(port.calls.load(Ordering::SeqCst), 1);
    assert!(!monitor.is_fusion_in_flight(&asset));
}

#[tokio::test(start_paused = true)]
async fn pending_request_does_not_stall_ingestion() {
    let port = Arc::new(BlockingPort::default());
    let monitor = Monitor::new(config(), Arc::new(SteadySource), port.clone()).unwrap();
    let asset = AssetId::new("kiln-2");
    let mut events = monitor.subscribe();

    monitor.start_monitoring(asset.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(950)).await;

    let mut ingested = 0;
    while let Ok(event) = events.try_recv() {
        if let MonitorEvent::ReadingIngested { .. } = event {
            ingested += 1;
        }
    }
    assert!(ingested >= 9, "only {ingested} readings ingested");
    assert_eq!(port.calls.load(Ordering::SeqCst), 1);

    let snapshot = monitor.snapshot(&asset).unwrap();
    assert_eq!(snapshot.window_len, 3);
    assert!(snapshot.last_result.is_none());

    // Release the round trip; the result lands on the live session
    port.release.notify_one();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(monitor.alerts().recent_alerts().len(), 1);
    assert!(monitor.snapshot(&asset).unwrap().last_result.is_some());

    monitor.stop_all().await;
}
