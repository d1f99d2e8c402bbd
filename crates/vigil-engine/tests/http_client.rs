use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use vigil_engine::types::{HUMIDITY, RPM, TEMPERATURE, VIBRATION};
use vigil_engine::{
    AlertLevel, AlertManager, AssetId, EngineConfig, EngineError, FusionClient, FusionPort,
    FusionRequest, MonitorSession, PredictiveServiceClient, TelemetryIngestor, TelemetrySource,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> PredictiveServiceClient {
    PredictiveServiceClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

fn fusion_body(fused_risk: f64) -> serde_json::Value {
    json!({
        "failure_prob_lstm": 0.82,
        "prob_failure_rf": 0.71,
        "ae_score": 0.024,
        "ae_scaled": 0.8,
        "health_score": 0.29,
        "fused_risk": fused_risk
    })
}

#[tokio::test]
async fn health_and_device_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["pump_1_aa", "fan_2_bb"])))
        .mount(&server)
        .await;

    let client = client(&server);
    let health = client.health_check().await.unwrap();
    assert_eq!(health["status"], "ok");

    let assets = client.list_assets().await.unwrap();
    assert_eq!(assets, vec![AssetId::new("pump_1_aa"), AssetId::new("fan_2_bb")]);
}

#[tokio::test]
async fn latest_reading_keeps_gaps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest/pump_1_aa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "66aa",
            "device_id": "pump_1_aa",
            "device_type": "pump",
            "timestamp": "2024-03-12T10:15:30",
            "temperature": 47.25,
            "vibration": null,
            "rpm": 1432.0,
            "label": 1
        })))
        .mount(&server)
        .await;

    let reading = client(&server)
        .latest_reading(&AssetId::new("pump_1_aa"))
        .await
        .unwrap();

    assert_eq!(reading.value(TEMPERATURE), Some(47.25));
    assert_eq!(reading.value(VIBRATION), None);
    assert_eq!(reading.value(RPM), Some(1432.0));
    assert_eq!(reading.value(HUMIDITY), None);
    assert_eq!(reading.timestamp.timestamp(), 1_710_238_530);
}

#[tokio::test]
async fn missing_device_is_upstream_error_and_skipped_tick() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "No data"})))
        .mount(&server)
        .await;

    let client = Arc::new(client(&server));
    let err = client.latest_reading(&AssetId::new("ghost")).await.unwrap_err();
    assert!(matches!(err, EngineError::Upstream { status: 404, .. }));

    let ingestor = TelemetryIngestor::new(client);
    assert!(ingestor.poll(&AssetId::new("ghost")).await.is_none());
}

#[tokio::test]
async fn fusion_round_trip_and_degraded_responses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict/fusion"))
        .and(body_partial_json(json!({"agg": {"temperature_mean": 40.0}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(fusion_body(0.78)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/predict/fusion"))
        .and(body_partial_json(json!({"agg": {"temperature_mean": 41.0}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "failure_prob_lstm": 0.5,
            "fused_risk": 0.5,
            "error": "Fusion model not available"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/predict/fusion"))
        .and(body_partial_json(json!({"agg": {"temperature_mean": 42.0}})))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = client(&server);
    let request = |temperature: f64| FusionRequest {
        window: vec![[temperature, 0.4, 1400.0, 40.0]],
        agg: [
            ("temperature_mean".to_string(), temperature),
            ("temperature_std".to_string(), 0.0),
        ]
        .into_iter()
        .collect(),
    };

    let result = client.predict(&request(40.0)).await.unwrap();
    assert_eq!(result.fused_risk, 0.78);
    assert_eq!(result.lstm_failure_prob, 0.82);
    assert_eq!(result.rf_failure_prob, 0.71);
    assert_eq!(result.ae_scaled_score, 0.8);

    assert!(matches!(
        client.predict(&request(41.0)).await,
        Err(EngineError::FusionRejected(_))
    ));
    assert!(matches!(
        client.predict(&request(42.0)).await,
        Err(EngineError::Decode(_))
    ));
}

#[tokio::test]
async fn session_over_http_raises_alert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict/fusion"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fusion_body(0.81)))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = EngineConfig::default();
    config.window.length = 3;
    let http = Arc::new(client(&server));
    let alerts = Arc::new(AlertManager::new(config.alerts.clone()));
    let (events, _rx) = broadcast::channel(64);
    let asset = AssetId::new("pump_1_aa");

    let mut session = MonitorSession::new(
        asset.clone(),
        &config,
        FusionClient::new(http, 3),
        alerts.clone(),
        events,
    );

    let mut alerts_raised = Vec::new();
    for i in 0..3 {
        let reading = vigil_engine::Reading::new(asset.clone(), Utc::now())
            .with_channel(TEMPERATURE, Some(40.0 + i as f64))
            .with_channel(VIBRATION, Some(0.5))
            .with_channel(RPM, Some(1400.0))
            .with_channel(HUMIDITY, Some(41.0));
        alerts_raised.extend(session.tick(reading, Utc::now()).await.alert);
    }

    assert_eq!(alerts_raised.len(), 1);
    assert_eq!(alerts_raised[0].level, AlertLevel::Critical);
    assert_eq!(alerts.alerts_for(&asset).len(), 1);
}
