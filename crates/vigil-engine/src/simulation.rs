//! Offline simulation of a device fleet and its predictor.
//!
//! Used for demos and tests when no predictive service is reachable. The
//! source mimics the reference sensor simulator; the predictor derives model
//! proxies from drift inside the request window and fuses them with the
//! reference weights.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::fusion::{FusionPort, FusionRequest};
use crate::telemetry::TelemetrySource;
use crate::types::{AssetId, FusionResult, Reading, WIRE_CHANNELS};

/// Weight of the sequence model in the fused risk.
pub const LSTM_WEIGHT: f64 = 0.6;
/// Weight of the aggregate model in the fused risk.
pub const RF_WEIGHT: f64 = 0.3;
/// Weight of the scaled anomaly score in the fused risk.
pub const AE_WEIGHT: f64 = 0.1;

/// Full pre-failure ramp offsets.
const RAMP_TEMPERATURE: f64 = 5.0;
const RAMP_VIBRATION: f64 = 0.5;
const RAMP_RPM: f64 = 300.0;

// Standard deviation of sensor noise per channel
const TEMPERATURE_NOISE: f64 = 0.5;
const VIBRATION_NOISE: f64 = 0.02;
const RPM_NOISE: f64 = 50.0;
const HUMIDITY_NOISE: f64 = 5.0;
const HUMIDITY_BASE: f64 = 40.0;

fn gaussian(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    Normal::new(mean, std_dev).map_or(mean, |normal| normal.sample(rng))
}

/// Map a raw reconstruction error into [0, 1].
pub fn scale_ae_score(raw: f64) -> f64 {
    1.0 / (1.0 + (-(raw - 0.01) * 100.0).exp())
}

/// Weighted fusion of the three model outputs.
pub fn fuse(lstm: f64, rf: f64, ae_scaled: f64) -> f64 {
    LSTM_WEIGHT * lstm + RF_WEIGHT * rf + AE_WEIGHT * ae_scaled
}

/// Baseline signals of a device type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub temp_base: f64,
    pub vib_base: f64,
    pub rpm_base: f64,
}

impl DeviceProfile {
    pub fn new(name: impl Into<String>, temp_base: f64, vib_base: f64, rpm_base: f64) -> Self {
        Self {
            name: name.into(),
            temp_base,
            vib_base,
            rpm_base,
        }
    }

    /// Built-in device types.
    pub fn catalog() -> Vec<Self> {
        vec![
            Self::new("pump", 45.0, 0.25, 1450.0),
            Self::new("compressor", 60.0, 0.40, 2900.0),
            Self::new("motor", 55.0, 0.30, 1750.0),
            Self::new("fan", 35.0, 0.15, 980.0),
        ]
    }
}

/// Simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of devices in the fleet.
    pub devices: usize,

    /// How many of them (the first ones) degrade.
    pub degrading: usize,

    /// Reading index at which degradation starts.
    pub ramp_start: u64,

    /// Readings from ramp start to full ramp.
    pub ramp_length: u64,

    /// Chance per reading that one channel goes missing.
    pub missing_prob: f64,

    /// RNG seed; random when unset.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            devices: 4,
            degrading: 1,
            ramp_start: 90,
            ramp_length: 120,
            missing_prob: 0.03,
            seed: None,
        }
    }
}

#[derive(Debug)]
struct SimulatedDevice {
    profile: DeviceProfile,
    degrading: bool,
    step: u64,
}

#[derive(Debug)]
struct FleetState {
    rng: StdRng,
    devices: BTreeMap<AssetId, SimulatedDevice>,
}

/// Telemetry source backed by a simulated fleet.
///
/// Unknown assets are added on first poll as healthy devices of the first
/// catalog type, so manual asset entry works offline.
#[derive(Debug)]
pub struct SimulatedSource {
    config: SimulationConfig,
    state: Mutex<FleetState>,
}

impl SimulatedSource {
    pub fn new(config: SimulationConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let catalog = DeviceProfile::catalog();
        let mut devices = BTreeMap::new();
        for i in 0..config.devices {
            let profile = catalog[i % catalog.len()].clone();
            let suffix: u32 = rng.gen();
            let id = AssetId::new(format!("{}_{}_{:08x}", profile.name, i, suffix));
            devices.insert(
                id,
                SimulatedDevice {
                    profile,
                    degrading: i < config.degrading,
                    step: 0,
                },
            );
        }

        Self {
            config,
            state: Mutex::new(FleetState { rng, devices }),
        }
    }

    /// Ids of the simulated devices.
    pub fn device_ids(&self) -> Vec<AssetId> {
        self.state.lock().devices.keys().cloned().collect()
    }

    /// Ids of the devices that degrade.
    pub fn degrading_ids(&self) -> Vec<AssetId> {
        self.state
            .lock()
            .devices
            .iter()
            .filter(|(_, device)| device.degrading)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn ramp_factor(&self, device: &SimulatedDevice) -> f64 {
        if !device.degrading || device.step < self.config.ramp_start {
            return 0.0;
        }
        let progressed = (device.step - self.config.ramp_start) as f64;
        (progressed / self.config.ramp_length.max(1) as f64).min(1.0)
    }

    fn next_reading(&self, asset_id: &AssetId) -> Reading {
        let mut guard = self.state.lock();
        let FleetState { rng, devices } = &mut *guard;

        let device = devices
            .entry(asset_id.clone())
            .or_insert_with(|| SimulatedDevice {
                profile: DeviceProfile::catalog().remove(0),
                degrading: false,
                step: 0,
            });
        let factor = self.ramp_factor(device);
        device.step += 1;
        let profile = &device.profile;

        let mut temperature = gaussian(rng, profile.temp_base, TEMPERATURE_NOISE);
        let mut vibration = gaussian(rng, profile.vib_base, VIBRATION_NOISE).abs();
        let mut rpm = gaussian(rng, profile.rpm_base, RPM_NOISE);
        let humidity = gaussian(rng, HUMIDITY_BASE, HUMIDITY_NOISE).clamp(10.0, 90.0);

        if factor > 0.0 {
            temperature += RAMP_TEMPERATURE * factor;
            vibration += RAMP_VIBRATION * factor;
            rpm -= RAMP_RPM * factor;
        }

        let mut values = [
            Some(temperature),
            Some(vibration),
            Some(rpm.max(0.0)),
            Some(humidity),
        ];
        if rng.gen::<f64>() < self.config.missing_prob {
            values[rng.gen_range(0..values.len())] = None;
        }

        WIRE_CHANNELS
            .iter()
            .zip(values)
            .fold(Reading::new(asset_id.clone(), Utc::now()), |reading, (channel, value)| {
                reading.with_channel(*channel, value)
            })
    }
}

#[async_trait]
impl TelemetrySource for SimulatedSource {
    async fn list_assets(&self) -> EngineResult<Vec<AssetId>> {
        Ok(self.device_ids())
    }

    async fn latest_reading(&self, asset_id: &AssetId) -> EngineResult<Reading> {
        if asset_id.is_empty() {
            return Err(EngineError::Configuration("empty asset id".to_string()));
        }
        Ok(self.next_reading(asset_id))
    }
}

/// Predictor that scores drift inside the request window.
///
/// Zero cells are treated as gaps, matching the wire zero fill.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPredictor;

impl SimulatedPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Drift between the first and last quarter of the window, in units of
    /// a full pre-failure ramp. 0 for a stable window.
    fn drift(window: &[[f64; 4]]) -> f64 {
        let span = (window.len() / 4).max(1);
        if window.len() < 2 {
            return 0.0;
        }
        let head = &window[..span];
        let tail = &window[window.len() - span..];

        let shift = |column: usize| match (column_mean(tail, column), column_mean(head, column)) {
            (Some(late), Some(early)) => late - early,
            _ => 0.0,
        };

        let temperature = shift(0) / RAMP_TEMPERATURE;
        let vibration = shift(1) / RAMP_VIBRATION;
        let rpm = -shift(2) / RAMP_RPM;

        ((temperature + vibration + rpm) / 3.0).clamp(0.0, 1.0)
    }

    /// Spread of the aggregates above sensor noise, in [0, 1].
    fn spread(agg: &BTreeMap<String, f64>) -> f64 {
        let std_of = |channel: &str| agg.get(&format!("{channel}_std")).copied().unwrap_or(0.0);
        let temperature = (std_of("temperature") - 0.3) / 1.5;
        let vibration = (std_of("vibration") - 0.012) / 0.15;
        (0.5 * temperature.max(0.0) + 0.5 * vibration.max(0.0)).clamp(0.0, 1.0)
    }
}

fn column_mean(rows: &[[f64; 4]], column: usize) -> Option<f64> {
    let present: Vec<f64> = rows
        .iter()
        .map(|row| row[column])
        .filter(|v| *v != 0.0)
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

#[async_trait]
impl FusionPort for SimulatedPredictor {
    async fn predict(&self, request: &FusionRequest) -> EngineResult<FusionResult> {
        let drift = Self::drift(&request.window);
        let lstm = drift;
        let rf = Self::spread(&request.agg);
        let ae_raw = 0.005 + 0.02 * drift;
        let ae_scaled = scale_ae_score(ae_raw);

        let result = FusionResult {
            fused_risk: fuse(lstm, rf, ae_scaled),
            lstm_failure_prob: lstm,
            rf_failure_prob: rf,
            ae_raw_score: ae_raw,
            ae_scaled_score: ae_scaled,
            health_score: 1.0 - rf,
        };
        debug!(fused_risk = result.fused_risk, drift, "Simulated fusion");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate;
    use crate::buffer::SlidingWindowBuffer;
    use crate::types::{HUMIDITY, RPM, TEMPERATURE, VIBRATION};

    fn seeded(devices: usize, degrading: usize) -> SimulatedSource {
        SimulatedSource::new(SimulationConfig {
            devices,
            degrading,
            ramp_start: 5,
            ramp_length: 10,
            missing_prob: 0.0,
            seed: Some(7),
        })
    }

    fn request_for(rows: impl Iterator<Item = [f64; 4]>) -> FusionRequest {
        let mut buffer = SlidingWindowBuffer::new(60, 1);
        for row in rows {
            let mut reading = Reading::new(AssetId::new("sim"), Utc::now());
            for (channel, value) in WIRE_CHANNELS.iter().zip(row) {
                reading = reading.with_channel(*channel, Some(value));
            }
            buffer.push(reading);
        }
        let window = buffer.window();
        FusionRequest::build(&window, &aggregate::compute(&window))
    }

    #[test]
    fn test_scale_ae_score() {
        assert!((scale_ae_score(0.01) - 0.5).abs() < 1e-12);
        assert!(scale_ae_score(0.1) > 0.99);
        assert!(scale_ae_score(0.0) < 0.5);
    }

    #[test]
    fn test_fuse_weights() {
        assert!((fuse(1.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((fuse(0.5, 0.2, 0.9) - 0.45).abs() < 1e-12);
        assert_eq!(fuse(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_fleet_ids_and_degrading() {
        let source = seeded(3, 1);
        let ids = source.device_ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().any(|id| id.as_str().starts_with("pump_0_")));
        assert_eq!(source.degrading_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_readings_have_gaussian_noise_around_baseline() {
        let source = seeded(1, 0);
        let id = source.device_ids().remove(0);

        let mut temperatures = Vec::new();
        for _ in 0..400 {
            let reading = source.latest_reading(&id).await.unwrap();
            temperatures.push(reading.value(TEMPERATURE).unwrap());
            assert!(reading.value(VIBRATION).unwrap() >= 0.0);
            let humidity = reading.value(HUMIDITY).unwrap();
            assert!((10.0..=90.0).contains(&humidity));
        }

        let n = temperatures.len() as f64;
        let mean = temperatures.iter().sum::<f64>() / n;
        let std_dev =
            (temperatures.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        assert!((mean - 45.0).abs() < 0.2, "mean {mean}");
        assert!((0.35..0.65).contains(&std_dev), "std {std_dev}");
        // Unbounded noise reaches past one standard deviation
        assert!(temperatures.iter().any(|t| (t - 45.0).abs() > 0.5));
    }

    #[tokio::test]
    async fn test_degrading_device_ramps() {
        let source = seeded(1, 1);
        let id = source.device_ids().remove(0);

        let mut last = None;
        for _ in 0..20 {
            last = Some(source.latest_reading(&id).await.unwrap());
        }
        let reading = last.unwrap();

        // Full ramp reached after step 15
        assert!(reading.value(TEMPERATURE).unwrap() > 47.5);
        assert!(reading.value(RPM).unwrap() < 1450.0 - 50.0);
    }

    #[tokio::test]
    async fn test_missing_channels() {
        let source = SimulatedSource::new(SimulationConfig {
            devices: 1,
            degrading: 0,
            missing_prob: 1.0,
            seed: Some(1),
            ..Default::default()
        });
        let id = source.device_ids().remove(0);
        let reading = source.latest_reading(&id).await.unwrap();
        assert_eq!(reading.channels.len(), 4);
        assert_eq!(reading.channels.values().filter(|v| v.is_none()).count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_asset_joins_fleet() {
        let source = seeded(1, 0);
        let reading = source.latest_reading(&AssetId::new("line-7")).await.unwrap();
        assert_eq!(reading.asset_id.as_str(), "line-7");
        assert_eq!(source.device_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_predictor_separates_stable_and_ramped() {
        let predictor = SimulatedPredictor::new();

        let stable = request_for((0..60).map(|_| [45.0, 0.25, 1450.0, 40.0]));
        let calm = predictor.predict(&stable).await.unwrap();
        assert!(calm.fused_risk < 0.2);
        assert!((calm.health_score - 1.0).abs() < 1e-12);

        let ramped = request_for((0..60).map(|i| {
            let f = i as f64 / 59.0;
            [45.0 + 5.0 * f, 0.25 + 0.5 * f, 1450.0 - 300.0 * f, 40.0]
        }));
        let hot = predictor.predict(&ramped).await.unwrap();
        assert!(hot.fused_risk > 0.5);
        assert!(hot.ae_scaled_score > calm.ae_scaled_score);
        assert!((hot.fused_risk - fuse(hot.lstm_failure_prob, hot.rf_failure_prob, hot.ae_scaled_score)).abs() < 1e-12);
    }
}
