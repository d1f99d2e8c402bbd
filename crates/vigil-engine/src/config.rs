//! Engine configuration.
//!
//! Defines polling cadence, window sizing, alert thresholds and trend
//! estimation parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Configuration for the analysis engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Polling configuration.
    pub polling: PollingConfig,

    /// Analysis window sizing.
    pub window: WindowConfig,

    /// Alert thresholds and cooldowns.
    pub alerts: AlertConfig,

    /// Anomaly trend estimation.
    pub trend: TrendConfig,
}

impl EngineConfig {
    /// Check that the configuration is usable.
    pub fn validate(&self) -> EngineResult<()> {
        if self.polling.interval.is_zero() {
            return Err(EngineError::Configuration(
                "polling interval must be non-zero".to_string(),
            ));
        }
        if self.window.length == 0 {
            return Err(EngineError::Configuration(
                "window length must be at least 1".to_string(),
            ));
        }
        if self.window.retention_multiplier == 0 {
            return Err(EngineError::Configuration(
                "retention multiplier must be at least 1".to_string(),
            ));
        }
        self.alerts.validate()?;
        self.trend.validate()
    }
}

/// Polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between telemetry polls.
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2_000),
        }
    }
}

/// Window sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Number of readings in the analysis window.
    pub length: usize,

    /// Retained history is `length * retention_multiplier` readings.
    pub retention_multiplier: usize,
}

impl WindowConfig {
    /// Capacity of the retained buffer.
    pub fn retained_capacity(&self) -> usize {
        self.length.saturating_mul(self.retention_multiplier)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            length: 60,
            retention_multiplier: 4,
        }
    }
}

/// Alert thresholds and cooldowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Fused risk at or above which a critical alert fires.
    pub critical_threshold: f64,

    /// Fused risk at or above which a warning fires.
    pub warning_threshold: f64,

    /// Cooldown applied after a critical alert.
    pub critical_cooldown: Duration,

    /// Cooldown applied after a warning.
    pub warning_cooldown: Duration,

    /// Maximum number of alerts kept in the log.
    pub log_capacity: usize,
}

impl AlertConfig {
    /// Use `cooldown` for critical alerts and half of it for warnings.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.critical_cooldown = cooldown;
        self.warning_cooldown = cooldown / 2;
        self
    }

    fn validate(&self) -> EngineResult<()> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.critical_threshold) || !in_unit(self.warning_threshold) {
            return Err(EngineError::Configuration(
                "alert thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if self.warning_threshold >= self.critical_threshold {
            return Err(EngineError::Configuration(format!(
                "warning threshold {} must be below critical threshold {}",
                self.warning_threshold, self.critical_threshold
            )));
        }
        if self.log_capacity == 0 {
            return Err(EngineError::Configuration(
                "alert log capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 0.75,
            warning_threshold: 0.5,
            critical_cooldown: Duration::ZERO,
            warning_cooldown: Duration::ZERO,
            log_capacity: 50,
        }
        .with_cooldown(Duration::from_millis(60_000))
    }
}

/// Anomaly trend estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Number of anomaly scores retained.
    pub history_capacity: usize,

    /// Number of most recent scores used for the slope fit.
    pub sample_count: usize,

    /// Fewer usable scores than this yields no countdown.
    pub min_samples: usize,
}

impl TrendConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.history_capacity == 0 {
            return Err(EngineError::Configuration(
                "anomaly history capacity must be at least 1".to_string(),
            ));
        }
        if self.min_samples < 2 || self.min_samples > self.sample_count {
            return Err(EngineError::Configuration(format!(
                "trend needs 2 <= min_samples ({}) <= sample_count ({})",
                self.min_samples, self.sample_count
            )));
        }
        Ok(())
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            sample_count: 6,
            min_samples: 3,
        }
    }
}
