//! Configuration for vigil-daemon

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_engine::simulation::SimulationConfig;
use vigil_engine::{AlertConfig, EngineConfig, PollingConfig, TrendConfig, WindowConfig};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Predictive service connection
    #[serde(default)]
    pub service: ServiceConfig,

    /// Polling and window sizing
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Alert thresholds and cooldown
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Anomaly trend estimation
    #[serde(default)]
    pub trend: TrendConfig,

    /// Offline simulation
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Predictive service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the predictive service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Probe `/health` on startup
    #[serde(default = "default_true")]
    pub probe_health: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout(),
            probe_health: true,
        }
    }
}

/// Polling and window sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Polling interval in milliseconds
    #[serde(default = "default_polling_interval")]
    pub polling_interval_ms: u64,

    /// Readings per analysis window
    #[serde(default = "default_window_length")]
    pub window_length: usize,

    /// Retained readings as a multiple of the window length
    #[serde(default = "default_retention_multiplier")]
    pub retention_multiplier: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: default_polling_interval(),
            window_length: default_window_length(),
            retention_multiplier: default_retention_multiplier(),
        }
    }
}

/// Alert thresholds and cooldown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Fused risk for a critical alert
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,

    /// Fused risk for a warning
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// Critical cooldown in milliseconds; warnings use half
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Alert log capacity
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            critical_threshold: default_critical_threshold(),
            warning_threshold: default_warning_threshold(),
            cooldown_ms: default_cooldown(),
            log_capacity: default_log_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_polling_interval() -> u64 {
    2_000
}

fn default_window_length() -> usize {
    60
}

fn default_retention_multiplier() -> usize {
    4
}

fn default_critical_threshold() -> f64 {
    0.75
}

fn default_warning_threshold() -> f64 {
    0.5
}

fn default_cooldown() -> u64 {
    60_000
}

fn default_log_capacity() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables, e.g. VIGIL_SERVICE__ENDPOINT
        builder = builder.add_source(
            config::Environment::with_prefix("VIGIL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Request timeout for the predictive service.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.service.request_timeout_ms)
    }

    /// Engine configuration derived from this configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            polling: PollingConfig {
                interval: Duration::from_millis(self.monitor.polling_interval_ms),
            },
            window: WindowConfig {
                length: self.monitor.window_length,
                retention_multiplier: self.monitor.retention_multiplier,
            },
            alerts: AlertConfig {
                critical_threshold: self.alerts.critical_threshold,
                warning_threshold: self.alerts.warning_threshold,
                log_capacity: self.alerts.log_capacity,
                ..AlertConfig::default()
            }
            .with_cooldown(Duration::from_millis(self.alerts.cooldown_ms)),
            trend: self.trend.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.service.endpoint, "http://localhost:8000");
        assert!(config.service.probe_health);
        assert_eq!(config.monitor.polling_interval_ms, 2_000);
        assert_eq!(config.alerts.cooldown_ms, 60_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_engine_config_mapping() {
        let mut config = DaemonConfig::default();
        config.monitor.polling_interval_ms = 500;
        config.monitor.window_length = 30;
        config.alerts.cooldown_ms = 20_000;

        let engine = config.to_engine_config();
        assert_eq!(engine.polling.interval, Duration::from_millis(500));
        assert_eq!(engine.window.length, 30);
        assert_eq!(engine.window.retained_capacity(), 120);
        assert_eq!(engine.alerts.critical_cooldown, Duration::from_secs(20));
        assert_eq!(engine.alerts.warning_cooldown, Duration::from_secs(10));
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let path = std::env::temp_dir().join(format!("vigil-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[service]\nendpoint = \"http://pdm.plant.local:9000\"\n\n[monitor]\nwindow_length = 20\n\n[simulation]\nseed = 42"
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.service.endpoint, "http://pdm.plant.local:9000");
        assert_eq!(config.monitor.window_length, 20);
        assert_eq!(config.monitor.polling_interval_ms, 2_000);
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.trend.sample_count, 6);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = DaemonConfig::load(Some("/nonexistent/vigil")).unwrap();
        assert_eq!(config.monitor.window_length, 60);
    }
}
