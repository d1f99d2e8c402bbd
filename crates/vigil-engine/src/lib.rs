//! # Vigil Engine - Streaming Analysis and Alerting for Predictive Maintenance
//!
//! This crate turns a stream of periodic sensor readings from industrial
//! assets into failure-risk estimates, anomaly trends and threshold alerts.
//!
//! ## Overview
//!
//! Every polling tick runs the same pipeline for a monitored asset:
//!
//! 1. **Ingest** the latest reading into a sliding window
//! 2. **Aggregate** per-channel mean and standard deviation
//! 3. **Fuse** once the window is full, with at most one request in flight
//! 4. **Trend** the scaled anomaly score into a time-to-threshold countdown
//! 5. **Alert** on the fused risk, subject to per-asset cooldowns
//!
//! Model inference is external. The engine only sends windows and
//! aggregates to a [`FusionPort`] and consumes the structured result.
//!
//! ## Key Components
//!
//! - [`Monitor`]: Runs one session task per asset
//! - [`MonitorSession`]: The per-asset tick pipeline
//! - [`SlidingWindowBuffer`]: Bounded reading buffer with a window view
//! - [`FusionClient`]: Rate-limited fusion requests
//! - [`AlertManager`]: Thresholds, cooldowns and the alert log
//! - [`PredictiveServiceClient`]: HTTP transport for the predictive service
//! - [`simulation`]: Offline device fleet and predictor
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil_engine::{
//!     simulation::{SimulatedPredictor, SimulatedSource, SimulationConfig},
//!     AssetId, EngineConfig, Monitor,
//! };
//!
//! # async fn example() {
//! let source = Arc::new(SimulatedSource::new(SimulationConfig::default()));
//! let monitor = Monitor::new(
//!     EngineConfig::default(),
//!     source,
//!     Arc::new(SimulatedPredictor::new()),
//! )
//! .unwrap();
//!
//! let mut events = monitor.subscribe();
//! monitor.start_monitoring(AssetId::new("pump_0")).unwrap();
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```
//!
//! ## Countdown
//!
//! The time-to-threshold countdown extrapolates the recent anomaly slope and
//! is an approximation, not a prediction of physical failure time.

pub mod aggregate;
pub mod alert;
pub mod anomaly;
pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod fusion;
pub mod monitor;
pub mod session;
pub mod simulation;
pub mod telemetry;
pub mod types;

pub use aggregate::{AggregateSet, ChannelStats};
pub use alert::AlertManager;
pub use anomaly::{AnomalyHistory, CountdownEstimator};
pub use buffer::{SlidingWindowBuffer, Window};
pub use client::PredictiveServiceClient;
pub use config::{AlertConfig, EngineConfig, PollingConfig, TrendConfig, WindowConfig};
pub use error::{EngineError, EngineResult};
pub use fusion::{FusionClient, FusionPort, FusionRequest, FusionSkip, PendingFusion};
pub use monitor::{Monitor, MonitorEvent};
pub use session::{MonitorSession, SessionSnapshot, TickReport};
pub use telemetry::{TelemetryIngestor, TelemetrySource};
pub use types::{Alert, AlertLevel, AssetId, FusionResult, Reading};
