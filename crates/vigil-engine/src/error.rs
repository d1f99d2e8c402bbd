//! Error types for vigil-engine.
//!
//! Nothing here is fatal to a monitoring session: the polling loop logs these
//! and skips the tick.

use thiserror::Error;

use crate::types::AssetId;

/// Errors raised by the analysis engine and its transports.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The predictive service could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The predictive service answered with a non-success status.
    #[error("upstream returned {status} for {path}")]
    Upstream { status: u16, path: String },

    /// The predictor answered but flagged its scores as unusable.
    #[error("fusion rejected by predictor: {0}")]
    FusionRejected(String),

    /// A session for this asset is already running.
    #[error("asset {0} is already being monitored")]
    AlreadyMonitoring(AssetId),

    /// No session exists for this asset.
    #[error("asset {0} is not being monitored")]
    NotMonitoring(AssetId),

    /// The telemetry source does not offer this operation.
    #[error("operation not supported by this source: {0}")]
    Unsupported(&'static str),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
