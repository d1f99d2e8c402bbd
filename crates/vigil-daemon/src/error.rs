//! Error types for vigil-daemon.

use thiserror::Error;
use vigil_engine::EngineError;

/// Errors that end the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine setup failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// No asset was given and the source listed none.
    #[error("no asset to monitor: pass --asset or check the service's device list")]
    NoAssets,

    /// Signal handling or other I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
