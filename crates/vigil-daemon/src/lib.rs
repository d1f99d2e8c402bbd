//! Vigil Daemon library
//!
//! This module provides the core components for the Vigil daemon:
//! - Layered configuration (defaults, file, environment)
//! - Backend wiring for the predictive service or the offline simulation
//! - Event reporting and graceful shutdown

pub mod config;
pub mod error;
pub mod runner;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use runner::{run, RunOptions};
