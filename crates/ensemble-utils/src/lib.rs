//! Shared utilities for the stock ensemble
//!
//! Logging setup and process-level configuration used by every binary in the
//! workspace.

pub mod config;
pub mod logging;

pub use config::{AppConfig, LogFormat};
pub use logging::init_tracing;
