//! Application configuration and logging setup
//!
//! This module provides:
//! - `AppConfig`: symbols, enabled exchanges, detector and service tunables
//! - `init_logging`: JSON or pretty `tracing` output

pub mod logging;
mod types;

pub use logging::{init_logging, LogFormat};
pub use types::AppConfig;
