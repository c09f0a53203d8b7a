//! Application-wide error types using thiserror
//!
//! Adapter failures stay as `ExchangeError` inside the adapter layer and are
//! wrapped here at the service and configuration boundary.

use thiserror::Error;

use crate::adapters::errors::ExchangeError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
