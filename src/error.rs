//! Error types for the operator process.

use thiserror::Error;

use crate::operator::OperatorError;

/// Result type alias for process-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring and starting the operator
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration source error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Kubernetes client error
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// Reconciliation core error
    #[error("Operator error: {0}")]
    Operator(#[from] OperatorError),
}
