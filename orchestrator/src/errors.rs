//! Error types for the nodeup orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Control plane rejected a create/destroy call or credentials are
    /// missing. Fatal to the call that raised it, never retried blindly.
    #[error("Provisioning error: {0}")]
    ProvisioningError(String),

    /// Remote shell could not connect or authenticate. Recoverable; the
    /// poller's attempt budget absorbs it.
    #[error("Connectivity error: {0}")]
    ConnectivityError(String),

    /// A progress check ran but produced no usable signal (command failure,
    /// garbled output). Same handling as `ConnectivityError`.
    #[error("Progress check error: {0}")]
    ProgressError(String),

    /// An attempt budget ran out before the next milestone was reached.
    #[error("Timeout exceeded: {0}")]
    TimeoutError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
