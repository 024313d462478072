//! Controller-specific error types.
//!
//! Errors raised while wiring the registrar to a live cluster. Registration
//! failures themselves come from the library as [`WatchError`].

use dependent_watch::WatchError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the release watch controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Watch registration failed
    #[error("Watch registration failed: {0}")]
    Watch(#[from] WatchError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Manifest could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
