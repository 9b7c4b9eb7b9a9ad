//! Config Center Error Hierarchy
//!
//! Errors are grouped by the layer that detects them: request-level
//! rejections (validation, conflict, not-found, namespace, overload) are
//! raised before any state change, persistence failures come from the
//! external store, and system errors cover process plumbing.

use config::ConfigError;
use serde::Serialize;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed key, content or request parameter
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Variant business-rule violation (e.g. publishing an aggregated key)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Config not found: {0}")]
    NotFound(String),

    /// Unknown target namespace on clone/import
    #[error("Namespace does not exist: {0}")]
    Namespace(String),

    /// Session manager is at capacity, clients are expected to back off
    #[error("Too many waiting listeners ({waiting}/{limit})")]
    Overload { waiting: usize, limit: usize },

    /// Opaque store failure; never retried at this layer
    #[error(transparent)]
    Persistence(#[from] StorageError),

    /// Settings loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Infrastructure-level failures (io, signals, background tasks)
    #[error(transparent)]
    System(#[from] SystemError),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend unreachable or timed out
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Write rejected by the backend
    #[error("Store write failed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),

    #[error("Server failed to start: {0}")]
    ServerStartFailed(String),
}

/// Serialisable error category, used in per-record batch outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Namespace,
    Overload,
    Persistence,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Namespace(_) => ErrorKind::Namespace,
            Error::Overload { .. } => ErrorKind::Overload,
            Error::Persistence(_) => ErrorKind::Persistence,
            Error::Config(_) | Error::InvalidConfig(_) | Error::System(_) => ErrorKind::Internal,
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Io(e))
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        SystemError::TaskFailed(err).into()
    }
}
