//! Error taxonomy shared across the control plane.
//!
//! Every component that can fail returns `ControlPlaneError`; adapters map
//! each variant to their own surface (HTTP status, MQTT error topic, absence
//! of a KNX status write).

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ControlPlaneError {
    /// Bad input from the originating protocol. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The mutation would have broken a data-model invariant; rejected, state
    /// unchanged.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Downstream timeout, connection reset, or similar. Caller may retry with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The requested track/playlist is not resolvable right now.
    #[error("catalog miss: {0}")]
    CatalogMiss(String),

    /// Unrecoverable resource loss or programming error. The affected subsystem
    /// degrades; the process itself does not exit unless startup cannot recover.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ControlPlaneError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn catalog_miss(msg: impl Into<String>) -> Self {
        Self::CatalogMiss(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// HTTP status code this error taxonomy entry maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            ControlPlaneError::Validation(_) => 400,
            ControlPlaneError::InvariantViolation(_) => 409,
            ControlPlaneError::Transient(_) => 503,
            ControlPlaneError::CatalogMiss(_) => 404,
            ControlPlaneError::Fatal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlPlaneError>;
