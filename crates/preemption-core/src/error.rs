//! Error types for the preemption subsystem.
//!
//! Only conditions that stop a single operation are errors. Recovered
//! conditions (unknown evaluators, suppressed events, a missing handler, a
//! rejected or timed-out negotiation) are reported through [`crate::obs`] and
//! never surface as `Err`.

use thiserror::Error;

/// Errors produced by the preemption subsystem.
#[derive(Debug, Error)]
pub enum PreemptionError {
    /// The cluster manager sent something the adapter cannot interpret.
    #[error("malformed preemption signal: {reason}")]
    MalformedSignal { reason: String },

    /// The link to the cluster manager failed while forwarding a response.
    #[error("cluster manager link failed: {reason}")]
    Link { reason: String },

    #[error("invalid preemption configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PreemptionError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        PreemptionError::MalformedSignal {
            reason: reason.into(),
        }
    }

    pub fn link(reason: impl std::fmt::Display) -> Self {
        PreemptionError::Link {
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for PreemptionError {
    fn from(err: serde_json::Error) -> Self {
        PreemptionError::malformed(err.to_string())
    }
}

impl From<evaluator_registry::RegistryError> for PreemptionError {
    fn from(err: evaluator_registry::RegistryError) -> Self {
        PreemptionError::malformed(err.to_string())
    }
}

/// Result type for preemption operations.
pub type PreemptionResult<T> = std::result::Result<T, PreemptionError>;
