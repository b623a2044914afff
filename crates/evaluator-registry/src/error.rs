//! Error types for evaluator-registry

use thiserror::Error;

/// Errors raised while building or loading a registry.
///
/// Lookups never fail: an unknown evaluator is a `None`, not an error.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The same evaluator id appeared twice in a snapshot
    #[error("duplicate evaluator id in registry snapshot: {id}")]
    DuplicateEvaluator { id: String },

    /// An evaluator id was empty
    #[error("evaluator id must not be empty")]
    EmptyId,

    /// Snapshot could not be decoded
    #[error("Deserialization failed: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Deserialization(err.to_string())
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
