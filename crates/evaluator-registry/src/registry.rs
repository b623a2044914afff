//! Registry trait definitions
//!
//! The registry answers one question for the preemption subsystem: is this
//! identifier a running evaluator right now? Everything else about evaluator
//! lifecycle stays with the driver runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Identifier of an evaluator, as shared by the driver and the cluster manager.
///
/// Deserialization goes through [`EvaluatorId::new`], so snapshots and
/// proposals cannot smuggle in a blank id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EvaluatorId(String);

impl EvaluatorId {
    /// Build an id, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> RegistryResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RegistryError::EmptyId);
        }
        Ok(EvaluatorId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EvaluatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for EvaluatorId {
    type Error = RegistryError;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        EvaluatorId::new(s)
    }
}

impl TryFrom<String> for EvaluatorId {
    type Error = RegistryError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        EvaluatorId::new(s)
    }
}

impl From<EvaluatorId> for String {
    fn from(id: EvaluatorId) -> Self {
        id.0
    }
}

/// Lifecycle state of an evaluator as tracked by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorState {
    /// Container granted, evaluator not yet reporting
    Allocated,
    Running,
    Completed,
    Failed,
}

/// Cores and memory held by one evaluator or asked for by one request unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceShape {
    pub cores: u32,
    pub memory_mb: u64,
}

impl ResourceShape {
    pub fn new(cores: u32, memory_mb: u64) -> Self {
        Self { cores, memory_mb }
    }

    /// A shape that asks for nothing.
    pub fn is_empty(&self) -> bool {
        self.cores == 0 && self.memory_mb == 0
    }
}

impl std::fmt::Display for ResourceShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} cores, {}MB", self.cores, self.memory_mb)
    }
}

/// A registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorDescriptor {
    pub id: EvaluatorId,
    pub state: EvaluatorState,
    #[serde(default)]
    pub resources: ResourceShape,
}

impl EvaluatorDescriptor {
    pub fn running(id: EvaluatorId, resources: ResourceShape) -> Self {
        Self {
            id,
            state: EvaluatorState::Running,
            resources,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == EvaluatorState::Running
    }
}

/// Non-owning reference to a running evaluator.
///
/// Holding a ref does not keep the evaluator alive; it is only a key that was
/// valid at lookup time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunningEvaluatorRef {
    id: EvaluatorId,
    resources: ResourceShape,
}

impl RunningEvaluatorRef {
    pub fn new(id: EvaluatorId, resources: ResourceShape) -> Self {
        Self { id, resources }
    }

    pub fn id(&self) -> &EvaluatorId {
        &self.id
    }

    pub fn resources(&self) -> ResourceShape {
        self.resources
    }

    pub fn into_id(self) -> EvaluatorId {
        self.id
    }
}

/// Read-only registry query interface.
///
/// Guarantees:
/// - `lookup(id)` returns `Some` only for evaluators currently in
///   [`EvaluatorState::Running`].
/// - Implementations never block on writers for longer than a map access.
#[async_trait]
pub trait EvaluatorRegistry: Send + Sync {
    /// Resolve an id to a running evaluator, or `None` if it is unknown or no
    /// longer running.
    async fn lookup(&self, id: &EvaluatorId) -> Option<RunningEvaluatorRef>;

    /// Convenience check built on [`lookup`](Self::lookup).
    async fn is_running(&self, id: &EvaluatorId) -> bool {
        self.lookup(id).await.is_some()
    }
}
