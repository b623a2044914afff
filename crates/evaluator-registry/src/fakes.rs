//! In-memory registry implementation
//!
//! Provides `MemoryEvaluatorRegistry`, which satisfies the
//! [`EvaluatorRegistry`] contract without a driver runtime. Used by tests and
//! by `preemptiond` to replay recorded signals against a registry snapshot.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::*;

/// In-memory registry backed by a `HashMap<EvaluatorId, EvaluatorDescriptor>`.
#[derive(Debug, Default)]
pub struct MemoryEvaluatorRegistry {
    evaluators: Mutex<HashMap<EvaluatorId, EvaluatorDescriptor>>,
}

impl MemoryEvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of descriptors, rejecting duplicate ids.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = EvaluatorDescriptor>,
    ) -> RegistryResult<Self> {
        let mut evaluators = HashMap::new();
        for descriptor in descriptors {
            let id = descriptor.id.clone();
            if evaluators.insert(id.clone(), descriptor).is_some() {
                return Err(RegistryError::DuplicateEvaluator {
                    id: id.as_str().to_string(),
                });
            }
        }
        Ok(Self {
            evaluators: Mutex::new(evaluators),
        })
    }

    /// Load a registry snapshot from a JSON array of descriptors.
    pub fn from_json(json: &str) -> RegistryResult<Self> {
        let descriptors: Vec<EvaluatorDescriptor> = serde_json::from_str(json)?;
        Self::from_descriptors(descriptors)
    }

    /// Insert or replace a descriptor.
    pub fn upsert(&self, descriptor: EvaluatorDescriptor) {
        let mut evaluators = self.evaluators.lock().unwrap();
        evaluators.insert(descriptor.id.clone(), descriptor);
    }

    /// Shorthand for registering a running evaluator.
    pub fn insert_running(&self, id: &str, resources: ResourceShape) -> RegistryResult<()> {
        let id = EvaluatorId::new(id)?;
        self.upsert(EvaluatorDescriptor::running(id, resources));
        Ok(())
    }

    /// Move an evaluator to a new state. No-op if absent.
    pub fn set_state(&self, id: &EvaluatorId, state: EvaluatorState) {
        let mut evaluators = self.evaluators.lock().unwrap();
        if let Some(d) = evaluators.get_mut(id) {
            d.state = state;
        }
    }

    /// Remove an evaluator entirely. No-op if absent.
    pub fn remove(&self, id: &EvaluatorId) {
        let mut evaluators = self.evaluators.lock().unwrap();
        evaluators.remove(id);
    }

    pub fn len(&self) -> usize {
        self.evaluators.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EvaluatorRegistry for MemoryEvaluatorRegistry {
    async fn lookup(&self, id: &EvaluatorId) -> Option<RunningEvaluatorRef> {
        let evaluators = self.evaluators.lock().unwrap();
        match evaluators.get(id) {
            Some(d) if d.is_running() => Some(RunningEvaluatorRef::new(d.id.clone(), d.resources)),
            Some(d) => {
                debug!(evaluator_id = %id, state = ?d.state, "evaluator is not running");
                None
            }
            None => None,
        }
    }
}
