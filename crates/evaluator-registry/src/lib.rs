//! Evaluator Registry: the driver's view of its running evaluators.
//!
//! ## Layer 0 - Driver State
//!
//! The registry is owned by the driver runtime. The preemption subsystem only
//! consults it through the read-only [`EvaluatorRegistry`] trait and must
//! tolerate entries disappearing between a lookup and its use.
//!
//! ## Key Components
//!
//! - `EvaluatorId`: identifier the cluster manager and driver agree on
//! - `EvaluatorDescriptor`: registry entry (state + resource shape)
//! - `RunningEvaluatorRef`: non-owning lookup key for a running evaluator
//! - `EvaluatorRegistry`: async, read-only query trait
//! - `fakes::MemoryEvaluatorRegistry`: in-memory implementation for tests and tooling

mod error;
pub mod fakes;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{
    EvaluatorDescriptor, EvaluatorId, EvaluatorRegistry, EvaluatorState, ResourceShape,
    RunningEvaluatorRef,
};
