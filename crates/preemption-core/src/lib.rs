//! Preemption notification for cluster-application drivers.
//!
//! Lets the underlying resource manager tell the driver that running
//! evaluators are about to be reclaimed, and for negotiable (flexible)
//! reclamation gives the driver a bounded chance to offer something else.
//!
//! ## Layer 1 - Driver Subsystem
//!
//! Data flow: cluster manager → [`ResourceManagerAdapter`] →
//! [`PreemptionEvent`] → [`PreemptionDispatcher`] → driver
//! [`PreemptionHandler`] → (flexible only) [`MitigationNegotiator`] →
//! adapter → cluster manager.
//!
//! ## Stability
//!
//! This is a preview API ([`STABILITY`]). The negotiation protocol
//! (accept/reject signalling, timeout semantics, proposal shape) should be
//! validated against the target cluster manager before it is relied on.

pub mod adapter;
pub mod config;
pub mod dispatcher;
mod error;
pub mod event;
pub mod fakes;
pub mod listener;
pub mod metrics;
pub mod negotiator;
pub mod obs;
pub mod proposal;
pub mod service;
pub mod shutdown;
pub mod signal;
pub mod telemetry;

pub use adapter::{ClusterManagerLink, ProposalVerdict, ResourceManagerAdapter};
pub use config::PreemptionConfig;
pub use dispatcher::{DeliveryOutcome, DispatchReport, PreemptionDispatcher, PreemptionHandler};
pub use error::{PreemptionError, PreemptionResult};
pub use event::{
    EvaluatorSet, EventId, FlexiblePreemption, PreemptionEvent, PreemptionKind, ResourceRequest,
    SignalId, StrictPreemption,
};
pub use listener::{InboundSignal, ListenerSummary, SignalListener};
pub use metrics::METRICS;
pub use negotiator::{MitigationNegotiator, NegotiationOutcome, NegotiationState};
pub use proposal::MitigationProposal;
pub use service::PreemptionSubsystem;
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use signal::{decode_signal, RawPreemptionSignal, RawResourceRequest};
pub use telemetry::{init_tracing, LogFormat};

pub use evaluator_registry::{EvaluatorId, EvaluatorRegistry, ResourceShape, RunningEvaluatorRef};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// API stability marker: handler registration and event shapes may change.
pub const STABILITY: &str = "preview";
