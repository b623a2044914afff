//! In-memory collaborators for tests and tooling.
//!
//! Provides `ScriptedClusterManager` (a [`ClusterManagerLink`] whose verdicts
//! are scripted) and `RecordingHandler` (a [`PreemptionHandler`] that records
//! every call and answers flexible events with a fixed proposal).

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use evaluator_registry::EvaluatorId;

use crate::adapter::{ClusterManagerLink, ProposalVerdict};
use crate::dispatcher::PreemptionHandler;
use crate::error::{PreemptionError, PreemptionResult};
use crate::event::{EvaluatorSet, ResourceRequest, SignalId};
use crate::negotiator::NegotiationOutcome;
use crate::proposal::MitigationProposal;

// ---------------------------------------------------------------------------
// ScriptedClusterManager
// ---------------------------------------------------------------------------

/// How the scripted cluster manager answers proposals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedVerdict {
    Accept,
    Reject(String),
    /// Never answer.
    Silent,
    /// Fail the link call.
    Fail(String),
}

/// A proposal as seen by the cluster manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedProposal {
    pub signal: SignalId,
    pub request: ResourceRequest,
    pub proposal: MitigationProposal,
}

/// Scripted cluster manager that records every response it receives.
#[derive(Debug)]
pub struct ScriptedClusterManager {
    verdict: ScriptedVerdict,
    delay: Duration,
    proposals: Mutex<Vec<ReceivedProposal>>,
    proceeds: Mutex<Vec<(SignalId, Vec<EvaluatorId>)>>,
}

impl ScriptedClusterManager {
    pub fn new(verdict: ScriptedVerdict) -> Self {
        Self {
            verdict,
            delay: Duration::ZERO,
            proposals: Mutex::new(Vec::new()),
            proceeds: Mutex::new(Vec::new()),
        }
    }

    /// Wait this long before answering a proposal.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn proposals(&self) -> Vec<ReceivedProposal> {
        self.proposals.lock().unwrap().clone()
    }

    /// Every "proceed with reclamation" received, in arrival order.
    pub fn proceeds(&self) -> Vec<(SignalId, Vec<EvaluatorId>)> {
        self.proceeds.lock().unwrap().clone()
    }

    /// Evaluators reclaimed for one signal.
    pub fn reclaimed_for(&self, signal: &SignalId) -> Vec<EvaluatorId> {
        self.proceeds
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == signal)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl ClusterManagerLink for ScriptedClusterManager {
    async fn propose(
        &self,
        signal: &SignalId,
        request: &ResourceRequest,
        proposal: &MitigationProposal,
    ) -> PreemptionResult<ProposalVerdict> {
        self.proposals.lock().unwrap().push(ReceivedProposal {
            signal: signal.clone(),
            request: *request,
            proposal: proposal.clone(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.verdict {
            ScriptedVerdict::Accept => Ok(ProposalVerdict::Accepted),
            ScriptedVerdict::Reject(reason) => Ok(ProposalVerdict::Rejected {
                reason: reason.clone(),
            }),
            ScriptedVerdict::Silent => std::future::pending().await,
            ScriptedVerdict::Fail(reason) => Err(PreemptionError::link(reason)),
        }
    }

    async fn proceed(&self, signal: &SignalId, evaluators: &EvaluatorSet) -> PreemptionResult<()> {
        self.proceeds
            .lock()
            .unwrap()
            .push((signal.clone(), evaluators.iter().cloned().collect()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingHandler
// ---------------------------------------------------------------------------

/// One handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerCall {
    Strict(Vec<EvaluatorId>),
    Flexible(Vec<EvaluatorId>, ResourceRequest),
    Resolved(NegotiationOutcome),
}

/// Handler that records calls and answers flexible events with a fixed
/// proposal (or declines when none is set).
#[derive(Debug, Default)]
pub struct RecordingHandler {
    proposal: Option<MitigationProposal>,
    delay: Duration,
    calls: Mutex<Vec<HandlerCall>>,
}

impl RecordingHandler {
    /// A handler that declines every flexible event.
    pub fn declining() -> Self {
        Self::default()
    }

    pub fn proposing(proposal: MitigationProposal) -> Self {
        Self {
            proposal: Some(proposal),
            ..Self::default()
        }
    }

    /// Sleep this long inside each strict/flexible callback.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> Vec<NegotiationOutcome> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                HandlerCall::Resolved(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl PreemptionHandler for RecordingHandler {
    async fn on_strict_preemption(&self, to_be_preempted: &EvaluatorSet) {
        self.pause().await;
        self.calls
            .lock()
            .unwrap()
            .push(HandlerCall::Strict(to_be_preempted.iter().cloned().collect()));
    }

    async fn on_flexible_preemption(
        &self,
        to_be_preempted: &EvaluatorSet,
        request_to_satisfy: &ResourceRequest,
    ) -> Option<MitigationProposal> {
        self.pause().await;
        self.calls.lock().unwrap().push(HandlerCall::Flexible(
            to_be_preempted.iter().cloned().collect(),
            *request_to_satisfy,
        ));
        self.proposal.clone()
    }

    async fn on_mitigation_resolved(&self, outcome: &NegotiationOutcome) {
        self.calls
            .lock()
            .unwrap()
            .push(HandlerCall::Resolved(outcome.clone()));
    }
}
