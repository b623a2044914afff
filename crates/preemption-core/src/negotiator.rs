//! Mitigation Negotiator.
//!
//! Round-trips a driver's [`MitigationProposal`] for a flexible event to the
//! cluster manager and resolves it to one terminal state:
//!
//! ```text
//! Proposed ──accept──────────▶ Accepted   (original evaluators kept)
//!    │ ───reject / link error─▶ Rejected   (original evaluators reclaimed)
//!    │ ───driver shutdown─────▶ Rejected
//!    └────timeout─────────────▶ TimedOut   (original evaluators reclaimed)
//! ```
//!
//! Every non-accepted outcome forwards exactly one "proceed" for the original
//! set. A verdict that arrives after the timeout is dropped with the
//! cancelled request, so it can never trigger a second reclamation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::adapter::{ProposalVerdict, ResourceManagerAdapter};
use crate::event::{EvaluatorSet, EventId, FlexiblePreemption, SignalId};
use crate::metrics::METRICS;
use crate::obs::emit_negotiation_resolved;
use crate::proposal::MitigationProposal;
use crate::shutdown::ShutdownSignal;

/// Negotiation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Proposed,
    Accepted,
    Rejected,
    TimedOut,
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NegotiationState::Proposed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Proposed => "proposed",
            NegotiationState::Accepted => "accepted",
            NegotiationState::Rejected => "rejected",
            NegotiationState::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one negotiation, reported back to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegotiationOutcome {
    pub event_id: EventId,
    pub signal: SignalId,
    pub state: NegotiationState,
    pub to_be_preempted: EvaluatorSet,
    pub proposal: MitigationProposal,
    /// Why the proposal did not go through, when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NegotiationOutcome {
    /// Whether the original evaluators are reclaimed.
    pub fn reclaimed(&self) -> bool {
        self.state != NegotiationState::Accepted
    }

    /// Whether the driver's proposal fell back to strict reclamation.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self.state,
            NegotiationState::Rejected | NegotiationState::TimedOut
        )
    }
}

/// Drives proposals through the adapter with a bounded wait.
#[derive(Clone)]
pub struct MitigationNegotiator {
    adapter: Arc<ResourceManagerAdapter>,
    timeout: Duration,
    shutdown: ShutdownSignal,
}

impl MitigationNegotiator {
    pub fn new(
        adapter: Arc<ResourceManagerAdapter>,
        timeout: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            adapter,
            timeout,
            shutdown,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Offer `proposal` for `event` and settle the outcome.
    ///
    /// Never fails: link errors and shutdown resolve to `Rejected`.
    #[instrument(skip_all, fields(event_id = %event.id(), signal_id = %event.signal()))]
    pub async fn negotiate(
        &self,
        event: &FlexiblePreemption,
        proposal: MitigationProposal,
    ) -> NegotiationOutcome {
        debug!(
            state = %NegotiationState::Proposed,
            release = proposal.release.len(),
            request = %event.request_to_satisfy(),
            "offering mitigation"
        );

        let mut shutdown = self.shutdown.clone();
        let (state, reason) = tokio::select! {
            biased;
            _ = shutdown.wait() => (
                NegotiationState::Rejected,
                Some("driver is shutting down".to_string()),
            ),
            verdict = tokio::time::timeout(self.timeout, self.adapter.propose(event, &proposal)) => {
                match verdict {
                    Ok(Ok(ProposalVerdict::Accepted)) => (NegotiationState::Accepted, None),
                    Ok(Ok(ProposalVerdict::Rejected { reason })) => {
                        (NegotiationState::Rejected, Some(reason))
                    }
                    Ok(Err(e)) => (NegotiationState::Rejected, Some(e.to_string())),
                    Err(_) => (
                        NegotiationState::TimedOut,
                        Some(format!("no verdict within {}ms", self.timeout.as_millis())),
                    ),
                }
            }
        };

        match state {
            NegotiationState::Accepted => METRICS.inc_proposals_accepted(),
            NegotiationState::TimedOut => METRICS.inc_negotiations_timed_out(),
            _ => METRICS.inc_proposals_rejected(),
        }

        let outcome = NegotiationOutcome {
            event_id: event.id(),
            signal: event.signal().clone(),
            state,
            to_be_preempted: event.to_be_preempted().clone(),
            proposal,
            reason,
        };

        if outcome.reclaimed() {
            // Failure to forward is already reported by the adapter; the
            // cluster manager reclaims on its own deadline regardless.
            let _ = self
                .adapter
                .proceed(&outcome.signal, &outcome.to_be_preempted)
                .await;
        }

        emit_negotiation_resolved(outcome.event_id, state.as_str(), outcome.reclaimed());
        outcome
    }
}
