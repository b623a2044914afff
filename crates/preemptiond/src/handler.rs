//! Driver-side handler used when replaying signals.

use async_trait::async_trait;
use evaluator_registry::EvaluatorId;
use preemption_core::{
    EvaluatorSet, MitigationProposal, NegotiationOutcome, PreemptionHandler, ResourceRequest,
};
use tracing::{info, warn};

/// Offers a fixed set of spare evaluators in answer to every flexible event,
/// and declines when it has none.
pub struct SpareEvaluatorHandler {
    spare: Vec<EvaluatorId>,
}

impl SpareEvaluatorHandler {
    pub fn new(spare: Vec<EvaluatorId>) -> Self {
        Self { spare }
    }

    /// Spares not themselves named in the event.
    fn offer_for(&self, to_be_preempted: &EvaluatorSet) -> Option<MitigationProposal> {
        let offer: Vec<_> = self
            .spare
            .iter()
            .filter(|id| !to_be_preempted.contains(id))
            .cloned()
            .collect();
        if offer.is_empty() {
            return None;
        }
        Some(MitigationProposal::release(offer).with_note("idle evaluators offered by preemptiond"))
    }
}

#[async_trait]
impl PreemptionHandler for SpareEvaluatorHandler {
    async fn on_strict_preemption(&self, to_be_preempted: &EvaluatorSet) {
        info!(evaluators = %to_be_preempted, "evaluators will be reclaimed");
    }

    async fn on_flexible_preemption(
        &self,
        to_be_preempted: &EvaluatorSet,
        request_to_satisfy: &ResourceRequest,
    ) -> Option<MitigationProposal> {
        let offer = self.offer_for(to_be_preempted);
        info!(
            evaluators = %to_be_preempted,
            request = %request_to_satisfy,
            offering = offer.as_ref().map_or(0, |p| p.release.len()),
            "flexible preemption received"
        );
        offer
    }

    async fn on_mitigation_resolved(&self, outcome: &NegotiationOutcome) {
        if outcome.is_fallback() {
            warn!(
                state = %outcome.state,
                reason = outcome.reason.as_deref().unwrap_or(""),
                evaluators = %outcome.to_be_preempted,
                "mitigation failed; original evaluators reclaimed"
            );
        } else {
            info!(state = %outcome.state, "mitigation accepted");
        }
    }
}
