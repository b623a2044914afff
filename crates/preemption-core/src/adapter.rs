//! Resource Manager Adapter.
//!
//! The only place cluster-manager protocol detail enters the subsystem. In the
//! inbound direction it turns a [`RawPreemptionSignal`] into at most one
//! [`PreemptionEvent`], filtering out evaluators the driver no longer runs. In
//! the outbound direction it forwards driver responses through a
//! [`ClusterManagerLink`].
//!
//! The adapter never releases or terminates an evaluator itself.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use evaluator_registry::EvaluatorRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::PreemptionResult;
use crate::event::{EvaluatorSet, FlexiblePreemption, PreemptionEvent, ResourceRequest, SignalId};
use crate::metrics::METRICS;
use crate::obs::{
    emit_event_suppressed, emit_link_error, emit_malformed_signal, emit_unknown_evaluator,
};
use crate::proposal::MitigationProposal;
use crate::signal::{decode_signal, RawPreemptionSignal};

/// The cluster manager's answer to a mitigation proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ProposalVerdict {
    Accepted,
    Rejected { reason: String },
}

/// Outbound half of a cluster-manager connection.
///
/// Implementations own the wire encoding. Both calls identify the original
/// signal so the cluster manager can correlate them.
#[async_trait]
pub trait ClusterManagerLink: Send + Sync {
    /// Offer `proposal` in place of reclaiming the signalled evaluators.
    ///
    /// May take arbitrarily long; callers bound the wait.
    async fn propose(
        &self,
        signal: &SignalId,
        request: &ResourceRequest,
        proposal: &MitigationProposal,
    ) -> PreemptionResult<ProposalVerdict>;

    /// Tell the cluster manager to go ahead with the original reclamation.
    async fn proceed(&self, signal: &SignalId, evaluators: &EvaluatorSet) -> PreemptionResult<()>;
}

/// Translates signals into events and forwards driver responses.
pub struct ResourceManagerAdapter {
    registry: Arc<dyn EvaluatorRegistry>,
    link: Arc<dyn ClusterManagerLink>,
}

impl ResourceManagerAdapter {
    pub fn new(registry: Arc<dyn EvaluatorRegistry>, link: Arc<dyn ClusterManagerLink>) -> Self {
        Self { registry, link }
    }

    /// Decode the JSON form of a signal and translate it.
    pub async fn ingest(&self, bytes: &[u8]) -> PreemptionResult<Option<PreemptionEvent>> {
        METRICS.inc_signals_received();
        let raw = decode_signal(bytes).inspect_err(|e| emit_malformed_signal(e))?;
        self.resolve(raw).await
    }

    /// Turn a signal into an event.
    ///
    /// Returns `Ok(None)` when none of the listed evaluators is running, and
    /// `Err(MalformedSignal)` when the signal itself is unusable.
    pub async fn translate(
        &self,
        raw: RawPreemptionSignal,
    ) -> PreemptionResult<Option<PreemptionEvent>> {
        METRICS.inc_signals_received();
        self.resolve(raw).await
    }

    #[instrument(skip_all, fields(listed = raw.evaluators.len()))]
    async fn resolve(
        &self,
        raw: RawPreemptionSignal,
    ) -> PreemptionResult<Option<PreemptionEvent>> {
        let signal = raw.validate().inspect_err(|e| emit_malformed_signal(e))?;
        let listed = signal.evaluators.len();

        let mut resolved = BTreeSet::new();
        for id in signal.evaluators {
            match self.registry.lookup(&id).await {
                Some(evaluator) => {
                    resolved.insert(evaluator.into_id());
                }
                None => {
                    METRICS.inc_unknown_evaluators();
                    emit_unknown_evaluator(&signal.signal, id.as_str());
                }
            }
        }

        let Some(to_be_preempted) = EvaluatorSet::from_resolved(resolved) else {
            METRICS.inc_events_suppressed();
            emit_event_suppressed(&signal.signal, listed);
            return Ok(None);
        };

        let event = match signal.request {
            Some(request) => PreemptionEvent::flexible(signal.signal, to_be_preempted, request),
            None => PreemptionEvent::strict(signal.signal, to_be_preempted),
        };
        debug!(event_id = %event.id(), kind = %event.kind(), "constructed preemption event");
        Ok(Some(event))
    }

    /// Forward "proceed with original reclamation".
    ///
    /// Evaluators that left the registry since the event was built are
    /// already gone; they are noted and the original set is still forwarded.
    pub async fn proceed(
        &self,
        signal: &SignalId,
        evaluators: &EvaluatorSet,
    ) -> PreemptionResult<()> {
        for id in evaluators {
            if !self.registry.is_running(id).await {
                debug!(signal_id = %signal, evaluator_id = %id, "evaluator already gone");
            }
        }
        self.link
            .proceed(signal, evaluators)
            .await
            .inspect_err(|e| emit_link_error(signal, e))
    }

    /// Forward a mitigation proposal for a flexible event and wait for the
    /// verdict. The wait is unbounded here; the negotiator bounds it.
    pub async fn propose(
        &self,
        event: &FlexiblePreemption,
        proposal: &MitigationProposal,
    ) -> PreemptionResult<ProposalVerdict> {
        self.link
            .propose(event.signal(), event.request_to_satisfy(), proposal)
            .await
            .inspect_err(|e| emit_link_error(event.signal(), e))
    }
}

#[cfg(test)]
mod tests {
    use evaluator_registry::fakes::MemoryEvaluatorRegistry;
    use evaluator_registry::ResourceShape;
    use tracing_test::traced_test;

    use super::*;
    use crate::error::PreemptionError;
    use crate::event::PreemptionKind;
    use crate::fakes::{ScriptedClusterManager, ScriptedVerdict};

    fn adapter(running: &[&str], verdict: ScriptedVerdict) -> ResourceManagerAdapter {
        let registry = MemoryEvaluatorRegistry::new();
        for id in running {
            registry
                .insert_running(id, ResourceShape::new(1, 512))
                .unwrap();
        }
        ResourceManagerAdapter::new(
            Arc::new(registry),
            Arc::new(ScriptedClusterManager::new(verdict)),
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_evaluator_is_reported_and_dropped() {
        let adapter = adapter(&["eval-1"], ScriptedVerdict::Accept);
        let event = adapter
            .translate(RawPreemptionSignal::strict(["eval-1", "eval-gone"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.to_be_preempted().len(), 1);
        assert!(logs_contain("dropping evaluator unknown to the driver"));
        assert!(logs_contain("eval-gone"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_all_unknown_is_suppressed_and_reported() {
        let adapter = adapter(&[], ScriptedVerdict::Accept);
        let event = adapter
            .translate(RawPreemptionSignal::strict(["eval-a", "eval-b"]).with_signal_id("s-0"))
            .await
            .unwrap();

        assert!(event.is_none());
        assert!(logs_contain("preemption.suppressed"));
    }

    #[tokio::test]
    async fn test_ingest_builds_flexible_event_from_json() {
        let adapter = adapter(&["eval-3"], ScriptedVerdict::Accept);
        let bytes = br#"{"signal_id":"s-7","evaluators":["eval-3"],"request":{"count":2,"cores":4,"memory_mb":8192}}"#;
        let event = adapter.ingest(bytes).await.unwrap().unwrap();

        assert_eq!(event.kind(), PreemptionKind::Flexible);
        assert_eq!(event.signal().as_str(), "s-7");
        match event {
            PreemptionEvent::Flexible(flexible) => {
                assert_eq!(flexible.request_to_satisfy().count(), 2);
                assert_eq!(
                    flexible.request_to_satisfy().shape(),
                    ResourceShape::new(4, 8192)
                );
            }
            PreemptionEvent::Strict(_) => panic!("expected a flexible event"),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_ingest_rejects_garbage() {
        let adapter = adapter(&["eval-1"], ScriptedVerdict::Accept);
        let result = adapter.ingest(b"{\"evaluators\": 7}").await;

        assert!(matches!(result, Err(PreemptionError::MalformedSignal { .. })));
        assert!(logs_contain("preemption.malformed_signal"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_link_failure_on_propose_is_reported() {
        let adapter = adapter(&["eval-3"], ScriptedVerdict::Fail("broken pipe".to_string()));
        let Some(PreemptionEvent::Flexible(event)) = adapter
            .translate(RawPreemptionSignal::flexible(["eval-3"], 1, 1, 512))
            .await
            .unwrap()
        else {
            panic!("expected a flexible event");
        };

        let proposal = MitigationProposal::release(vec![evaluator_registry::EvaluatorId::new(
            "eval-9",
        )
        .unwrap()]);
        let result = adapter.propose(&event, &proposal).await;

        assert!(matches!(result, Err(PreemptionError::Link { .. })));
        assert!(logs_contain("preemption.link_error"));
    }
}
