//! Negotiation outcomes for flexible preemption.

use std::sync::Arc;
use std::time::Duration;

use evaluator_registry::fakes::MemoryEvaluatorRegistry;
use evaluator_registry::{EvaluatorId, ResourceShape};
use preemption_core::fakes::{
    HandlerCall, RecordingHandler, ScriptedClusterManager, ScriptedVerdict,
};
use preemption_core::{
    DeliveryOutcome, DispatchReport, MitigationProposal, NegotiationOutcome, NegotiationState,
    PreemptionConfig, PreemptionSubsystem, RawPreemptionSignal, SignalId,
};

fn id(s: &str) -> EvaluatorId {
    EvaluatorId::new(s).unwrap()
}

fn system(link: Arc<ScriptedClusterManager>, timeout: Duration) -> PreemptionSubsystem {
    let registry = MemoryEvaluatorRegistry::new();
    for evaluator in ["eval-1", "eval-3", "eval-9"] {
        registry
            .insert_running(evaluator, ResourceShape::new(2, 4096))
            .unwrap();
    }
    PreemptionSubsystem::new(
        Arc::new(registry),
        link,
        PreemptionConfig::with_negotiation_timeout(timeout),
    )
    .unwrap()
}

fn flexible(signal: &str) -> RawPreemptionSignal {
    RawPreemptionSignal::flexible(["eval-3"], 1, 2, 4096).with_signal_id(signal)
}

fn release_idle() -> MitigationProposal {
    MitigationProposal::release(vec![id("eval-9")])
}

fn negotiation(report: &DispatchReport) -> &NegotiationOutcome {
    match &report.outcome {
        DeliveryOutcome::Negotiated { negotiation } => negotiation,
        other => panic!("expected a negotiation, got {other:?}"),
    }
}

async fn run(system: &PreemptionSubsystem, signal: RawPreemptionSignal) -> DispatchReport {
    system
        .submit(signal)
        .await
        .unwrap()
        .expect("event dispatched")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_decline_is_equivalent_to_rejection_for_reclamation() {
    let declined_link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Accept));
    let declining = system(Arc::clone(&declined_link), Duration::from_secs(5));
    declining.register_handler(Arc::new(RecordingHandler::declining()));

    let rejected_link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Reject(
        "no".to_string(),
    )));
    let rejecting = system(Arc::clone(&rejected_link), Duration::from_secs(5));
    rejecting.register_handler(Arc::new(RecordingHandler::proposing(release_idle())));

    let declined = run(&declining, flexible("s-d")).await;
    let rejected = run(&rejecting, flexible("s-r")).await;

    assert_eq!(declined.outcome, DeliveryOutcome::Declined);
    assert!(declined.reclaimed());
    assert!(rejected.reclaimed());
    assert!(declined_link.proposals().is_empty());
    assert_eq!(
        declined_link.reclaimed_for(&SignalId::new("s-d")),
        rejected_link.reclaimed_for(&SignalId::new("s-r")),
    );
}

#[tokio::test]
async fn test_handler_hears_outcome_after_its_proposal() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Accept));
    let system = system(link, Duration::from_secs(5));
    let handler = Arc::new(RecordingHandler::proposing(release_idle()));
    system.register_handler(handler.clone());

    run(&system, flexible("s-h")).await;

    let calls = handler.calls();
    assert_eq!(calls.len(), 2);
    match &calls[0] {
        HandlerCall::Flexible(ids, request) => {
            assert_eq!(ids, &vec![id("eval-3")]);
            assert_eq!(request.count(), 1);
        }
        other => panic!("expected flexible delivery, got {other:?}"),
    }
    match &calls[1] {
        HandlerCall::Resolved(outcome) => {
            assert_eq!(outcome.state, NegotiationState::Accepted);
            assert_eq!(outcome.proposal, release_idle());
        }
        other => panic!("expected resolution, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_late_acceptance_after_timeout_is_ignored() {
    let link = Arc::new(
        ScriptedClusterManager::new(ScriptedVerdict::Accept).with_delay(Duration::from_secs(30)),
    );
    let system = system(Arc::clone(&link), Duration::from_secs(2));
    system.register_handler(Arc::new(RecordingHandler::proposing(release_idle())));

    let report = run(&system, flexible("s-late")).await;
    assert_eq!(negotiation(&report).state, NegotiationState::TimedOut);
    assert_eq!(
        negotiation(&report).reason.as_deref(),
        Some("no verdict within 2000ms")
    );

    // Let the would-be acceptance time pass; nothing further may happen.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(link.proceeds().len(), 1);
    assert_eq!(link.reclaimed_for(&SignalId::new("s-late")), vec![id("eval-3")]);
}

#[tokio::test]
async fn test_link_failure_during_proposal_resolves_as_rejected() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Fail(
        "connection reset".to_string(),
    )));
    let system = system(Arc::clone(&link), Duration::from_secs(5));
    system.register_handler(Arc::new(RecordingHandler::proposing(release_idle())));

    let report = run(&system, flexible("s-f")).await;
    let outcome = negotiation(&report);

    assert_eq!(outcome.state, NegotiationState::Rejected);
    assert!(outcome
        .reason
        .as_deref()
        .is_some_and(|r| r.contains("connection reset")));
    assert_eq!(link.reclaimed_for(&SignalId::new("s-f")), vec![id("eval-3")]);
}

#[tokio::test]
async fn test_empty_proposal_is_treated_as_decline() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Accept));
    let system = system(Arc::clone(&link), Duration::from_secs(5));
    let handler = Arc::new(RecordingHandler::proposing(MitigationProposal::default()));
    system.register_handler(handler.clone());

    let report = run(&system, flexible("s-e")).await;

    assert_eq!(report.outcome, DeliveryOutcome::Declined);
    assert!(link.proposals().is_empty());
    assert!(handler.outcomes().is_empty());
    assert_eq!(link.reclaimed_for(&SignalId::new("s-e")), vec![id("eval-3")]);
}

#[tokio::test]
async fn test_shutdown_resolves_pending_negotiation_as_rejected() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Silent));
    let system = system(Arc::clone(&link), Duration::from_secs(3600));
    let handler = Arc::new(RecordingHandler::proposing(release_idle()));
    system.register_handler(handler.clone());

    let pending = system.submit(flexible("s-x")).await.unwrap().unwrap();
    while link.proposals().is_empty() {
        tokio::task::yield_now().await;
    }
    system.shutdown();

    let report = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("negotiation resolved on shutdown")
        .unwrap();
    let outcome = negotiation(&report);
    assert_eq!(outcome.state, NegotiationState::Rejected);
    assert!(outcome
        .reason
        .as_deref()
        .is_some_and(|r| r.contains("shutting down")));
    assert_eq!(link.reclaimed_for(&SignalId::new("s-x")), vec![id("eval-3")]);
    assert_eq!(handler.outcomes().len(), 1);
}

#[tokio::test]
async fn test_pending_negotiation_does_not_block_unrelated_events() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Silent));
    let system = system(Arc::clone(&link), Duration::from_secs(3600));
    system.register_handler(Arc::new(RecordingHandler::proposing(release_idle())));

    let flex = system.submit(flexible("s-slow")).await.unwrap().unwrap();
    let strict = system
        .submit(RawPreemptionSignal::strict(["eval-1"]).with_signal_id("s-fast"))
        .await
        .unwrap()
        .unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), strict)
        .await
        .expect("strict event must not wait for the negotiation")
        .unwrap();
    assert_eq!(report.outcome, DeliveryOutcome::Informed);
    assert!(!flex.is_finished());

    system.shutdown();
    let _ = flex.await;
}
