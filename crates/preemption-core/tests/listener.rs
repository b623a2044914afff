//! Signal listener loop over an inbound channel.

use std::sync::Arc;
use std::time::Duration;

use evaluator_registry::fakes::MemoryEvaluatorRegistry;
use evaluator_registry::ResourceShape;
use preemption_core::fakes::{RecordingHandler, ScriptedClusterManager, ScriptedVerdict};
use preemption_core::{
    InboundSignal, PreemptionConfig, PreemptionKind, PreemptionSubsystem, RawPreemptionSignal,
};
use tokio::sync::mpsc;

fn system(link: Arc<ScriptedClusterManager>) -> PreemptionSubsystem {
    let registry = MemoryEvaluatorRegistry::new();
    for evaluator in ["eval-1", "eval-2", "eval-3"] {
        registry
            .insert_running(evaluator, ResourceShape::new(2, 4096))
            .unwrap();
    }
    PreemptionSubsystem::new(Arc::new(registry), link, PreemptionConfig::default()).unwrap()
}

#[tokio::test]
async fn test_listener_summarises_mixed_signals() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Accept));
    let system = system(Arc::clone(&link));
    system.register_handler(Arc::new(RecordingHandler::declining()));

    let (tx, rx) = mpsc::channel(8);
    let listener = system.listen(rx);

    tx.send(RawPreemptionSignal::strict(["eval-1", "eval-2"]).into())
        .await
        .unwrap();
    tx.send(InboundSignal::Encoded(
        br#"{"signal_id":"s-json","evaluators":["eval-3"],"request":{"count":1,"cores":2,"memory_mb":4096}}"#
            .to_vec(),
    ))
    .await
    .unwrap();
    tx.send(InboundSignal::Encoded(b"not json".to_vec()))
        .await
        .unwrap();
    tx.send(RawPreemptionSignal::strict(["eval-404"]).into())
        .await
        .unwrap();
    drop(tx);

    let summary = listener.await.unwrap();
    assert_eq!(summary.signals, 4);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(summary.reports.len(), 2);

    let mut kinds: Vec<_> = summary.reports.iter().map(|r| r.kind).collect();
    kinds.sort_by_key(|k| k.to_string());
    assert_eq!(kinds, vec![PreemptionKind::Flexible, PreemptionKind::Strict]);
    assert_eq!(link.proceeds().len(), 2);
}

#[tokio::test]
async fn test_listener_stops_on_shutdown_with_sender_alive() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Accept));
    let system = system(link);

    let (tx, rx) = mpsc::channel::<InboundSignal>(8);
    let listener = system.listen(rx);
    system.shutdown();

    let summary = tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .expect("listener stopped on shutdown")
        .unwrap();
    assert_eq!(summary.signals, 0);
    assert!(summary.reports.is_empty());
    drop(tx);
}

#[tokio::test]
async fn test_listener_waits_for_in_flight_deliveries() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Accept));
    let system = system(Arc::clone(&link));
    let handler = Arc::new(RecordingHandler::declining().with_delay(Duration::from_millis(50)));
    system.register_handler(handler.clone());

    let (tx, rx) = mpsc::channel(8);
    let listener = system.listen(rx);
    tx.send(RawPreemptionSignal::strict(["eval-1"]).into())
        .await
        .unwrap();
    drop(tx);

    let summary = listener.await.unwrap();
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(handler.calls().len(), 1);
    assert_eq!(link.proceeds().len(), 1);
}

#[tokio::test]
async fn test_summary_serialises_reports() {
    let link = Arc::new(ScriptedClusterManager::new(ScriptedVerdict::Accept));
    let system = system(link);

    let (tx, rx) = mpsc::channel(1);
    let listener = system.listen(rx);
    tx.send(RawPreemptionSignal::strict(["eval-2"]).with_signal_id("s-9").into())
        .await
        .unwrap();
    drop(tx);

    let summary = listener.await.unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["signals"], 1);
    assert_eq!(json["reports"][0]["signal"], "s-9");
    assert_eq!(json["reports"][0]["kind"], "strict");
    assert_eq!(json["reports"][0]["outcome"], "no_handler");
    assert_eq!(json["reports"][0]["evaluators"][0], "eval-2");
}
