//! Preemption Dispatcher.
//!
//! Delivers each [`PreemptionEvent`] once to the driver's registered
//! [`PreemptionHandler`] on its own tokio task.
//!
//! Ordering: delivery of an event happens-before delivery of any event
//! dispatched later that names one of the same evaluators. Events with
//! disjoint evaluator sets never wait on each other. Each evaluator id keeps a
//! "tail" completion signal in an ordering table; a new event records itself
//! as the tail of each of its ids (synchronously, inside `dispatch`) and its
//! task waits for the previous tails before calling the handler.
//!
//! A panicking handler is treated as a decline: the panic is caught, reported,
//! and the cluster manager is still told to proceed.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use evaluator_registry::EvaluatorId;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{warn, Instrument};

use crate::adapter::ResourceManagerAdapter;
use crate::event::{
    EvaluatorSet, EventId, FlexiblePreemption, PreemptionEvent, PreemptionKind, ResourceRequest,
    SignalId, StrictPreemption,
};
use crate::metrics::METRICS;
use crate::negotiator::{MitigationNegotiator, NegotiationOutcome};
use crate::obs::{
    emit_declined, emit_event_dispatched, emit_handler_panicked, emit_no_handler, event_span,
};
use crate::proposal::MitigationProposal;

/// Driver-side receiver of preemption notifications.
///
/// One handler is registered per driver. Implementations may be called
/// concurrently for events naming disjoint evaluators.
#[async_trait]
pub trait PreemptionHandler: Send + Sync {
    /// The listed evaluators will be reclaimed. Informational only.
    async fn on_strict_preemption(&self, to_be_preempted: &EvaluatorSet);

    /// The listed evaluators will be reclaimed unless the driver offers
    /// another way to satisfy `request_to_satisfy`. Returning `None` declines.
    async fn on_flexible_preemption(
        &self,
        to_be_preempted: &EvaluatorSet,
        request_to_satisfy: &ResourceRequest,
    ) -> Option<MitigationProposal>;

    /// Result of a proposal made from `on_flexible_preemption`. On a fallback
    /// the original evaluators are being reclaimed.
    async fn on_mitigation_resolved(&self, _outcome: &NegotiationOutcome) {}
}

/// How one delivery ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Strict event delivered.
    Informed,
    /// No handler was registered; reclamation proceeded.
    NoHandler,
    /// The handler offered no proposal; reclamation proceeded.
    Declined,
    /// The handler panicked; reclamation proceeded.
    HandlerPanicked { message: String },
    /// The handler's proposal was negotiated.
    Negotiated { negotiation: NegotiationOutcome },
}

/// Summary returned by the delivery task of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub event_id: EventId,
    pub signal: SignalId,
    pub kind: PreemptionKind,
    pub evaluators: Vec<EvaluatorId>,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

impl DispatchReport {
    /// Whether the originally listed evaluators end up reclaimed.
    pub fn reclaimed(&self) -> bool {
        match &self.outcome {
            DeliveryOutcome::Negotiated { negotiation } => negotiation.reclaimed(),
            _ => true,
        }
    }
}

type Tail = (EventId, watch::Receiver<bool>);

/// Per-evaluator chain of delivery completions.
#[derive(Default)]
struct OrderingTable {
    tails: Mutex<HashMap<EvaluatorId, Tail>>,
}

impl OrderingTable {
    /// Make `event_id` the tail for each id and return the tails it replaced.
    fn enqueue(
        &self,
        event_id: EventId,
        evaluators: &EvaluatorSet,
        done: &watch::Sender<bool>,
    ) -> Vec<watch::Receiver<bool>> {
        let mut tails = self.tails.lock().unwrap_or_else(PoisonError::into_inner);
        evaluators
            .iter()
            .filter_map(|id| {
                tails
                    .insert(id.clone(), (event_id, done.subscribe()))
                    .map(|(_, rx)| rx)
            })
            .collect()
    }

    /// Drop entries still pointing at `event_id`.
    fn release(&self, event_id: EventId, evaluators: &[EvaluatorId]) {
        let mut tails = self.tails.lock().unwrap_or_else(PoisonError::into_inner);
        for id in evaluators {
            if tails.get(id).is_some_and(|(tail, _)| *tail == event_id) {
                tails.remove(id);
            }
        }
    }

    fn len(&self) -> usize {
        self.tails.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Marks a delivery complete even if the handler panics or the task is aborted.
struct CompletionGuard {
    inner: Arc<DispatcherInner>,
    event_id: EventId,
    evaluators: Vec<EvaluatorId>,
    done: watch::Sender<bool>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.done.send_replace(true);
        self.inner.ordering.release(self.event_id, &self.evaluators);
    }
}

struct DispatcherInner {
    handler: RwLock<Option<Arc<dyn PreemptionHandler>>>,
    adapter: Arc<ResourceManagerAdapter>,
    negotiator: MitigationNegotiator,
    ordering: OrderingTable,
}

/// Delivers events to the registered handler. Cheap to clone.
#[derive(Clone)]
pub struct PreemptionDispatcher {
    inner: Arc<DispatcherInner>,
}

impl PreemptionDispatcher {
    pub fn new(adapter: Arc<ResourceManagerAdapter>, negotiator: MitigationNegotiator) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                handler: RwLock::new(None),
                adapter,
                negotiator,
                ordering: OrderingTable::default(),
            }),
        }
    }

    /// Register the driver's handler, replacing any previous one.
    pub fn register_handler(&self, handler: Arc<dyn PreemptionHandler>) {
        let mut slot = self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.replace(handler).is_some() {
            warn!("replacing previously registered preemption handler");
        }
    }

    pub fn clear_handler(&self) {
        let mut slot = self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    pub fn has_handler(&self) -> bool {
        self.inner.handler_snapshot().is_some()
    }

    /// Number of evaluators with a delivery in flight or queued.
    pub fn pending_evaluators(&self) -> usize {
        self.inner.ordering.len()
    }

    /// Deliver `event` on a new task. Must be called within a tokio runtime.
    ///
    /// The ordering position is fixed here, before the task is spawned.
    pub fn dispatch(&self, event: PreemptionEvent) -> JoinHandle<DispatchReport> {
        let event_id = event.id();
        let (done, _) = watch::channel(false);
        let predecessors = self
            .inner
            .ordering
            .enqueue(event_id, event.to_be_preempted(), &done);

        METRICS.inc_events_dispatched();
        emit_event_dispatched(event_id, event.kind(), event.to_be_preempted().len());

        let guard = CompletionGuard {
            inner: Arc::clone(&self.inner),
            event_id,
            evaluators: event.to_be_preempted().iter().cloned().collect(),
            done,
        };
        let span = event_span(event_id, event.signal());
        let inner = Arc::clone(&self.inner);

        tokio::spawn(
            async move {
                let _guard = guard;
                for mut predecessor in predecessors {
                    // A closed channel means the predecessor's guard is gone too.
                    let _ = predecessor.wait_for(|done| *done).await;
                }
                inner.deliver(event).await
            }
            .instrument(span),
        )
    }
}

impl DispatcherInner {
    fn handler_snapshot(&self) -> Option<Arc<dyn PreemptionHandler>> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn deliver(&self, event: PreemptionEvent) -> DispatchReport {
        let handler = self.handler_snapshot();
        match event {
            PreemptionEvent::Strict(event) => self.deliver_strict(handler, event).await,
            PreemptionEvent::Flexible(event) => self.deliver_flexible(handler, event).await,
        }
    }

    async fn deliver_strict(
        &self,
        handler: Option<Arc<dyn PreemptionHandler>>,
        event: StrictPreemption,
    ) -> DispatchReport {
        let outcome = match handler {
            Some(handler) => {
                let delivered =
                    AssertUnwindSafe(handler.on_strict_preemption(event.to_be_preempted()))
                        .catch_unwind()
                        .await;
                match delivered {
                    Ok(()) => DeliveryOutcome::Informed,
                    Err(payload) => handler_panicked(event.id(), PreemptionKind::Strict, payload),
                }
            }
            None => {
                emit_no_handler(event.id(), PreemptionKind::Strict);
                DeliveryOutcome::NoHandler
            }
        };
        let _ = self
            .adapter
            .proceed(event.signal(), event.to_be_preempted())
            .await;
        report(
            event.id(),
            event.signal(),
            PreemptionKind::Strict,
            event.to_be_preempted(),
            outcome,
        )
    }

    async fn deliver_flexible(
        &self,
        handler: Option<Arc<dyn PreemptionHandler>>,
        event: FlexiblePreemption,
    ) -> DispatchReport {
        let proposal = match &handler {
            Some(handler) => {
                let offered = AssertUnwindSafe(
                    handler.on_flexible_preemption(
                        event.to_be_preempted(),
                        event.request_to_satisfy(),
                    ),
                )
                .catch_unwind()
                .await;
                match offered {
                    Ok(proposal) => proposal,
                    Err(payload) => {
                        let outcome =
                            handler_panicked(event.id(), PreemptionKind::Flexible, payload);
                        self.proceed_with_reclamation(&event).await;
                        return report(
                            event.id(),
                            event.signal(),
                            PreemptionKind::Flexible,
                            event.to_be_preempted(),
                            outcome,
                        );
                    }
                }
            }
            None => None,
        };

        let outcome = match (handler, proposal) {
            (None, _) => {
                emit_no_handler(event.id(), PreemptionKind::Flexible);
                self.proceed_with_reclamation(&event).await;
                DeliveryOutcome::NoHandler
            }
            (Some(handler), Some(proposal)) if !proposal.is_empty() => {
                let negotiation = self.negotiator.negotiate(&event, proposal).await;
                // The outcome is settled and forwarded already; a panic here
                // only costs the handler its notification.
                let notified = AssertUnwindSafe(handler.on_mitigation_resolved(&negotiation))
                    .catch_unwind()
                    .await;
                if let Err(payload) = notified {
                    let message = panic_message(payload.as_ref());
                    emit_handler_panicked(event.id(), PreemptionKind::Flexible, &message);
                }
                DeliveryOutcome::Negotiated { negotiation }
            }
            (Some(_), proposal) => {
                if proposal.is_some() {
                    warn!(event_id = %event.id(), "empty mitigation proposal treated as decline");
                }
                emit_declined(event.id());
                self.proceed_with_reclamation(&event).await;
                DeliveryOutcome::Declined
            }
        };

        report(
            event.id(),
            event.signal(),
            PreemptionKind::Flexible,
            event.to_be_preempted(),
            outcome,
        )
    }

    async fn proceed_with_reclamation(&self, event: &FlexiblePreemption) {
        let _ = self
            .adapter
            .proceed(event.signal(), event.to_be_preempted())
            .await;
    }
}

fn handler_panicked(
    event_id: EventId,
    kind: PreemptionKind,
    payload: Box<dyn Any + Send>,
) -> DeliveryOutcome {
    let message = panic_message(payload.as_ref());
    emit_handler_panicked(event_id, kind, &message);
    DeliveryOutcome::HandlerPanicked { message }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn report(
    event_id: EventId,
    signal: &SignalId,
    kind: PreemptionKind,
    evaluators: &EvaluatorSet,
    outcome: DeliveryOutcome,
) -> DispatchReport {
    DispatchReport {
        event_id,
        signal: signal.clone(),
        kind,
        evaluators: evaluators.iter().cloned().collect(),
        outcome,
    }
}
