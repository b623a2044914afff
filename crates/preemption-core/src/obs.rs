//! Structured observability hooks for the preemption lifecycle.
//!
//! This module provides:
//! - Event-scoped tracing spans via [`event_span`], attached to each delivery task
//! - Emission functions for each reportable condition: unknown evaluators,
//!   suppressed events, malformed signals, missing or panicking handlers,
//!   negotiation outcomes
//!
//! Normal flow is emitted at `info!`, recovered anomalies at `warn!`.
//! For JSON output, initialise tracing with [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

use crate::event::{EventId, PreemptionKind, SignalId};

/// Span tagged with the event and signal ids, instrumented onto the task that
/// delivers the event.
pub fn event_span(event_id: EventId, signal: &SignalId) -> tracing::Span {
    tracing::info_span!("preemption.event", event_id = %event_id, signal_id = %signal)
}

/// A signal listed an evaluator the driver does not know as running.
pub fn emit_unknown_evaluator(signal: &SignalId, evaluator_id: &str) {
    warn!(
        event = "preemption.unknown_evaluator",
        signal_id = %signal,
        evaluator_id = %evaluator_id,
        "dropping evaluator unknown to the driver"
    );
}

/// Every listed evaluator was filtered out; nothing is dispatched.
pub fn emit_event_suppressed(signal: &SignalId, listed: usize) {
    info!(
        event = "preemption.suppressed",
        signal_id = %signal,
        listed = listed,
        "no running evaluators left after filtering"
    );
}

/// The adapter refused a signal it could not interpret.
pub fn emit_malformed_signal(error: &dyn std::fmt::Display) {
    warn!(event = "preemption.malformed_signal", error = %error);
}

/// An event was constructed and handed to the dispatcher.
pub fn emit_event_dispatched(event_id: EventId, kind: PreemptionKind, evaluators: usize) {
    info!(
        event = "preemption.dispatched",
        event_id = %event_id,
        kind = %kind,
        evaluators = evaluators,
    );
}

/// An event arrived with no handler registered.
pub fn emit_no_handler(event_id: EventId, kind: PreemptionKind) {
    warn!(
        event = "preemption.no_handler",
        event_id = %event_id,
        kind = %kind,
        "no preemption handler registered; proceeding with reclamation"
    );
}

/// The driver's handler panicked while handling an event. Reclamation
/// proceeds as if the event had been declined.
pub fn emit_handler_panicked(event_id: EventId, kind: PreemptionKind, message: &str) {
    warn!(
        event = "preemption.handler_panicked",
        event_id = %event_id,
        kind = %kind,
        panic = %message,
        "preemption handler panicked; proceeding with reclamation"
    );
}

/// The driver declined to mitigate a flexible event.
pub fn emit_declined(event_id: EventId) {
    info!(event = "preemption.declined", event_id = %event_id);
}

/// A negotiation reached a terminal state.
pub fn emit_negotiation_resolved(event_id: EventId, state: &str, reclaimed: bool) {
    info!(
        event = "preemption.negotiation_resolved",
        event_id = %event_id,
        state = %state,
        reclaimed = reclaimed,
    );
}

/// Forwarding a response to the cluster manager failed.
pub fn emit_link_error(signal: &SignalId, error: &dyn std::fmt::Display) {
    warn!(event = "preemption.link_error", signal_id = %signal, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_span_create() {
        let span = event_span(EventId::new(), &SignalId::new("s-1"));
        let _entered = span.enter();
    }
}
