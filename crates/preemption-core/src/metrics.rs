//! Global atomic counters for preemption observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the signal listener stops).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters, one per reportable condition.
pub struct Metrics {
    signals_received: AtomicU64,
    events_dispatched: AtomicU64,
    events_suppressed: AtomicU64,
    unknown_evaluators: AtomicU64,
    proposals_accepted: AtomicU64,
    proposals_rejected: AtomicU64,
    negotiations_timed_out: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            signals_received: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            events_suppressed: AtomicU64::new(0),
            unknown_evaluators: AtomicU64::new(0),
            proposals_accepted: AtomicU64::new(0),
            proposals_rejected: AtomicU64::new(0),
            negotiations_timed_out: AtomicU64::new(0),
        }
    }

    pub fn inc_signals_received(&self) {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "signals_received", "counter incremented");
    }

    pub fn inc_events_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_dispatched", "counter incremented");
    }

    pub fn inc_events_suppressed(&self) {
        self.events_suppressed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_suppressed", "counter incremented");
    }

    pub fn inc_unknown_evaluators(&self) {
        self.unknown_evaluators.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "unknown_evaluators", "counter incremented");
    }

    pub fn inc_proposals_accepted(&self) {
        self.proposals_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "proposals_accepted", "counter incremented");
    }

    pub fn inc_proposals_rejected(&self) {
        self.proposals_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "proposals_rejected", "counter incremented");
    }

    pub fn inc_negotiations_timed_out(&self) {
        self.negotiations_timed_out.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "negotiations_timed_out", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            signals_received = self.signals_received(),
            events_dispatched = self.events_dispatched(),
            events_suppressed = self.events_suppressed(),
            unknown_evaluators = self.unknown_evaluators(),
            proposals_accepted = self.proposals_accepted(),
            proposals_rejected = self.proposals_rejected(),
            negotiations_timed_out = self.negotiations_timed_out(),
        );
    }

    pub fn signals_received(&self) -> u64 {
        self.signals_received.load(Ordering::Relaxed)
    }

    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    pub fn events_suppressed(&self) -> u64 {
        self.events_suppressed.load(Ordering::Relaxed)
    }

    pub fn unknown_evaluators(&self) -> u64 {
        self.unknown_evaluators.load(Ordering::Relaxed)
    }

    pub fn proposals_accepted(&self) -> u64 {
        self.proposals_accepted.load(Ordering::Relaxed)
    }

    pub fn proposals_rejected(&self) -> u64 {
        self.proposals_rejected.load(Ordering::Relaxed)
    }

    pub fn negotiations_timed_out(&self) -> u64 {
        self.negotiations_timed_out.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.signals_received.store(0, Ordering::Relaxed);
        self.events_dispatched.store(0, Ordering::Relaxed);
        self.events_suppressed.store(0, Ordering::Relaxed);
        self.unknown_evaluators.store(0, Ordering::Relaxed);
        self.proposals_accepted.store(0, Ordering::Relaxed);
        self.proposals_rejected.store(0, Ordering::Relaxed);
        self.negotiations_timed_out.store(0, Ordering::Relaxed);
    }
}
