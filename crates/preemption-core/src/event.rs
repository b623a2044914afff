//! Preemption event model.
//!
//! A [`PreemptionEvent`] is either [`Strict`](PreemptionEvent::Strict) (the
//! evaluators are going away, adapt) or [`Flexible`](PreemptionEvent::Flexible)
//! (the cluster manager would accept another way of satisfying its request).
//! The resource request exists only on the flexible payload, so the two kinds
//! cannot be confused by inspecting an empty field.
//!
//! Events are immutable and are built only by the
//! [`ResourceManagerAdapter`](crate::adapter::ResourceManagerAdapter).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use evaluator_registry::{EvaluatorId, ResourceShape};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PreemptionError, PreemptionResult};

/// Unique id of one constructed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates driver responses with the cluster-manager signal that caused them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    pub fn new(id: impl Into<String>) -> Self {
        SignalId(id.into())
    }

    /// Used when the cluster manager did not tag its signal.
    pub fn generated() -> Self {
        SignalId(format!("sig-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of the two preemption kinds an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreemptionKind {
    Strict,
    Flexible,
}

impl std::fmt::Display for PreemptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreemptionKind::Strict => write!(f, "strict"),
            PreemptionKind::Flexible => write!(f, "flexible"),
        }
    }
}

/// The resource request a flexible preemption wants fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    count: u32,
    shape: ResourceShape,
}

impl ResourceRequest {
    /// `count` units of `shape`. Both must be non-zero.
    pub fn new(count: u32, shape: ResourceShape) -> PreemptionResult<Self> {
        if count == 0 {
            return Err(PreemptionError::malformed(
                "resource request count must be greater than zero",
            ));
        }
        if shape.is_empty() {
            return Err(PreemptionError::malformed(
                "resource request shape must ask for cores or memory",
            ));
        }
        Ok(Self { count, shape })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn shape(&self) -> ResourceShape {
        self.shape
    }

    /// Total cores and memory across all units.
    pub fn total(&self) -> ResourceShape {
        ResourceShape::new(
            self.shape.cores.saturating_mul(self.count),
            self.shape.memory_mb.saturating_mul(u64::from(self.count)),
        )
    }
}

impl std::fmt::Display for ResourceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x ({})", self.count, self.shape)
    }
}

/// Non-empty, duplicate-free snapshot of evaluators named by one event.
///
/// Ordered so that logs and reports are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EvaluatorSet(BTreeSet<EvaluatorId>);

impl EvaluatorSet {
    /// Only the adapter builds sets, after resolving ids against the registry.
    pub(crate) fn from_resolved(ids: BTreeSet<EvaluatorId>) -> Option<Self> {
        if ids.is_empty() {
            None
        } else {
            Some(EvaluatorSet(ids))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &EvaluatorId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvaluatorId> {
        self.0.iter()
    }

    pub fn is_disjoint(&self, other: &EvaluatorSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn as_set(&self) -> &BTreeSet<EvaluatorId> {
        &self.0
    }
}

impl std::fmt::Display for EvaluatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.0.iter().map(EvaluatorId::as_str).collect();
        write!(f, "{{{}}}", ids.join(", "))
    }
}

impl<'a> IntoIterator for &'a EvaluatorSet {
    type Item = &'a EvaluatorId;
    type IntoIter = std::collections::btree_set::Iter<'a, EvaluatorId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug)]
struct EventHeader {
    id: EventId,
    signal: SignalId,
    issued_at: DateTime<Utc>,
}

impl EventHeader {
    fn new(signal: SignalId) -> Self {
        Self {
            id: EventId::new(),
            signal,
            issued_at: Utc::now(),
        }
    }
}

/// Payload of a strict preemption: informational only.
#[derive(Debug)]
pub struct StrictPreemption {
    header: EventHeader,
    to_be_preempted: EvaluatorSet,
}

impl StrictPreemption {
    pub fn id(&self) -> EventId {
        self.header.id
    }

    pub fn signal(&self) -> &SignalId {
        &self.header.signal
    }

    pub fn to_be_preempted(&self) -> &EvaluatorSet {
        &self.to_be_preempted
    }
}

/// Payload of a flexible preemption: the driver may propose an alternative.
#[derive(Debug)]
pub struct FlexiblePreemption {
    header: EventHeader,
    to_be_preempted: EvaluatorSet,
    request_to_satisfy: ResourceRequest,
}

impl FlexiblePreemption {
    pub fn id(&self) -> EventId {
        self.header.id
    }

    pub fn signal(&self) -> &SignalId {
        &self.header.signal
    }

    pub fn to_be_preempted(&self) -> &EvaluatorSet {
        &self.to_be_preempted
    }

    pub fn request_to_satisfy(&self) -> &ResourceRequest {
        &self.request_to_satisfy
    }
}

/// A preemption notification issued by the underlying resource manager.
#[derive(Debug)]
pub enum PreemptionEvent {
    Strict(StrictPreemption),
    Flexible(FlexiblePreemption),
}

impl PreemptionEvent {
    pub(crate) fn strict(signal: SignalId, to_be_preempted: EvaluatorSet) -> Self {
        PreemptionEvent::Strict(StrictPreemption {
            header: EventHeader::new(signal),
            to_be_preempted,
        })
    }

    pub(crate) fn flexible(
        signal: SignalId,
        to_be_preempted: EvaluatorSet,
        request_to_satisfy: ResourceRequest,
    ) -> Self {
        PreemptionEvent::Flexible(FlexiblePreemption {
            header: EventHeader::new(signal),
            to_be_preempted,
            request_to_satisfy,
        })
    }

    fn header(&self) -> &EventHeader {
        match self {
            PreemptionEvent::Strict(e) => &e.header,
            PreemptionEvent::Flexible(e) => &e.header,
        }
    }

    pub fn id(&self) -> EventId {
        self.header().id
    }

    pub fn signal(&self) -> &SignalId {
        &self.header().signal
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.header().issued_at
    }

    pub fn kind(&self) -> PreemptionKind {
        match self {
            PreemptionEvent::Strict(_) => PreemptionKind::Strict,
            PreemptionEvent::Flexible(_) => PreemptionKind::Flexible,
        }
    }

    /// The evaluators the cluster manager intends to reclaim.
    pub fn to_be_preempted(&self) -> &EvaluatorSet {
        match self {
            PreemptionEvent::Strict(e) => &e.to_be_preempted,
            PreemptionEvent::Flexible(e) => &e.to_be_preempted,
        }
    }
}
