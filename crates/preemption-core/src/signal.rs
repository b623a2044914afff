//! Raw cluster-manager signals as they reach the adapter.
//!
//! A concrete link implementation turns its wire format into a
//! [`RawPreemptionSignal`] (or hands over the JSON form for
//! [`decode_signal`]). Nothing past the adapter sees this type.

use evaluator_registry::{EvaluatorId, ResourceShape};
use serde::{Deserialize, Serialize};

use crate::error::{PreemptionError, PreemptionResult};
use crate::event::{ResourceRequest, SignalId};

/// Resource-request shape attached to a negotiable reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawResourceRequest {
    pub count: u32,
    #[serde(default)]
    pub cores: u32,
    #[serde(default)]
    pub memory_mb: u64,
}

/// One preemption signal from the underlying cluster manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPreemptionSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    pub evaluators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RawResourceRequest>,
}

/// A signal that passed structural validation but has not been resolved
/// against the registry yet.
#[derive(Debug, Clone)]
pub(crate) struct ValidatedSignal {
    pub signal: SignalId,
    pub evaluators: Vec<EvaluatorId>,
    pub request: Option<ResourceRequest>,
}

impl RawPreemptionSignal {
    /// Non-negotiable reclamation of `evaluators`.
    pub fn strict<I, S>(evaluators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signal_id: None,
            evaluators: evaluators.into_iter().map(Into::into).collect(),
            request: None,
        }
    }

    /// Negotiable reclamation: `count` units of `cores`/`memory_mb` wanted.
    pub fn flexible<I, S>(evaluators: I, count: u32, cores: u32, memory_mb: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signal_id: None,
            evaluators: evaluators.into_iter().map(Into::into).collect(),
            request: Some(RawResourceRequest {
                count,
                cores,
                memory_mb,
            }),
        }
    }

    pub fn with_signal_id(mut self, id: impl Into<String>) -> Self {
        self.signal_id = Some(id.into());
        self
    }

    pub(crate) fn validate(self) -> PreemptionResult<ValidatedSignal> {
        let signal = match self.signal_id {
            Some(id) if id.trim().is_empty() => {
                return Err(PreemptionError::malformed("signal id is blank"))
            }
            Some(id) => SignalId::new(id),
            None => SignalId::generated(),
        };

        if self.evaluators.is_empty() {
            return Err(PreemptionError::malformed(format!(
                "signal {signal} names no evaluators"
            )));
        }
        let evaluators = self
            .evaluators
            .into_iter()
            .map(EvaluatorId::new)
            .collect::<Result<Vec<_>, _>>()?;

        let request = self
            .request
            .map(|r| ResourceRequest::new(r.count, ResourceShape::new(r.cores, r.memory_mb)))
            .transpose()?;

        Ok(ValidatedSignal {
            signal,
            evaluators,
            request,
        })
    }
}

/// Decode the JSON form of a signal.
pub fn decode_signal(bytes: &[u8]) -> PreemptionResult<RawPreemptionSignal> {
    Ok(serde_json::from_slice(bytes)?)
}
