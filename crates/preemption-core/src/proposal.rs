//! Driver-produced mitigation proposals.

use std::collections::BTreeSet;

use evaluator_registry::EvaluatorId;
use serde::{Deserialize, Serialize};

/// An alternative disposition the driver offers in answer to a flexible
/// preemption, e.g. "release these idle evaluators instead".
///
/// The driver asserts the proposal satisfies the event's
/// `request_to_satisfy`; the cluster manager has the final say.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitigationProposal {
    /// Evaluators the driver is willing to give up instead.
    pub release: BTreeSet<EvaluatorId>,
    /// Free-form explanation forwarded to the cluster manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl MitigationProposal {
    pub fn release(ids: impl IntoIterator<Item = EvaluatorId>) -> Self {
        Self {
            release: ids.into_iter().collect(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// A proposal that gives nothing up cannot satisfy any request.
    pub fn is_empty(&self) -> bool {
        self.release.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_dedups_ids() {
        let id = EvaluatorId::new("eval-9").unwrap();
        let p = MitigationProposal::release(vec![id.clone(), id]).with_note("idle");
        assert_eq!(p.release.len(), 1);
        assert_eq!(p.note.as_deref(), Some("idle"));
        assert!(!p.is_empty());
    }

    #[test]
    fn test_note_is_omitted_from_json_when_absent() {
        let p = MitigationProposal::release(vec![EvaluatorId::new("eval-9").unwrap()]);
        assert_eq!(
            serde_json::to_string(&p).unwrap(),
            r#"{"release":["eval-9"]}"#
        );
    }

    #[test]
    fn test_blank_release_id_is_rejected_on_decode() {
        let result = serde_json::from_str::<MitigationProposal>(r#"{"release":["eval-9",""]}"#);
        assert!(result.is_err());
    }
}
