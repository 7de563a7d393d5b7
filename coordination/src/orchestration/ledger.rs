//! Decision ledger.

use chrono::Utc;
use uuid::Uuid;

use super::state::{Decision, OrchestrationState};
use crate::agent::AgentId;
use crate::error::{CoordinationError, CoordinationResult};

/// Caller-supplied fields of a decision; id, phase and timestamp are filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionDraft {
    pub topic: String,
    pub options: Vec<String>,
    pub chosen: String,
    pub rationale: String,
    pub made_by: AgentId,
    pub debate_id: Option<String>,
    /// Whether the participants agreed; computed by the caller
    pub consensus: bool,
}

impl DecisionDraft {
    pub fn new(
        topic: impl Into<String>,
        chosen: impl Into<String>,
        rationale: impl Into<String>,
        made_by: AgentId,
    ) -> Self {
        Self {
            topic: topic.into(),
            options: Vec::new(),
            chosen: chosen.into(),
            rationale: rationale.into(),
            made_by,
            debate_id: None,
            consensus: false,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_debate(mut self, debate_id: impl Into<String>) -> Self {
        self.debate_id = Some(debate_id.into());
        self
    }

    pub fn with_consensus(mut self, consensus: bool) -> Self {
        self.consensus = consensus;
        self
    }
}

impl OrchestrationState {
    /// Append a decision stamped with the current phase.
    ///
    /// Allowed in every phase; terminal orchestrations still accept
    /// post-mortem entries.
    pub fn record_decision(&mut self, draft: DecisionDraft) -> CoordinationResult<Decision> {
        if draft.topic.trim().is_empty() {
            return Err(CoordinationError::validation("decision topic is empty"));
        }
        if draft.chosen.trim().is_empty() {
            return Err(CoordinationError::validation("decision has no chosen option"));
        }

        let decision = Decision {
            id: Uuid::new_v4().to_string(),
            phase: self.phase,
            topic: draft.topic,
            options: draft.options,
            chosen: draft.chosen,
            rationale: draft.rationale,
            made_by: draft.made_by,
            debate_id: draft.debate_id,
            consensus: draft.consensus,
            decided_at: Utc::now(),
        };
        self.decisions.push(decision.clone());
        self.updated_at = decision.decided_at;
        Ok(decision)
    }

    /// Most recent decision on `topic`.
    pub fn latest_decision(&self, topic: &str) -> Option<&Decision> {
        self.decisions.iter().rev().find(|d| d.topic == topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityProfile;
    use crate::orchestration::Phase;

    fn architect() -> AgentId {
        AgentId::new("t", "architect")
    }

    fn state() -> OrchestrationState {
        OrchestrationState::new("T", "s", AgentId::new("t", "pm"), CapabilityProfile::default())
    }

    #[test]
    fn test_record_decision_stamps_phase() {
        let mut state = state();
        state.transition(Phase::Analyzing, vec![]).unwrap();
        let decision = state
            .record_decision(
                DecisionDraft::new("storage", "sqlite", "single node", architect())
                    .with_options(["sqlite", "postgres"])
                    .with_consensus(true),
            )
            .unwrap();
        assert_eq!(decision.phase, Phase::Analyzing);
        assert_eq!(decision.options.len(), 2);
        assert!(decision.consensus);
        assert_eq!(state.decisions.len(), 1);
    }

    #[test]
    fn test_ledger_is_append_only_and_ordered() {
        let mut state = state();
        state
            .record_decision(DecisionDraft::new("db", "sqlite", "r1", architect()))
            .unwrap();
        state
            .record_decision(DecisionDraft::new("db", "postgres", "r2", architect()))
            .unwrap();
        assert_eq!(state.decisions[0].chosen, "sqlite");
        assert_eq!(state.latest_decision("db").unwrap().chosen, "postgres");
        assert!(state.latest_decision("cache").is_none());
    }

    #[test]
    fn test_decision_allowed_after_failure() {
        let mut state = state();
        state.fail("abandoned").unwrap();
        let decision = state
            .record_decision(DecisionDraft::new("postmortem", "retry later", "", architect()))
            .unwrap();
        assert_eq!(decision.phase, Phase::Failed);
    }

    #[test]
    fn test_empty_topic_rejected() {
        let mut state = state();
        let err = state
            .record_decision(DecisionDraft::new("  ", "x", "", architect()))
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Validation { .. }));
        assert!(state.decisions.is_empty());
    }
}
