//! Debate value types — status, messages, concerns and the resolution record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// Status of a debate room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    /// Accepting messages and round changes.
    Active,
    /// Decided without full agreement.
    Resolved,
    /// Decided with agreement of all participants.
    Consensus,
    /// Round budget exhausted.
    Escalated,
    /// Cancelled.
    Abandoned,
}

impl DebateStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Whether the debate ended with a resolution attached.
    pub fn is_decided(self) -> bool {
        matches!(self, Self::Resolved | Self::Consensus)
    }
}

impl std::fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Resolved => write!(f, "resolved"),
            Self::Consensus => write!(f, "consensus"),
            Self::Escalated => write!(f, "escalated"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Message type within a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Proposal,
    Counter,
    Support,
    Question,
    Clarify,
    Concern,
    Acknowledge,
    Decision,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposal => write!(f, "proposal"),
            Self::Counter => write!(f, "counter"),
            Self::Support => write!(f, "support"),
            Self::Question => write!(f, "question"),
            Self::Clarify => write!(f, "clarify"),
            Self::Concern => write!(f, "concern"),
            Self::Acknowledge => write!(f, "acknowledge"),
            Self::Decision => write!(f, "decision"),
        }
    }
}

/// Severity of a concern.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConcernPriority {
    Low,
    #[default]
    Medium,
    High,
    /// Debate is not closable while this is unresolved.
    Blocker,
}

impl std::fmt::Display for ConcernPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Blocker => write!(f, "blocker"),
        }
    }
}

/// One entry of the debate transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub at: DateTime<Utc>,
    pub from: AgentId,
    pub kind: MessageKind,
    pub content: String,
    /// Ids of earlier messages this one replies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<ConcernPriority>,
}

/// Flagged risk, resolvable independently of the debate outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concern {
    pub id: String,
    pub description: String,
    pub raised_by: AgentId,
    /// Areas the concern touches.
    pub affects: Vec<String>,
    pub priority: ConcernPriority,
    /// Proposed remedies.
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Concern {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn is_blocker(&self) -> bool {
        self.priority == ConcernPriority::Blocker
    }
}

/// Outcome attached when a debate is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResolution {
    pub decision: String,
    pub rationale: String,
    pub decided_by: AgentId,
    pub was_consensus: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_proposal_id: Option<String>,
    #[serde(default)]
    pub dissenters: Vec<AgentId>,
    pub resolved_at: DateTime<Utc>,
}

/// Input for [`DebateRoom::add_message`](super::DebateRoom::add_message).
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub from: AgentId,
    pub kind: MessageKind,
    pub content: String,
    pub references: Vec<String>,
    pub tags: Vec<String>,
    pub priority: Option<ConcernPriority>,
}

impl MessageDraft {
    pub fn new(from: AgentId, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            from,
            kind,
            content: content.into(),
            references: Vec::new(),
            tags: Vec::new(),
            priority: None,
        }
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.references.push(message_id.into());
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_priority(mut self, priority: ConcernPriority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Input for [`DebateRoom::raise_concern`](super::DebateRoom::raise_concern).
#[derive(Debug, Clone, PartialEq)]
pub struct ConcernDraft {
    pub from: AgentId,
    pub description: String,
    pub affects: Vec<String>,
    pub priority: ConcernPriority,
    pub options: Vec<String>,
}

impl ConcernDraft {
    pub fn new(from: AgentId, description: impl Into<String>) -> Self {
        Self {
            from,
            description: description.into(),
            affects: Vec::new(),
            priority: ConcernPriority::default(),
            options: Vec::new(),
        }
    }

    pub fn affecting<I, S>(mut self, areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affects = areas.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: ConcernPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// Input for [`DebateRoom::resolve`](super::DebateRoom::resolve).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionDraft {
    pub decision: String,
    pub rationale: String,
    pub decided_by: AgentId,
    pub was_consensus: bool,
    pub winning_proposal_id: Option<String>,
    pub dissenters: Vec<AgentId>,
}

impl ResolutionDraft {
    pub fn new(
        decision: impl Into<String>,
        rationale: impl Into<String>,
        decided_by: AgentId,
        was_consensus: bool,
    ) -> Self {
        Self {
            decision: decision.into(),
            rationale: rationale.into(),
            decided_by,
            was_consensus,
            winning_proposal_id: None,
            dissenters: Vec::new(),
        }
    }

    pub fn winning(mut self, proposal_id: impl Into<String>) -> Self {
        self.winning_proposal_id = Some(proposal_id.into());
        self
    }

    pub fn with_dissenters(mut self, dissenters: impl IntoIterator<Item = AgentId>) -> Self {
        self.dissenters = dissenters.into_iter().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!DebateStatus::Active.is_terminal());
        for status in [
            DebateStatus::Resolved,
            DebateStatus::Consensus,
            DebateStatus::Escalated,
            DebateStatus::Abandoned,
        ] {
            assert!(status.is_terminal(), "{status}");
        }
        assert!(DebateStatus::Consensus.is_decided());
        assert!(!DebateStatus::Escalated.is_decided());
    }

    #[test]
    fn test_priority_ordering_and_default() {
        assert_eq!(ConcernPriority::default(), ConcernPriority::Medium);
        assert!(ConcernPriority::Blocker > ConcernPriority::High);
        assert!(ConcernPriority::Low < ConcernPriority::Medium);
    }

    #[test]
    fn test_message_serde_omits_empty_optionals() {
        let msg = Message {
            id: "m1".into(),
            at: Utc::now(),
            from: AgentId::new("t", "architect"),
            kind: MessageKind::Proposal,
            content: "use sqlite".into(),
            references: vec![],
            tags: vec![],
            priority: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "proposal");
        assert!(json.get("references").is_none());
        assert!(json.get("priority").is_none());
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
