//! Debate room aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{
    Concern, ConcernDraft, ConcernPriority, DebateResolution, DebateStatus, Message, MessageDraft,
    MessageKind, ResolutionDraft,
};
use crate::agent::AgentId;
use crate::error::{CoordinationError, CoordinationResult, EntityKind};

/// Structured multi-party negotiation over one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRoom {
    pub id: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Grows as late joiners send messages.
    pub participants: Vec<AgentId>,
    pub moderator: AgentId,
    pub messages: Vec<Message>,
    pub concerns: Vec<Concern>,
    /// Starts at 1.
    pub round: u32,
    pub max_rounds: u32,
    pub status: DebateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<DebateResolution>,
    /// Why the debate was abandoned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DebateRoom {
    pub fn new(
        topic: impl Into<String>,
        participants: impl IntoIterator<Item = AgentId>,
        moderator: AgentId,
        context: Option<String>,
        max_rounds: u32,
    ) -> CoordinationResult<Self> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(CoordinationError::validation("debate topic is empty"));
        }
        if max_rounds == 0 {
            return Err(CoordinationError::validation(
                "debate max_rounds must be at least 1",
            ));
        }

        let mut members: Vec<AgentId> = Vec::new();
        for agent in participants {
            if !members.contains(&agent) {
                members.push(agent);
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            topic,
            context,
            participants: members,
            moderator,
            messages: Vec::new(),
            concerns: Vec::new(),
            round: 1,
            max_rounds,
            status: DebateStatus::Active,
            resolution: None,
            closed_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == DebateStatus::Active
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn concern(&self, concern_id: &str) -> Option<&Concern> {
        self.concerns.iter().find(|c| c.id == concern_id)
    }

    /// Append a message; the sender joins the debate if not already in it.
    pub fn add_message(&mut self, draft: MessageDraft) -> CoordinationResult<Message> {
        self.ensure_active()?;
        Ok(self.push_message(draft))
    }

    pub fn add_proposal(
        &mut self,
        from: AgentId,
        content: impl Into<String>,
    ) -> CoordinationResult<Message> {
        self.add_message(MessageDraft::new(from, MessageKind::Proposal, content))
    }

    /// Counter-proposal, optionally replying to an earlier message.
    pub fn add_counter(
        &mut self,
        from: AgentId,
        content: impl Into<String>,
        replying_to: Option<&str>,
    ) -> CoordinationResult<Message> {
        let mut draft = MessageDraft::new(from, MessageKind::Counter, content);
        if let Some(id) = replying_to {
            draft = draft.replying_to(id);
        }
        self.add_message(draft)
    }

    /// Record a concern and mirror it into the transcript as a `concern` message.
    pub fn raise_concern(&mut self, draft: ConcernDraft) -> CoordinationResult<Concern> {
        self.ensure_active()?;
        if draft.description.trim().is_empty() {
            return Err(CoordinationError::validation("concern description is empty"));
        }

        let concern = Concern {
            id: Uuid::new_v4().to_string(),
            description: draft.description,
            raised_by: draft.from,
            affects: draft.affects,
            priority: draft.priority,
            options: draft.options,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
        };

        let mut summary = format!("[{}] {}", concern.priority, concern.description);
        if !concern.affects.is_empty() {
            summary.push_str(&format!(" (affects: {})", concern.affects.join(", ")));
        }
        self.push_message(
            MessageDraft::new(concern.raised_by.clone(), MessageKind::Concern, summary)
                .with_priority(concern.priority)
                .tagged(format!("concern:{}", concern.id)),
        );
        self.concerns.push(concern.clone());
        Ok(concern)
    }

    /// Set a concern's resolution. Allowed after the debate itself has closed.
    pub fn resolve_concern(
        &mut self,
        concern_id: &str,
        resolution: impl Into<String>,
        resolved_by: AgentId,
    ) -> CoordinationResult<Concern> {
        let now = Utc::now();
        let concern = self
            .concerns
            .iter_mut()
            .find(|c| c.id == concern_id)
            .ok_or_else(|| CoordinationError::not_found(EntityKind::Concern, concern_id))?;
        if concern.is_resolved() {
            return Err(CoordinationError::AlreadyResolved {
                kind: EntityKind::Concern,
                id: concern_id.to_string(),
            });
        }
        concern.resolution = Some(resolution.into());
        concern.resolved_by = Some(resolved_by);
        concern.resolved_at = Some(now);
        let resolved = concern.clone();
        self.updated_at = now;
        Ok(resolved)
    }

    /// Bump the round counter; exceeding `max_rounds` escalates the debate.
    pub fn advance_round(&mut self) -> CoordinationResult<DebateStatus> {
        self.ensure_active()?;
        self.round += 1;
        self.updated_at = Utc::now();
        if self.round > self.max_rounds {
            self.status = DebateStatus::Escalated;
            tracing::warn!(
                debate = %self.id,
                round = self.round,
                max_rounds = self.max_rounds,
                "Debate exceeded round budget, escalating"
            );
        } else {
            tracing::debug!(debate = %self.id, round = self.round, "Debate round advanced");
        }
        Ok(self.status)
    }

    /// Attach the outcome and close the debate as `consensus` or `resolved`.
    pub fn resolve(&mut self, draft: ResolutionDraft) -> CoordinationResult<DebateResolution> {
        if self.status.is_decided() {
            return Err(CoordinationError::AlreadyResolved {
                kind: EntityKind::Debate,
                id: self.id.clone(),
            });
        }
        self.ensure_active()?;
        if draft.decision.trim().is_empty() {
            return Err(CoordinationError::validation("debate decision is empty"));
        }
        if let Some(winner) = &draft.winning_proposal_id {
            let is_proposal = self
                .message(winner)
                .map(|m| matches!(m.kind, MessageKind::Proposal | MessageKind::Counter))
                .unwrap_or(false);
            if !is_proposal {
                return Err(CoordinationError::validation(format!(
                    "winning proposal {} is not a proposal in debate {}",
                    winner, self.id
                )));
            }
        }

        let resolution = DebateResolution {
            decision: draft.decision,
            rationale: draft.rationale,
            decided_by: draft.decided_by,
            was_consensus: draft.was_consensus,
            winning_proposal_id: draft.winning_proposal_id,
            dissenters: draft.dissenters,
            resolved_at: Utc::now(),
        };

        let mut message = MessageDraft::new(
            resolution.decided_by.clone(),
            MessageKind::Decision,
            format!("{}: {}", resolution.decision, resolution.rationale),
        );
        if let Some(winner) = &resolution.winning_proposal_id {
            message = message.replying_to(winner.clone());
        }
        self.push_message(message);

        self.status = if resolution.was_consensus {
            DebateStatus::Consensus
        } else {
            DebateStatus::Resolved
        };
        self.resolution = Some(resolution.clone());
        Ok(resolution)
    }

    /// Cancel the debate. Bookkeeping only.
    pub fn abandon(&mut self, reason: impl Into<String>) -> CoordinationResult<()> {
        self.ensure_active()?;
        self.status = DebateStatus::Abandoned;
        self.closed_reason = Some(reason.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Concerns without a resolution.
    pub fn active_concerns(&self) -> Vec<&Concern> {
        self.concerns.iter().filter(|c| !c.is_resolved()).collect()
    }

    /// Unresolved concerns with blocker priority.
    pub fn blockers(&self) -> Vec<&Concern> {
        self.concerns
            .iter()
            .filter(|c| !c.is_resolved() && c.is_blocker())
            .collect()
    }

    /// Resolution attached and no outstanding blockers.
    ///
    /// The two are independent: a resolved debate with an open blocker is
    /// not safe to act on.
    pub fn is_closable(&self) -> bool {
        self.resolution.is_some() && self.blockers().is_empty()
    }

    pub fn status_line(&self) -> String {
        let high = self
            .active_concerns()
            .iter()
            .filter(|c| c.priority >= ConcernPriority::High)
            .count();
        format!(
            "[{}] {} | round {}/{} | {} messages | {} open concerns ({} high+, {} blockers) | {}",
            self.status,
            self.topic,
            self.round,
            self.max_rounds,
            self.messages.len(),
            self.active_concerns().len(),
            high,
            self.blockers().len(),
            if self.is_closable() {
                "closable"
            } else {
                "not closable"
            }
        )
    }

    fn ensure_active(&self) -> CoordinationResult<()> {
        if !self.is_active() {
            return Err(CoordinationError::DebateNotActive {
                debate_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    fn push_message(&mut self, draft: MessageDraft) -> Message {
        if !self.participants.contains(&draft.from) {
            tracing::debug!(debate = %self.id, agent = %draft.from, "Late joiner added");
            self.participants.push(draft.from.clone());
        }
        let message = Message {
            id: Uuid::new_v4().to_string(),
            at: Utc::now(),
            from: draft.from,
            kind: draft.kind,
            content: draft.content,
            references: draft.references,
            tags: draft.tags,
            priority: draft.priority,
        };
        self.updated_at = message.at;
        self.messages.push(message.clone());
        message
    }
}
