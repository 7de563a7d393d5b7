//! Debate room operations.

use tracing::{debug, info};

use super::Coordinator;
use crate::agent::AgentId;
use crate::audit::{ActivityEvent, ActivityKind};
use crate::debate::{
    Concern, ConcernDraft, DebateRoom, DebateStatus, Message, MessageDraft, MessageKind,
    ResolutionDraft,
};
use crate::error::{CoordinationError, CoordinationResult, EntityKind};
use crate::escalation::{EscalationKind, EscalationRequest, EscalationThread};

impl Coordinator {
    /// Open a debate; `moderator` and `max_rounds` default from config.
    pub fn create_debate(
        &self,
        topic: &str,
        participants: Vec<AgentId>,
        moderator: Option<AgentId>,
        context: Option<String>,
        max_rounds: Option<u32>,
    ) -> CoordinationResult<DebateRoom> {
        let moderator = match moderator {
            Some(moderator) => moderator,
            None => self.config.moderator_id()?,
        };
        let room = DebateRoom::new(
            topic,
            participants,
            moderator,
            context,
            max_rounds.unwrap_or(self.config.debate.max_rounds),
        )?;
        self.insert(&room.id, &room)?;
        info!(debate = %room.id, topic, max_rounds = room.max_rounds, "Debate opened");
        self.activity(
            ActivityEvent::new(ActivityKind::DebateOpened, &room.id, topic)
                .by(room.moderator.clone()),
        );
        Ok(room)
    }

    pub fn get_debate(&self, debate_id: &str) -> CoordinationResult<DebateRoom> {
        self.get(debate_id)
    }

    pub fn add_message(
        &self,
        debate_id: &str,
        draft: MessageDraft,
    ) -> CoordinationResult<Message> {
        let (_, message) = self.update(debate_id, |room: &mut DebateRoom| room.add_message(draft))?;
        debug!(debate = debate_id, kind = %message.kind, from = %message.from, "Debate message");
        self.activity(
            ActivityEvent::new(
                ActivityKind::DebateMessage,
                debate_id,
                format!("{}: {}", message.kind, message.content),
            )
            .by(message.from.clone()),
        );
        Ok(message)
    }

    pub fn add_proposal(
        &self,
        debate_id: &str,
        from: AgentId,
        content: &str,
    ) -> CoordinationResult<Message> {
        self.add_message(
            debate_id,
            MessageDraft::new(from, MessageKind::Proposal, content),
        )
    }

    pub fn add_counter(
        &self,
        debate_id: &str,
        from: AgentId,
        content: &str,
        replying_to: Option<&str>,
    ) -> CoordinationResult<Message> {
        let mut draft = MessageDraft::new(from, MessageKind::Counter, content);
        if let Some(id) = replying_to {
            draft = draft.replying_to(id);
        }
        self.add_message(debate_id, draft)
    }

    pub fn raise_concern(
        &self,
        debate_id: &str,
        draft: ConcernDraft,
    ) -> CoordinationResult<Concern> {
        let (_, concern) =
            self.update(debate_id, |room: &mut DebateRoom| room.raise_concern(draft))?;
        info!(
            debate = debate_id,
            concern = %concern.id,
            priority = %concern.priority,
            "Concern raised"
        );
        self.activity(
            ActivityEvent::new(
                ActivityKind::ConcernRaised,
                debate_id,
                format!("[{}] {}", concern.priority, concern.description),
            )
            .by(concern.raised_by.clone()),
        );
        Ok(concern)
    }

    pub fn resolve_concern(
        &self,
        debate_id: &str,
        concern_id: &str,
        resolution: &str,
        resolved_by: AgentId,
    ) -> CoordinationResult<Concern> {
        let by = resolved_by.clone();
        let (_, concern) = self.update(debate_id, |room: &mut DebateRoom| {
            room.resolve_concern(concern_id, resolution, by)
        })?;
        self.activity(
            ActivityEvent::new(
                ActivityKind::ConcernResolved,
                debate_id,
                format!("concern {}: {}", concern_id, resolution),
            )
            .by(resolved_by),
        );
        Ok(concern)
    }

    /// Bump the round; past `max_rounds` the debate escalates.
    pub fn advance_round(&self, debate_id: &str) -> CoordinationResult<DebateRoom> {
        let (room, status) =
            self.update(debate_id, |room: &mut DebateRoom| room.advance_round())?;
        self.activity(ActivityEvent::new(
            ActivityKind::DebateRoundAdvanced,
            debate_id,
            format!("round {}/{} ({})", room.round, room.max_rounds, status),
        ));
        Ok(room)
    }

    pub fn resolve_debate(
        &self,
        debate_id: &str,
        draft: ResolutionDraft,
    ) -> CoordinationResult<DebateRoom> {
        let (room, resolution) =
            self.update(debate_id, |room: &mut DebateRoom| room.resolve(draft))?;
        info!(
            debate = debate_id,
            status = %room.status,
            blockers = room.blockers().len(),
            "Debate resolved"
        );
        self.activity(
            ActivityEvent::new(
                ActivityKind::DebateResolved,
                debate_id,
                format!("{}: {}", room.status, resolution.decision),
            )
            .by(resolution.decided_by),
        );
        Ok(room)
    }

    /// Cancel the debate. Does not stop any agent work in flight.
    pub fn abandon_debate(&self, debate_id: &str, reason: &str) -> CoordinationResult<DebateRoom> {
        let (room, ()) = self.update(debate_id, |room: &mut DebateRoom| room.abandon(reason))?;
        info!(debate = debate_id, reason, "Debate abandoned");
        self.activity(ActivityEvent::new(
            ActivityKind::DebateAbandoned,
            debate_id,
            reason,
        ));
        Ok(room)
    }

    pub fn active_concerns(&self, debate_id: &str) -> CoordinationResult<Vec<Concern>> {
        let room = self.get_debate(debate_id)?;
        Ok(room.active_concerns().into_iter().cloned().collect())
    }

    pub fn blockers(&self, debate_id: &str) -> CoordinationResult<Vec<Concern>> {
        let room = self.get_debate(debate_id)?;
        Ok(room.blockers().into_iter().cloned().collect())
    }

    /// Hand an unresolved concern to the escalation router.
    ///
    /// Blockers go out as `blocker`, anything else as `contested-concern`.
    pub fn escalate_concern(
        &self,
        debate_id: &str,
        concern_id: &str,
        from: AgentId,
    ) -> CoordinationResult<EscalationThread> {
        let room = self.get_debate(debate_id)?;
        let concern = room
            .concern(concern_id)
            .ok_or_else(|| CoordinationError::not_found(EntityKind::Concern, concern_id))?;
        if concern.is_resolved() {
            return Err(CoordinationError::AlreadyResolved {
                kind: EntityKind::Concern,
                id: concern_id.to_string(),
            });
        }

        let kind = if concern.is_blocker() {
            EscalationKind::Blocker
        } else {
            EscalationKind::ContestedConcern
        };
        let mut context = format!("Debate '{}' ({}, {})", room.topic, room.id, room.status);
        if !concern.affects.is_empty() {
            context.push_str(&format!("; affects: {}", concern.affects.join(", ")));
        }
        if !concern.options.is_empty() {
            context.push_str(&format!("; proposed remedies: {}", concern.options.join(" | ")));
        }
        if room.status == DebateStatus::Escalated {
            context.push_str("; round budget exhausted");
        }

        let request = EscalationRequest::new(from, kind, concern.description.clone())
            .with_context(context)
            .about(room.id.clone());
        self.open_escalation(request)
    }
}
