//! Orchestration, gate and decision-ledger operations.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Coordinator;
use crate::agent::AgentId;
use crate::audit::{ActivityEvent, ActivityKind, DecisionEvent};
use crate::capability::CapabilityProfile;
use crate::debate::{DebateRoom, MessageKind};
use crate::error::{CoordinationError, CoordinationResult, EntityKind};
use crate::escalation::{EscalationKind, EscalationRequest, EscalationThread};
use crate::orchestration::{
    required_approver, Decision, DecisionDraft, Gate, OrchestrationState, Phase,
};
use crate::store::{self, Expected, RecordKey};

/// Outcome of rejecting a gate.
#[derive(Debug, Clone)]
pub struct GateRejection {
    pub state: OrchestrationState,
    pub revision_count: u32,
    /// Opened when the rejection limit was reached
    pub escalation: Option<EscalationThread>,
}

/// How a contested gate is settled once its debate is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    Approve,
    Reject,
}

/// Outcome of settling a contested gate from its debate.
#[derive(Debug, Clone)]
pub struct GateSettlement {
    pub state: OrchestrationState,
    pub decision: Decision,
    pub escalation: Option<EscalationThread>,
}

impl Coordinator {
    // =========================================================================
    // Orchestration lifecycle
    // =========================================================================

    /// Create an orchestration and make it the session's active one.
    pub fn create(
        &self,
        task: &str,
        session_id: &str,
    ) -> CoordinationResult<OrchestrationState> {
        self.create_with_capabilities(task, session_id, CapabilityProfile::default())
    }

    pub fn create_with_capabilities(
        &self,
        task: &str,
        session_id: &str,
        capabilities: CapabilityProfile,
    ) -> CoordinationResult<OrchestrationState> {
        if task.trim().is_empty() {
            return Err(CoordinationError::validation("task is empty"));
        }
        if session_id.trim().is_empty() {
            return Err(CoordinationError::validation("session id is empty"));
        }

        let state = OrchestrationState::new(
            task,
            session_id,
            self.config.pm_agent_id()?,
            capabilities,
        );
        self.insert(&state.id, &state)?;
        store::save(
            self.store.as_ref(),
            &RecordKey::active(session_id),
            &state.id,
            Expected::Any,
        )?;

        info!(orchestration = %state.id, session = session_id, "Orchestration created");
        self.activity(
            ActivityEvent::new(ActivityKind::OrchestrationCreated, &state.id, task)
                .by(state.pm_agent.clone()),
        );
        Ok(state)
    }

    pub fn get_orchestration(&self, orch_id: &str) -> CoordinationResult<OrchestrationState> {
        self.get(orch_id)
    }

    /// The session's active orchestration, if any.
    pub fn active_orchestration(
        &self,
        session_id: &str,
    ) -> CoordinationResult<Option<OrchestrationState>> {
        let pointer = store::load::<String>(self.store.as_ref(), &RecordKey::active(session_id))?;
        let Some(pointer) = pointer else {
            return Ok(None);
        };
        match self.get_orchestration(&pointer.value) {
            Ok(state) => Ok(Some(state)),
            Err(e) if e.is_not_found() => {
                warn!(session = session_id, orchestration = %pointer.value, "Active pointer is dangling");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Move to `target`. Illegal targets fail with `InvalidTransition` and
    /// nothing is persisted.
    pub fn transition_phase(
        &self,
        orch_id: &str,
        target: Phase,
    ) -> CoordinationResult<OrchestrationState> {
        let (state, from) = self.update(orch_id, |state: &mut OrchestrationState| {
            state.transition(target, self.team.roles_for_phase(target))
        })?;
        self.after_transition(&state, from, None)?;
        Ok(state)
    }

    /// Force `failed` from any non-terminal phase.
    pub fn fail(&self, orch_id: &str, reason: &str) -> CoordinationResult<OrchestrationState> {
        let (state, from) = self.update(orch_id, |state: &mut OrchestrationState| {
            state.fail(reason)
        })?;
        self.clear_active(&state)?;
        warn!(orchestration = %state.id, from = %from, reason, "Orchestration failed");
        self.activity(ActivityEvent::new(
            ActivityKind::OrchestrationFailed,
            &state.id,
            format!("{} → failed: {}", from, reason),
        ));
        Ok(state)
    }

    pub fn pause(&self, orch_id: &str) -> CoordinationResult<OrchestrationState> {
        self.transition_phase(orch_id, Phase::Paused)
    }

    /// Leave `paused` for `target`.
    pub fn resume(&self, orch_id: &str, target: Phase) -> CoordinationResult<OrchestrationState> {
        let (state, from) = self.update(orch_id, |state: &mut OrchestrationState| {
            if state.phase != Phase::Paused {
                return Err(CoordinationError::validation(format!(
                    "orchestration {} is {}, not paused",
                    state.id, state.phase
                )));
            }
            state.transition(target, self.team.roles_for_phase(target))
        })?;
        self.after_transition(&state, from, None)?;
        Ok(state)
    }

    /// Approver the gate policy requires before entering `target`.
    pub fn required_gate(
        &self,
        orch_id: &str,
        target: Phase,
    ) -> CoordinationResult<Option<AgentId>> {
        let state = self.get_orchestration(orch_id)?;
        Ok(required_approver(
            target,
            &state.capabilities,
            &self.config.namespace,
        ))
    }

    fn after_transition(
        &self,
        state: &OrchestrationState,
        from: Phase,
        actor: Option<&AgentId>,
    ) -> CoordinationResult<()> {
        if state.is_terminal() {
            self.clear_active(state)?;
        }
        info!(orchestration = %state.id, from = %from, to = %state.phase, "Phase transition");
        let mut event = ActivityEvent::new(
            ActivityKind::PhaseTransition,
            &state.id,
            format!("{} → {}", from, state.phase),
        );
        if let Some(actor) = actor {
            event = event.by(actor.clone());
        }
        self.activity(event);
        Ok(())
    }

    /// Remove the session pointer if it still points at `state`.
    fn clear_active(&self, state: &OrchestrationState) -> CoordinationResult<()> {
        let key = RecordKey::active(&state.session_id);
        if let Some(pointer) = store::load::<String>(self.store.as_ref(), &key)? {
            if pointer.value == state.id {
                self.store.remove(&key)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Gates
    // =========================================================================

    pub fn create_gate(
        &self,
        orch_id: &str,
        target: Phase,
        proposal_summary: &str,
        approver: AgentId,
    ) -> CoordinationResult<Gate> {
        let (state, gate) = self.update(orch_id, |state: &mut OrchestrationState| {
            state.open_gate(target, proposal_summary, approver)
        })?;
        info!(
            orchestration = %state.id,
            gate = %gate.id,
            target = %target,
            revision = gate.revision_count,
            "Gate opened"
        );
        self.activity(
            ActivityEvent::new(
                ActivityKind::GateOpened,
                &state.id,
                format!("gate → {}: {}", target, proposal_summary),
            )
            .by(gate.requires_approval_from.clone()),
        );
        Ok(gate)
    }

    /// Approve the gate and take its transition.
    pub fn approve_gate(
        &self,
        orch_id: &str,
        gate_id: &str,
        approved_by: AgentId,
    ) -> CoordinationResult<OrchestrationState> {
        let by = approved_by.clone();
        let (state, from) = self.update(orch_id, |state: &mut OrchestrationState| {
            let from = state.phase;
            let target = state
                .gate(gate_id)
                .map(|g| g.target_phase)
                .ok_or_else(|| CoordinationError::not_found(EntityKind::Gate, gate_id))?;
            state.approve_gate(gate_id, by, self.team.roles_for_phase(target))?;
            Ok(from)
        })?;
        self.activity(
            ActivityEvent::new(ActivityKind::GateApproved, &state.id, format!("gate {}", gate_id))
                .by(approved_by.clone()),
        );
        self.after_transition(&state, from, Some(&approved_by))?;
        Ok(state)
    }

    /// Reject the gate; opens a `repeated-rejection` escalation when the
    /// lineage reaches the configured limit.
    pub fn reject_gate(
        &self,
        orch_id: &str,
        gate_id: &str,
        feedback: &str,
        rejected_by: AgentId,
    ) -> CoordinationResult<GateRejection> {
        let by = rejected_by.clone();
        let (state, revision_count) = self.update(orch_id, |state: &mut OrchestrationState| {
            state.reject_gate(gate_id, feedback, by)
        })?;
        self.activity(
            ActivityEvent::new(
                ActivityKind::GateRejected,
                &state.id,
                format!("gate {} (revision {}): {}", gate_id, revision_count, feedback),
            )
            .by(rejected_by.clone()),
        );
        let escalation =
            self.escalate_rejection(&state, gate_id, revision_count, feedback, &rejected_by)?;
        Ok(GateRejection {
            state,
            revision_count,
            escalation,
        })
    }

    /// Waive the gate and take its transition.
    pub fn skip_gate(
        &self,
        orch_id: &str,
        gate_id: &str,
        skipped_by: AgentId,
    ) -> CoordinationResult<OrchestrationState> {
        let by = skipped_by.clone();
        let (state, from) = self.update(orch_id, |state: &mut OrchestrationState| {
            let from = state.phase;
            let target = state
                .gate(gate_id)
                .map(|g| g.target_phase)
                .ok_or_else(|| CoordinationError::not_found(EntityKind::Gate, gate_id))?;
            state.skip_gate(gate_id, by, self.team.roles_for_phase(target))?;
            Ok(from)
        })?;
        self.activity(
            ActivityEvent::new(ActivityKind::GateSkipped, &state.id, format!("gate {}", gate_id))
                .by(skipped_by.clone()),
        );
        self.after_transition(&state, from, Some(&skipped_by))?;
        Ok(state)
    }

    /// Open a debate over the gate's proposal and link it to the gate.
    pub fn contest_gate(
        &self,
        orch_id: &str,
        gate_id: &str,
        participants: Vec<AgentId>,
        moderator: Option<AgentId>,
    ) -> CoordinationResult<DebateRoom> {
        let state = self.get_orchestration(orch_id)?;
        let gate = state
            .gate(gate_id)
            .ok_or_else(|| CoordinationError::not_found(EntityKind::Gate, gate_id))?;

        let moderator = match moderator {
            Some(moderator) => moderator,
            None => self.config.moderator_id()?,
        };
        let mut members = vec![gate.requires_approval_from.clone()];
        members.extend(participants);
        let room = DebateRoom::new(
            gate.proposal_summary.clone(),
            members,
            moderator,
            Some(format!(
                "Gate {} → {} in orchestration {}",
                gate.id, gate.target_phase, state.id
            )),
            self.config.debate.max_rounds,
        )?;

        self.insert(&room.id, &room)?;
        let linked = self.update(orch_id, |state: &mut OrchestrationState| {
            state.link_debate(gate_id, &room.id)
        });
        if let Err(e) = linked {
            // best effort: the room is unreachable without the link
            if let Err(cleanup) = self.store.remove(&RecordKey::debate(&room.id)) {
                warn!(debate = %room.id, error = %cleanup, "Failed to remove unlinked debate");
            }
            return Err(e);
        }

        info!(orchestration = orch_id, gate = gate_id, debate = %room.id, "Gate contested");
        self.activity(ActivityEvent::new(
            ActivityKind::GateContested,
            orch_id,
            format!("gate {} contested in debate {}", gate_id, room.id),
        ));
        self.activity(
            ActivityEvent::new(ActivityKind::DebateOpened, &room.id, &room.topic)
                .by(room.moderator.clone()),
        );
        Ok(room)
    }

    /// Record the linked debate's outcome as a decision and approve or
    /// reject the gate accordingly, in one write.
    pub fn settle_gate_from_debate(
        &self,
        orch_id: &str,
        gate_id: &str,
        verdict: GateVerdict,
        decided_by: AgentId,
    ) -> CoordinationResult<GateSettlement> {
        let current = self.get_orchestration(orch_id)?;
        let gate = current
            .gate(gate_id)
            .ok_or_else(|| CoordinationError::not_found(EntityKind::Gate, gate_id))?;
        let debate_id = gate.debate_id.clone().ok_or_else(|| {
            CoordinationError::validation(format!("gate {} has not been contested", gate_id))
        })?;

        let room = self.get_debate(&debate_id)?;
        let resolution = room
            .resolution
            .clone()
            .ok_or_else(|| CoordinationError::DebateUnresolved {
                debate_id: debate_id.clone(),
            })?;
        let blockers = room.blockers().len();
        if blockers > 0 {
            return Err(CoordinationError::BlockersOutstanding {
                debate_id,
                count: blockers,
            });
        }

        let options: Vec<String> = room
            .messages
            .iter()
            .filter(|m| matches!(m.kind, MessageKind::Proposal | MessageKind::Counter))
            .map(|m| m.content.clone())
            .collect();
        let draft = DecisionDraft::new(
            room.topic.clone(),
            resolution.decision.clone(),
            resolution.rationale.clone(),
            resolution.decided_by.clone(),
        )
        .with_options(options)
        .from_debate(&debate_id)
        .with_consensus(resolution.was_consensus);

        let by = decided_by.clone();
        let feedback = resolution.rationale.clone();
        let (state, (decision, from, revision)) =
            self.update(orch_id, |state: &mut OrchestrationState| {
                let from = state.phase;
                let decision = state.record_decision(draft)?;
                let revision = match verdict {
                    GateVerdict::Approve => {
                        let target = state
                            .gate(gate_id)
                            .map(|g| g.target_phase)
                            .ok_or_else(|| CoordinationError::not_found(EntityKind::Gate, gate_id))?;
                        state.approve_gate(gate_id, by, self.team.roles_for_phase(target))?;
                        None
                    }
                    GateVerdict::Reject => Some(state.reject_gate(gate_id, feedback, by)?),
                };
                Ok((decision, from, revision))
            })?;

        self.decision(DecisionEvent {
            orchestration_id: state.id.clone(),
            decision: decision.clone(),
        });
        let escalation = match revision {
            None => {
                self.activity(
                    ActivityEvent::new(
                        ActivityKind::GateApproved,
                        &state.id,
                        format!("gate {} settled by debate {}", gate_id, debate_id),
                    )
                    .by(decided_by.clone()),
                );
                self.after_transition(&state, from, Some(&decided_by))?;
                None
            }
            Some(count) => {
                self.activity(
                    ActivityEvent::new(
                        ActivityKind::GateRejected,
                        &state.id,
                        format!("gate {} rejected by debate {}", gate_id, debate_id),
                    )
                    .by(decided_by.clone()),
                );
                self.escalate_rejection(&state, gate_id, count, &resolution.rationale, &decided_by)?
            }
        };

        Ok(GateSettlement {
            state,
            decision,
            escalation,
        })
    }

    fn escalate_rejection(
        &self,
        state: &OrchestrationState,
        gate_id: &str,
        revision_count: u32,
        feedback: &str,
        rejected_by: &AgentId,
    ) -> CoordinationResult<Option<EscalationThread>> {
        if revision_count != self.config.gates.rejection_escalation_limit {
            return Ok(None);
        }
        let Some(gate) = state.gate(gate_id) else {
            return Ok(None);
        };
        let request = EscalationRequest::new(
            rejected_by.clone(),
            EscalationKind::RepeatedRejection,
            format!(
                "Gate to {} rejected {} times: {}",
                gate.target_phase, revision_count, feedback
            ),
        )
        .with_context(gate.proposal_summary.clone())
        .about(state.id.clone());
        warn!(
            orchestration = %state.id,
            gate = gate_id,
            revisions = revision_count,
            "Gate rejection limit reached, escalating"
        );
        self.open_escalation(request).map(Some)
    }

    // =========================================================================
    // Decision ledger
    // =========================================================================

    pub fn record_decision(
        &self,
        orch_id: &str,
        draft: DecisionDraft,
    ) -> CoordinationResult<Decision> {
        let (state, decision) = self.update(orch_id, |state: &mut OrchestrationState| {
            state.record_decision(draft)
        })?;
        self.decision(DecisionEvent {
            orchestration_id: state.id,
            decision: decision.clone(),
        });
        Ok(decision)
    }
}
