//! Gate manager — approval checkpoints on the orchestration aggregate.
//!
//! Every operation validates before it mutates, so a failed call leaves the
//! aggregate exactly as it was.

use chrono::Utc;
use uuid::Uuid;

use super::phase::{can_transition, Phase};
use super::state::{Gate, GateStatus, OrchestrationState};
use crate::agent::{AgentId, AgentRole};
use crate::capability::CapabilityProfile;
use crate::error::{CoordinationError, CoordinationResult, EntityKind};

/// Approver required before entering `target`, given the task's capabilities.
///
/// `None` means the transition may be taken directly.
pub fn required_approver(
    target: Phase,
    capabilities: &CapabilityProfile,
    namespace: &str,
) -> Option<AgentId> {
    let role = match target {
        Phase::Planning if capabilities.needs_architecture_review => AgentRole::Architect,
        Phase::Executing => AgentRole::Pm,
        Phase::Completed if capabilities.needs_security_review => AgentRole::SecurityReviewer,
        Phase::Completed => AgentRole::Qa,
        _ => return None,
    };
    Some(AgentId::role(namespace, role))
}

impl OrchestrationState {
    /// Open a pending gate guarding the move to `target_phase`.
    ///
    /// The new gate inherits the revision count of the latest rejected gate
    /// that targeted the same phase.
    pub fn open_gate(
        &mut self,
        target_phase: Phase,
        proposal_summary: impl Into<String>,
        approver: AgentId,
    ) -> CoordinationResult<Gate> {
        if let Some(open) = &self.current_gate {
            return Err(CoordinationError::GateAlreadyOpen {
                gate_id: open.clone(),
            });
        }
        if !can_transition(self.phase, target_phase) {
            return Err(CoordinationError::InvalidTransition {
                from: self.phase,
                to: target_phase,
            });
        }

        let revision_count = self
            .gates
            .iter()
            .rev()
            .find(|g| g.target_phase == target_phase)
            .filter(|g| g.status == GateStatus::Rejected)
            .map(|g| g.revision_count)
            .unwrap_or(0);

        let now = Utc::now();
        let gate = Gate {
            id: Uuid::new_v4().to_string(),
            target_phase,
            requires_approval_from: approver,
            proposal_summary: proposal_summary.into(),
            status: GateStatus::Pending,
            revision_count,
            feedback: None,
            resolved_by: None,
            debate_id: None,
            created_at: now,
            resolved_at: None,
        };
        self.current_gate = Some(gate.id.clone());
        self.gates.push(gate.clone());
        self.updated_at = now;
        Ok(gate)
    }

    /// Approve the gate and move to its target phase.
    pub fn approve_gate(
        &mut self,
        gate_id: &str,
        approved_by: AgentId,
        roles: impl IntoIterator<Item = AgentId>,
    ) -> CoordinationResult<Phase> {
        let target = self.pending_gate(gate_id)?.target_phase;
        if !can_transition(self.phase, target) {
            return Err(CoordinationError::InvalidTransition {
                from: self.phase,
                to: target,
            });
        }
        self.close_gate(gate_id, GateStatus::Approved, approved_by, None)?;
        self.transition(target, roles)?;
        Ok(target)
    }

    /// Reject the gate; phase is unchanged. Returns the new revision count.
    pub fn reject_gate(
        &mut self,
        gate_id: &str,
        feedback: impl Into<String>,
        rejected_by: AgentId,
    ) -> CoordinationResult<u32> {
        self.pending_gate(gate_id)?;
        let gate = self.close_gate(
            gate_id,
            GateStatus::Rejected,
            rejected_by,
            Some(feedback.into()),
        )?;
        gate.revision_count += 1;
        Ok(gate.revision_count)
    }

    /// Waive the gate and take the transition without approval.
    pub fn skip_gate(
        &mut self,
        gate_id: &str,
        skipped_by: AgentId,
        roles: impl IntoIterator<Item = AgentId>,
    ) -> CoordinationResult<Phase> {
        let target = self.pending_gate(gate_id)?.target_phase;
        if !can_transition(self.phase, target) {
            return Err(CoordinationError::InvalidTransition {
                from: self.phase,
                to: target,
            });
        }
        self.close_gate(gate_id, GateStatus::Skipped, skipped_by, None)?;
        self.transition(target, roles)?;
        Ok(target)
    }

    /// Attach the debate opened to settle a contested proposal.
    pub fn link_debate(&mut self, gate_id: &str, debate_id: &str) -> CoordinationResult<()> {
        let gate = self.pending_gate(gate_id)?;
        if let Some(existing) = &gate.debate_id {
            return Err(CoordinationError::validation(format!(
                "gate {} is already contested in debate {}",
                gate_id, existing
            )));
        }
        if let Some(gate) = self.gate_mut(gate_id) {
            gate.debate_id = Some(debate_id.to_string());
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn pending_gate(&self, gate_id: &str) -> CoordinationResult<&Gate> {
        let gate = self
            .gate(gate_id)
            .ok_or_else(|| CoordinationError::not_found(EntityKind::Gate, gate_id))?;
        if !gate.is_pending() {
            return Err(CoordinationError::GateNotPending {
                gate_id: gate_id.to_string(),
                status: gate.status,
            });
        }
        Ok(gate)
    }

    pub(super) fn close_gate(
        &mut self,
        gate_id: &str,
        status: GateStatus,
        by: AgentId,
        feedback: Option<String>,
    ) -> CoordinationResult<&mut Gate> {
        let now = Utc::now();
        if self.current_gate.as_deref() == Some(gate_id) {
            self.current_gate = None;
        }
        self.updated_at = now;
        let gate = self
            .gate_mut(gate_id)
            .ok_or_else(|| CoordinationError::not_found(EntityKind::Gate, gate_id))?;
        gate.status = status;
        gate.resolved_by = Some(by);
        gate.resolved_at = Some(now);
        if feedback.is_some() {
            gate.feedback = feedback;
        }
        Ok(gate)
    }
}
