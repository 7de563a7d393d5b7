//! Orchestration aggregate — phase, participants, gate history and decision ledger.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::{can_transition, Phase};
use crate::agent::AgentId;
use crate::capability::CapabilityProfile;
use crate::error::{CoordinationError, CoordinationResult};

/// Resolution state of an approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Approval checkpoint guarding a phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub id: String,
    /// Phase entered when the gate is approved
    pub target_phase: Phase,
    /// Role whose approval is required
    pub requires_approval_from: AgentId,
    pub proposal_summary: String,
    pub status: GateStatus,
    /// Rejections so far in this gate's lineage (same target phase)
    pub revision_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Agent that approved, rejected or skipped the gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<AgentId>,
    /// Debate opened because the proposal was contested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Gate {
    pub fn is_pending(&self) -> bool {
        self.status == GateStatus::Pending
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    /// Phase active when the decision was made
    pub phase: Phase,
    pub topic: String,
    /// Candidate choices considered
    pub options: Vec<String>,
    pub chosen: String,
    pub rationale: String,
    pub made_by: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_id: Option<String>,
    pub consensus: bool,
    pub decided_at: DateTime<Utc>,
}

/// One orchestration per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub id: String,
    pub session_id: String,
    pub phase: Phase,
    pub task: String,
    pub pm_agent: AgentId,
    pub participants: BTreeSet<AgentId>,
    #[serde(default)]
    pub capabilities: CapabilityProfile,
    /// Gate history, append-only
    pub gates: Vec<Gate>,
    /// Id of the open gate; always the last entry of `gates`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_gate: Option<String>,
    /// Decision ledger, append-only
    pub decisions: Vec<Decision>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl OrchestrationState {
    /// Create a new orchestration in `initialized` with only the PM participating.
    pub fn new(
        task: impl Into<String>,
        session_id: impl Into<String>,
        pm_agent: AgentId,
        capabilities: CapabilityProfile,
    ) -> Self {
        let now = Utc::now();
        let mut participants = BTreeSet::new();
        participants.insert(pm_agent.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            phase: Phase::Initialized,
            task: task.into(),
            pm_agent,
            participants,
            capabilities,
            gates: Vec::new(),
            current_gate: None,
            decisions: Vec::new(),
            started_at: now,
            updated_at: now,
            completed_at: None,
            failure_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn gate(&self, gate_id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.id == gate_id)
    }

    pub(crate) fn gate_mut(&mut self, gate_id: &str) -> Option<&mut Gate> {
        self.gates.iter_mut().find(|g| g.id == gate_id)
    }

    /// The open gate, if any.
    pub fn current_gate(&self) -> Option<&Gate> {
        self.current_gate.as_deref().and_then(|id| self.gate(id))
    }

    /// Move to `target`, adding `roles` to the participants.
    ///
    /// Leaves the state untouched when the edge is not in the table.
    /// Returns the phase left behind.
    pub fn transition(
        &mut self,
        target: Phase,
        roles: impl IntoIterator<Item = AgentId>,
    ) -> CoordinationResult<Phase> {
        if !can_transition(self.phase, target) {
            return Err(CoordinationError::InvalidTransition {
                from: self.phase,
                to: target,
            });
        }

        let from = self.phase;
        self.phase = target;
        self.participants.extend(roles);
        self.updated_at = Utc::now();
        if target == Phase::Completed {
            self.completed_at = Some(self.updated_at);
        }

        tracing::debug!(
            orchestration = %self.id,
            from = %from,
            to = %target,
            "Phase transition"
        );
        Ok(from)
    }

    /// Force the orchestration into `failed`.
    ///
    /// Allowed from any non-terminal phase, including `initialized` and
    /// `paused` which have no table edge to `failed`. An open gate is closed
    /// as skipped on behalf of the PM.
    pub fn fail(&mut self, reason: impl Into<String>) -> CoordinationResult<Phase> {
        if self.is_terminal() {
            return Err(CoordinationError::InvalidTransition {
                from: self.phase,
                to: Phase::Failed,
            });
        }
        let reason = reason.into();
        if let Some(open) = self.current_gate.clone() {
            let pm = self.pm_agent.clone();
            self.close_gate(
                &open,
                GateStatus::Skipped,
                pm,
                Some(format!("orchestration failed: {}", reason)),
            )?;
        }
        let from = self.phase;
        self.phase = Phase::Failed;
        self.failure_reason = Some(reason);
        self.updated_at = Utc::now();
        Ok(from)
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        let gate = match self.current_gate() {
            Some(g) => format!("gate→{} (rev {})", g.target_phase, g.revision_count),
            None => "no open gate".to_string(),
        };
        format!(
            "[{}] {} | {} participants | {} gates | {} decisions | {}",
            self.phase,
            self.id,
            self.participants.len(),
            self.gates.len(),
            self.decisions.len(),
            gate
        )
    }
}
