//! Reload-time integrity checks for persisted aggregates.
//!
//! Records can be edited or written by older builds; the coordinator checks
//! them before mutating and refuses to build on corrupted state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::debate::{DebateRoom, DebateStatus};
use crate::escalation::{EscalationThread, ThreadStatus};
use crate::orchestration::{GateStatus, OrchestrationState, Phase};

/// Result of validating a reloaded aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityStatus {
    /// Consistent.
    Valid,
    /// Minor inconsistencies that do not affect the protocol.
    Recoverable { warnings: Vec<String> },
    /// Broken invariants; must not be mutated.
    Corrupted { errors: Vec<String> },
}

impl IntegrityStatus {
    /// Whether it is safe to keep operating on the aggregate.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Valid | Self::Recoverable { .. })
    }

    fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        if !errors.is_empty() {
            IntegrityStatus::Corrupted { errors }
        } else if !warnings.is_empty() {
            IntegrityStatus::Recoverable { warnings }
        } else {
            IntegrityStatus::Valid
        }
    }
}

pub fn validate_orchestration(state: &OrchestrationState) -> IntegrityStatus {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    // Open gate must be the newest gate and still pending
    let pending: Vec<&str> = state
        .gates
        .iter()
        .filter(|g| g.status == GateStatus::Pending)
        .map(|g| g.id.as_str())
        .collect();
    match state.current_gate.as_deref() {
        Some(current) => {
            if state.gates.last().map(|g| g.id.as_str()) != Some(current) {
                errors.push(format!("current gate {} is not the latest gate", current));
            }
            if pending != [current] {
                errors.push(format!(
                    "current gate {} but pending gates are {:?}",
                    current, pending
                ));
            }
        }
        None if !pending.is_empty() => {
            errors.push(format!("pending gates {:?} with no current gate", pending));
        }
        None => {}
    }

    let mut seen = BTreeSet::new();
    for gate in &state.gates {
        if !seen.insert(gate.id.as_str()) {
            errors.push(format!("duplicate gate id {}", gate.id));
        }
        if gate.status == GateStatus::Rejected && gate.revision_count == 0 {
            errors.push(format!("rejected gate {} has revision count 0", gate.id));
        }
        if gate.status != GateStatus::Pending && gate.resolved_at.is_none() {
            warnings.push(format!("gate {} is {} but has no resolved_at", gate.id, gate.status));
        }
    }

    if state.completed_at.is_some() && state.phase != Phase::Completed {
        warnings.push(format!("completed_at set in phase {}", state.phase));
    }
    if state.failure_reason.is_some() && state.phase != Phase::Failed {
        warnings.push(format!("failure_reason set in phase {}", state.phase));
    }
    if !state.participants.contains(&state.pm_agent) {
        warnings.push(format!("pm agent {} is not a participant", state.pm_agent));
    }

    IntegrityStatus::from_findings(errors, warnings)
}

pub fn validate_debate(room: &DebateRoom) -> IntegrityStatus {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if room.round == 0 {
        errors.push("round is 0".to_string());
    }
    if room.round > room.max_rounds && room.status != DebateStatus::Escalated {
        errors.push(format!(
            "round {} exceeds max {} but status is {}",
            room.round, room.max_rounds, room.status
        ));
    }
    match (&room.resolution, room.status.is_decided()) {
        (None, true) => errors.push(format!("status {} without a resolution", room.status)),
        (Some(_), false) => errors.push(format!("resolution attached in status {}", room.status)),
        _ => {}
    }

    for concern in &room.concerns {
        if concern.resolution.is_none()
            && (concern.resolved_by.is_some() || concern.resolved_at.is_some())
        {
            errors.push(format!("concern {} has resolver but no resolution", concern.id));
        }
        if concern.resolution.is_some()
            && (concern.resolved_by.is_none() || concern.resolved_at.is_none())
        {
            warnings.push(format!("concern {} resolved without resolver or timestamp", concern.id));
        }
    }

    let unique: BTreeSet<_> = room.participants.iter().collect();
    if unique.len() != room.participants.len() {
        warnings.push("duplicate participants".to_string());
    }

    IntegrityStatus::from_findings(errors, warnings)
}

pub fn validate_thread(thread: &EscalationThread) -> IntegrityStatus {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    let first_resolving = thread.responses.iter().position(|r| r.resolved);
    if let Some(idx) = first_resolving {
        if idx + 1 != thread.responses.len() {
            errors.push(format!("responses recorded after resolution at #{}", idx + 1));
        }
    }
    match (thread.status, first_resolving.is_some()) {
        (ThreadStatus::Resolved, false) => {
            errors.push("resolved without a resolving response".to_string())
        }
        (ThreadStatus::Open, true) | (ThreadStatus::EscalatedToUser, true) => errors.push(format!(
            "status {} but a response resolved the thread",
            thread.status
        )),
        _ => {}
    }
    if thread.status == ThreadStatus::EscalatedToUser && thread.responses.is_empty() {
        warnings.push("escalated to user without any response".to_string());
    }

    IntegrityStatus::from_findings(errors, warnings)
}
