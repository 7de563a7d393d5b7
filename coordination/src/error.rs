//! Coordination error types
//!
//! Expected outcomes (missing entities, illegal transitions, closed debates)
//! are distinct variants so callers can branch on them. Storage failures are
//! wrapped separately and never collapse into `NotFound`.

use thiserror::Error;

use crate::agent::ParseAgentIdError;
use crate::debate::DebateStatus;
use crate::escalation::ThreadStatus;
use crate::orchestration::{GateStatus, Phase};
use crate::store::StoreError;

/// Result type alias for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Kind of entity referenced by an id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Orchestration,
    Gate,
    Debate,
    Concern,
    EscalationThread,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Orchestration => write!(f, "orchestration"),
            Self::Gate => write!(f, "gate"),
            Self::Debate => write!(f, "debate"),
            Self::Concern => write!(f, "concern"),
            Self::EscalationThread => write!(f, "escalation thread"),
        }
    }
}

/// Errors that can occur during coordination operations
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Referenced entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Requested phase change is not in the transition table
    #[error("Invalid phase transition {from} → {to}")]
    InvalidTransition { from: Phase, to: Phase },

    /// An orchestration already has an open gate
    #[error("Gate {gate_id} is already open; resolve it before proposing another")]
    GateAlreadyOpen { gate_id: String },

    /// Gate was already approved, rejected or skipped
    #[error("Gate {gate_id} is not pending (status: {status})")]
    GateNotPending { gate_id: String, status: GateStatus },

    /// Debate no longer accepts messages or round changes
    #[error("Debate {debate_id} is not active (status: {status})")]
    DebateNotActive {
        debate_id: String,
        status: DebateStatus,
    },

    /// Concern or debate already carries a resolution
    #[error("{kind} {id} is already resolved")]
    AlreadyResolved { kind: EntityKind, id: String },

    /// Debate cannot be used to settle a gate while blockers remain open
    #[error("Debate {debate_id} has {count} open blocker(s)")]
    BlockersOutstanding { debate_id: String, count: usize },

    /// Debate has no resolution to act on
    #[error("Debate {debate_id} has not been resolved")]
    DebateUnresolved { debate_id: String },

    /// Escalation thread is resolved or already with the user
    #[error("Escalation thread {thread_id} is closed (status: {status})")]
    ThreadClosed {
        thread_id: String,
        status: ThreadStatus,
    },

    /// Input or loaded aggregate failed an eager consistency check
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Storage or serialization failure
    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
}

impl CoordinationError {
    /// Create a not found error
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether this is a missing-entity outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a rejected phase transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Whether the underlying storage failed (I/O, serialization, conflicts)
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<ParseAgentIdError> for CoordinationError {
    fn from(err: ParseAgentIdError) -> Self {
        Self::validation(err.to_string())
    }
}
