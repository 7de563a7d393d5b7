//! Council coordination library
//!
//! Protocol layer for a team of AI agents working one task under a project
//! manager:
//!
//! - **Orchestration**: a phase state machine per task, approval gates in
//!   front of selected phases and an append-only decision ledger
//! - **Debate**: bounded multi-round discussion rooms with concerns and
//!   blocker tracking
//! - **Escalation**: routing unresolved issues to the right role, and to
//!   the human user once agents give up
//!
//! All state lives in a pluggable [`store::StateStore`] keyed by id and
//! guarded by optimistic versions. [`Coordinator`] is the single entry point
//! for by-id operations.
//!
//! # Usage
//!
//! ```no_run
//! use council_coordination::{Coordinator, CoordinationConfig, MemoryStore, Phase};
//!
//! # fn main() -> Result<(), council_coordination::CoordinationError> {
//! let coordinator = Coordinator::with_defaults(MemoryStore::new().shared(), CoordinationConfig::default());
//! let state = coordinator.create("Add rate limiting to the API", "session-1")?;
//! coordinator.transition_phase(&state.id, Phase::Analyzing)?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod audit;
pub mod capability;
pub mod config;
pub mod coordinator;
pub mod debate;
pub mod error;
pub mod escalation;
pub mod integrity;
pub mod orchestration;
pub mod store;

pub use agent::{AgentId, AgentRole, DefaultTeam, ParseAgentIdError, TeamResolver};
pub use audit::{AuditBus, AuditEvent, AuditSink, RecordingAuditSink, TracingAuditSink};
pub use capability::{CapabilityProfile, Classified};
pub use config::{ConfigError, CoordinationConfig};
pub use coordinator::{Coordinator, GateRejection, GateSettlement, GateVerdict};
pub use debate::{
    Concern, ConcernDraft, ConcernPriority, DebateResolution, DebateRoom, DebateStatus,
    MessageDraft, MessageKind, ResolutionDraft,
};
pub use error::{CoordinationError, CoordinationResult, EntityKind};
pub use escalation::{
    EscalationKind, EscalationRequest, EscalationResponse, EscalationRouter, EscalationThread,
    NextAction, ThreadStatus,
};
pub use integrity::IntegrityStatus;
pub use orchestration::{Decision, DecisionDraft, Gate, GateStatus, OrchestrationState, Phase};
pub use store::{FileStore, MemoryStore, SharedStateStore, StateStore, StoreError};
