//! Orchestration state machine
//!
//! One [`OrchestrationState`] per task. It walks the phase table in
//! [`phase`], guards selected transitions with approval gates and keeps an
//! append-only decision ledger.

pub mod gate;
pub mod ledger;
pub mod phase;
pub mod state;

pub use gate::required_approver;
pub use ledger::DecisionDraft;
pub use phase::{can_transition, Phase, UnknownPhase};
pub use state::{Decision, Gate, GateStatus, OrchestrationState};
