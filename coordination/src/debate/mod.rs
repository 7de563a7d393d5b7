//! Debate rooms — structured negotiation between agents.
//!
//! # Lifecycle
//!
//! ```text
//! active ──resolve(consensus)──→ consensus
//!   │ ────resolve──────────────→ resolved
//!   │ ────advance_round past max→ escalated
//!   └─────abandon──────────────→ abandoned
//! ```
//!
//! Concerns are resolved independently of the debate outcome. A debate is
//! only safe to act on once it is [`DebateRoom::is_closable`].

pub mod room;
pub mod state;

pub use room::DebateRoom;
pub use state::{
    Concern, ConcernDraft, ConcernPriority, DebateResolution, DebateStatus, Message, MessageDraft,
    MessageKind, ResolutionDraft,
};
