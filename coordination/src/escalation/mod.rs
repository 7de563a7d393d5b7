//! Escalation — routing unresolved issues to another role or to the user.
//!
//! ```text
//! request ──route──→ thread(open, assigned_to)
//!                      │ response(resolved)          → resolved
//!                      │ response(reroute to X)      → open, assigned_to = X
//!                      └ ask-user | attempts ≥ limit → escalated_to_user
//! ```
//!
//! Routing never drops a request: unknown kinds go to the moderator and the
//! fallback is reported through [`Classified`](crate::capability::Classified).

pub mod router;
pub mod thread;

pub use router::{EscalationRouter, DEFAULT_USER_THRESHOLD};
pub use thread::{
    EscalationKind, EscalationRequest, EscalationResponse, EscalationThread, NextAction,
    ThreadStatus,
};
