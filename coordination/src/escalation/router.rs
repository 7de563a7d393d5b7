//! Escalation router — deterministic kind → role mapping and the user threshold.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::warn;

use super::thread::{EscalationKind, EscalationRequest, EscalationThread, NextAction};
use crate::agent::{AgentId, AgentRole};
use crate::capability::Classified;
use crate::config::CoordinationConfig;

/// Default number of unresolved responses before a thread goes to the user.
pub const DEFAULT_USER_THRESHOLD: usize = 3;

/// Routes escalation requests to a role and decides when a human is needed.
#[derive(Debug, Clone)]
pub struct EscalationRouter {
    routes: BTreeMap<EscalationKind, AgentId>,
    moderator: AgentId,
    user_threshold: usize,
}

impl EscalationRouter {
    /// Router with the built-in route table for `namespace`.
    pub fn new(namespace: &str, moderator: AgentId) -> Self {
        use AgentRole::*;
        let table = [
            (EscalationKind::DesignDecision, Architect),
            (EscalationKind::SecurityConcern, SecurityReviewer),
            (EscalationKind::ImplementationQuestion, Developer),
            (EscalationKind::TestFailure, Qa),
            (EscalationKind::ScopeChange, Pm),
            (EscalationKind::RequirementsClarification, Pm),
            (EscalationKind::RepeatedRejection, Pm),
        ];
        let mut routes: BTreeMap<EscalationKind, AgentId> = table
            .into_iter()
            .map(|(kind, role)| (kind, AgentId::role(namespace, role)))
            .collect();
        routes.insert(EscalationKind::Blocker, moderator.clone());
        routes.insert(EscalationKind::ContestedConcern, moderator.clone());

        Self {
            routes,
            moderator,
            user_threshold: DEFAULT_USER_THRESHOLD,
        }
    }

    /// Built-in table plus the overrides and threshold from `config`.
    ///
    /// Unresolvable agent names are logged and skipped; a validated config
    /// has none.
    pub fn from_config(config: &CoordinationConfig) -> Self {
        let moderator = config.moderator_id().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring configured moderator");
            AgentId::role(config.namespace.clone(), AgentRole::Moderator)
        });
        let mut router =
            Self::new(&config.namespace, moderator).with_user_threshold(config.escalation.user_threshold);
        for (kind, agent) in &config.escalation.routes {
            match config.agent(agent) {
                Ok(target) => {
                    router = router.with_route(EscalationKind::from(kind.as_str()), target);
                }
                Err(e) => warn!(kind = %kind, error = %e, "Ignoring escalation route override"),
            }
        }
        router
    }

    /// Add or override a route.
    pub fn with_route(mut self, kind: EscalationKind, target: AgentId) -> Self {
        self.routes.insert(kind, target);
        self
    }

    pub fn with_user_threshold(mut self, threshold: usize) -> Self {
        self.user_threshold = threshold.max(1);
        self
    }

    pub fn user_threshold(&self) -> usize {
        self.user_threshold
    }

    pub fn moderator(&self) -> &AgentId {
        &self.moderator
    }

    /// Target for `request`. Unknown kinds fall back to the moderator.
    pub fn route(&self, request: &EscalationRequest) -> Classified<AgentId> {
        match self.routes.get(&request.kind) {
            Some(target) => Classified::ok(target.clone()),
            None => Classified::fallback(
                self.moderator.clone(),
                format!("no route for escalation kind '{}'", request.kind),
            ),
        }
    }

    pub fn should_escalate_to_user(&self, thread: &EscalationThread) -> bool {
        thread.needs_user(self.user_threshold)
    }

    /// Plain-text projection of a thread for the human operator.
    pub fn format_for_user(&self, thread: &EscalationThread) -> String {
        let request = &thread.request;
        let mut out = String::new();
        let _ = writeln!(out, "Escalation {} [{}]", thread.id, thread.status);
        let _ = writeln!(out, "Topic: {}: {}", request.kind, request.message);
        let _ = writeln!(out, "Requested by: {}", request.from);
        match &thread.routing_note {
            Some(note) => {
                let _ = writeln!(out, "Routed to: {} (fallback: {})", thread.assigned_to, note);
            }
            None => {
                let _ = writeln!(out, "Routed to: {}", thread.assigned_to);
            }
        }
        if let Some(subject) = &request.subject {
            let _ = writeln!(out, "Subject: {}", subject);
        }
        if let Some(context) = &request.context {
            let _ = writeln!(out, "Context: {}", context);
        }

        let _ = writeln!(
            out,
            "Attempts: {} ({} unresolved, threshold {})",
            thread.responses.len(),
            thread.unresolved_attempts(),
            self.user_threshold
        );
        for (i, response) in thread.responses.iter().enumerate() {
            let state = if response.resolved {
                "resolved"
            } else {
                "unresolved"
            };
            let _ = write!(
                out,
                "  {}. {} [{}] {}",
                i + 1,
                response.from,
                state,
                response.message
            );
            if let Some(action) = &response.next_action {
                let _ = write!(out, " (next: {})", action);
            }
            out.push('\n');
        }

        let mut suggested: Vec<&NextAction> = Vec::new();
        for action in thread.responses.iter().filter_map(|r| r.next_action.as_ref()) {
            if !matches!(action, NextAction::AskUser) && !suggested.contains(&action) {
                suggested.push(action);
            }
        }
        let others: Vec<&AgentId> = thread
            .eligible_responders
            .iter()
            .filter(|a| **a != thread.assigned_to)
            .collect();
        if !suggested.is_empty() || !others.is_empty() {
            let _ = writeln!(out, "Options:");
            for action in suggested {
                let _ = writeln!(out, "  - {}", action);
            }
            for agent in others {
                let _ = writeln!(out, "  - reroute to {}", agent);
            }
        }
        out
    }
}
