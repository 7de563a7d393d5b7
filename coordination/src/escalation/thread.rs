//! Escalation requests, responses and the thread aggregate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentId;
use crate::capability::Classified;
use crate::error::{CoordinationError, CoordinationResult};

/// Kind of issue being escalated.
///
/// Serializes as its kebab-case name; unrecognised names round-trip through
/// [`EscalationKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EscalationKind {
    DesignDecision,
    SecurityConcern,
    ImplementationQuestion,
    TestFailure,
    ScopeChange,
    RequirementsClarification,
    /// A gate was rejected too many times
    RepeatedRejection,
    /// Blocker concern with no specific owner
    Blocker,
    /// Non-blocker concern the participants could not settle
    ContestedConcern,
    Other(String),
}

impl EscalationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DesignDecision => "design-decision",
            Self::SecurityConcern => "security-concern",
            Self::ImplementationQuestion => "implementation-question",
            Self::TestFailure => "test-failure",
            Self::ScopeChange => "scope-change",
            Self::RequirementsClarification => "requirements-clarification",
            Self::RepeatedRejection => "repeated-rejection",
            Self::Blocker => "blocker",
            Self::ContestedConcern => "contested-concern",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for EscalationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "design-decision" => Self::DesignDecision,
            "security-concern" => Self::SecurityConcern,
            "implementation-question" => Self::ImplementationQuestion,
            "test-failure" => Self::TestFailure,
            "scope-change" => Self::ScopeChange,
            "requirements-clarification" => Self::RequirementsClarification,
            "repeated-rejection" => Self::RepeatedRejection,
            "blocker" => Self::Blocker,
            "contested-concern" => Self::ContestedConcern,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for EscalationKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EscalationKind> for String {
    fn from(kind: EscalationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EscalationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue an agent cannot settle on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub from: AgentId,
    pub kind: EscalationKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Orchestration, gate or debate the request concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl EscalationRequest {
    pub fn new(from: AgentId, kind: impl Into<EscalationKind>, message: impl Into<String>) -> Self {
        Self {
            from,
            kind: kind.into(),
            message: message.into(),
            context: None,
            subject: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// What a responder wants to happen next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum NextAction {
    /// Hand the issue to the human operator
    AskUser,
    /// Try again at the current assignee
    Retry,
    /// Reassign the thread
    Reroute { to: AgentId },
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AskUser => write!(f, "ask-user"),
            Self::Retry => write!(f, "retry"),
            Self::Reroute { to } => write!(f, "reroute to {}", to),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationResponse {
    pub from: AgentId,
    pub message: String,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
    pub responded_at: DateTime<Utc>,
}

impl EscalationResponse {
    /// Unresolved response with no follow-up.
    pub fn new(from: AgentId, message: impl Into<String>) -> Self {
        Self {
            from,
            message: message.into(),
            resolved: false,
            next_action: None,
            responded_at: Utc::now(),
        }
    }

    pub fn resolving(mut self) -> Self {
        self.resolved = true;
        self
    }

    pub fn then(mut self, action: NextAction) -> Self {
        self.next_action = Some(action);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Open,
    Resolved,
    EscalatedToUser,
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Resolved => write!(f, "resolved"),
            Self::EscalatedToUser => write!(f, "escalated_to_user"),
        }
    }
}

/// Request plus the ordered responses it collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationThread {
    pub id: String,
    pub request: EscalationRequest,
    /// Agent currently expected to respond
    pub assigned_to: AgentId,
    /// Set when routing fell back to the moderator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_note: Option<String>,
    /// Agents allowed to respond besides the assignee; empty means anyone
    #[serde(default)]
    pub eligible_responders: Vec<AgentId>,
    pub responses: Vec<EscalationResponse>,
    pub status: ThreadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscalationThread {
    pub fn new(
        request: EscalationRequest,
        route: Classified<AgentId>,
        eligible_responders: Vec<AgentId>,
    ) -> Self {
        let routing_note = route.fallback_reason().map(str::to_string);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            assigned_to: route.into_value(),
            routing_note,
            eligible_responders,
            responses: Vec::new(),
            status: ThreadStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ThreadStatus::Open
    }

    pub fn latest_response(&self) -> Option<&EscalationResponse> {
        self.responses.last()
    }

    /// Responses that did not resolve the issue.
    pub fn unresolved_attempts(&self) -> usize {
        self.responses.iter().filter(|r| !r.resolved).count()
    }

    /// Latest response asks for the user, or unresolved attempts reached `threshold`.
    pub fn needs_user(&self, threshold: usize) -> bool {
        let asked = matches!(
            self.latest_response().and_then(|r| r.next_action.as_ref()),
            Some(NextAction::AskUser)
        );
        asked || self.unresolved_attempts() >= threshold
    }

    pub fn may_respond(&self, agent: &AgentId) -> bool {
        self.eligible_responders.is_empty()
            || *agent == self.assigned_to
            || self.eligible_responders.contains(agent)
    }

    /// Append a response and settle the thread status.
    ///
    /// A resolving response closes the thread; otherwise a reroute reassigns
    /// it and reaching the user threshold hands it to the user.
    pub fn add_response(
        &mut self,
        response: EscalationResponse,
        user_threshold: usize,
    ) -> CoordinationResult<ThreadStatus> {
        if !self.is_open() {
            return Err(CoordinationError::ThreadClosed {
                thread_id: self.id.clone(),
                status: self.status,
            });
        }
        if !self.may_respond(&response.from) {
            return Err(CoordinationError::validation(format!(
                "{} may not respond to escalation {} ({})",
                response.from, self.id, self.request.kind
            )));
        }

        self.updated_at = response.responded_at;
        if response.resolved {
            self.responses.push(response);
            self.status = ThreadStatus::Resolved;
            return Ok(self.status);
        }

        if let Some(NextAction::Reroute { to }) = &response.next_action {
            tracing::debug!(thread = %self.id, from = %self.assigned_to, to = %to, "Escalation rerouted");
            self.assigned_to = to.clone();
        }
        self.responses.push(response);
        if self.needs_user(user_threshold) {
            self.status = ThreadStatus::EscalatedToUser;
        }
        Ok(self.status)
    }
}
