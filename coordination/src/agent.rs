//! Agent identity and team resolution.
//!
//! Agents are addressed by a typed [`AgentId`] (`namespace:name`) instead of
//! names with a glued-on prefix. The [`TeamResolver`] trait is the seam to
//! whatever decides which roles take part in a phase or may answer an
//! escalation; [`DefaultTeam`] is the built-in table.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escalation::EscalationKind;
use crate::orchestration::Phase;

/// Typed agent identifier.
///
/// Serializes as `namespace:name`. Both parts are non-empty and the
/// namespace must not contain `:`; the name may. [`AgentId::new`] does not
/// check this, so ids built from untrusted input go through
/// [`AgentId::try_new`] or [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId {
    pub namespace: String,
    pub name: String,
}

/// Error parsing an [`AgentId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid agent id '{input}': expected 'namespace:name'")]
pub struct ParseAgentIdError {
    pub input: String,
}

impl AgentId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn try_new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ParseAgentIdError> {
        let id = Self::new(namespace, name);
        if id.is_valid() {
            Ok(id)
        } else {
            Err(ParseAgentIdError {
                input: id.to_string(),
            })
        }
    }

    /// Whether the id survives a display/parse round trip.
    pub fn is_valid(&self) -> bool {
        !self.namespace.is_empty() && !self.namespace.contains(':') && !self.name.is_empty()
    }

    /// Identifier for a well-known role within a team namespace.
    pub fn role(namespace: impl Into<String>, role: AgentRole) -> Self {
        Self::new(namespace, role.as_str())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for AgentId {
    type Err = ParseAgentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((ns, name)) => Self::try_new(ns, name),
            None => Err(ParseAgentIdError {
                input: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for AgentId {
    type Error = ParseAgentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.to_string()
    }
}

/// Well-known agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    /// Owns the task and the plan
    Pm,
    /// Design decisions and architecture review
    Architect,
    /// General design/plan review
    Reviewer,
    /// Security review
    SecurityReviewer,
    /// Implementation
    Developer,
    /// Verification and test sign-off
    Qa,
    /// Chairs debates and catches unowned escalations
    Moderator,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pm => "pm",
            Self::Architect => "architect",
            Self::Reviewer => "reviewer",
            Self::SecurityReviewer => "security-reviewer",
            Self::Developer => "developer",
            Self::Qa => "qa",
            Self::Moderator => "moderator",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplies the agents eligible for a phase or an escalation kind.
pub trait TeamResolver: Send + Sync {
    /// Roles that join the orchestration when it enters `phase`.
    fn roles_for_phase(&self, phase: Phase) -> BTreeSet<AgentId>;

    /// Roles allowed to respond to an escalation of `kind`.
    fn roles_for_escalation(&self, kind: &EscalationKind) -> Vec<AgentId>;
}

/// Static role table used when no external team directory is wired in.
#[derive(Debug, Clone)]
pub struct DefaultTeam {
    namespace: String,
}

impl DefaultTeam {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn ids(&self, roles: &[AgentRole]) -> Vec<AgentId> {
        roles
            .iter()
            .map(|r| AgentId::role(self.namespace.clone(), *r))
            .collect()
    }
}

impl TeamResolver for DefaultTeam {
    fn roles_for_phase(&self, phase: Phase) -> BTreeSet<AgentId> {
        use AgentRole::*;
        let roles: &[AgentRole] = match phase {
            Phase::Analyzing => &[Pm, Architect],
            Phase::Designing => &[Architect],
            Phase::ReviewingDesign => &[Architect, Reviewer],
            Phase::Planning => &[Pm, Architect],
            Phase::ReviewingPlan => &[Reviewer],
            Phase::Executing => &[Developer],
            Phase::Verifying => &[Qa, Reviewer],
            Phase::Initialized | Phase::Completed | Phase::Failed | Phase::Paused => &[],
        };
        self.ids(roles).into_iter().collect()
    }

    fn roles_for_escalation(&self, kind: &EscalationKind) -> Vec<AgentId> {
        use AgentRole::*;
        let roles: &[AgentRole] = match kind {
            EscalationKind::DesignDecision => &[Architect, Reviewer],
            EscalationKind::SecurityConcern => &[SecurityReviewer, Architect],
            EscalationKind::ImplementationQuestion => &[Developer, Architect],
            EscalationKind::TestFailure => &[Qa, Developer],
            EscalationKind::ScopeChange
            | EscalationKind::RequirementsClarification
            | EscalationKind::RepeatedRejection => &[Pm],
            EscalationKind::Blocker | EscalationKind::ContestedConcern => &[Moderator, Pm],
            EscalationKind::Other(_) => &[Moderator],
        };
        self.ids(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_display_and_parse() {
        let id = AgentId::new("team", "architect");
        assert_eq!(id.to_string(), "team:architect");
        let parsed: AgentId = "team:architect".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_agent_id_name_may_contain_colon() {
        let parsed: AgentId = "team:dev:2".parse().unwrap();
        assert_eq!(parsed.namespace, "team");
        assert_eq!(parsed.name, "dev:2");
    }

    #[test]
    fn test_agent_id_rejects_bare_names() {
        assert!("architect".parse::<AgentId>().is_err());
        assert!(":architect".parse::<AgentId>().is_err());
        assert!("team:".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_try_new_rejects_ids_that_would_not_parse_back() {
        assert!(AgentId::try_new("council", "").is_err());
        assert!(AgentId::try_new("", "pm").is_err());
        assert!(AgentId::try_new("a:b", "pm").is_err());
        assert!(!AgentId::new("council", "").is_valid());

        let id = AgentId::try_new("council", "dev:2").unwrap();
        assert_eq!(id.to_string().parse::<AgentId>().unwrap(), id);
    }

    #[test]
    fn test_agent_id_serde_as_string() {
        let id = AgentId::role("council", AgentRole::SecurityReviewer);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"council:security-reviewer\"");
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let bad: Result<AgentId, _> = serde_json::from_str("\"nonamespace\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_default_team_phase_roles() {
        let team = DefaultTeam::new("t");
        let roles = team.roles_for_phase(Phase::Executing);
        assert!(roles.contains(&AgentId::new("t", "developer")));
        assert!(team.roles_for_phase(Phase::Completed).is_empty());
        assert!(team.roles_for_phase(Phase::Initialized).is_empty());
    }

    #[test]
    fn test_default_team_escalation_roles() {
        let team = DefaultTeam::new("t");
        let roles = team.roles_for_escalation(&EscalationKind::SecurityConcern);
        assert_eq!(roles[0], AgentId::new("t", "security-reviewer"));
        let other = team.roles_for_escalation(&EscalationKind::Other("budget".into()));
        assert_eq!(other, vec![AgentId::new("t", "moderator")]);
    }
}
