//! Orchestration phases and the legal transition table.
//!
//! ```text
//! initialized      → analyzing
//! analyzing        → designing | planning | paused | failed
//! designing        → reviewing_design | paused | failed
//! reviewing_design → planning | designing | failed
//! planning         → reviewing_plan | paused | failed
//! reviewing_plan   → executing | planning | failed
//! executing        → verifying | paused | failed
//! verifying        → completed | executing | failed
//! paused           → executing | analyzing | designing | planning
//! completed, failed: terminal
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of an orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialized,
    Analyzing,
    Designing,
    ReviewingDesign,
    Planning,
    ReviewingPlan,
    Executing,
    Verifying,
    Completed,
    Failed,
    Paused,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::Initialized,
        Phase::Analyzing,
        Phase::Designing,
        Phase::ReviewingDesign,
        Phase::Planning,
        Phase::ReviewingPlan,
        Phase::Executing,
        Phase::Verifying,
        Phase::Completed,
        Phase::Failed,
        Phase::Paused,
    ];

    /// Whether this is a terminal phase (no outgoing transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal successor phases.
    pub fn successors(self) -> &'static [Phase] {
        use Phase::*;
        match self {
            Initialized => &[Analyzing],
            Analyzing => &[Designing, Planning, Paused, Failed],
            Designing => &[ReviewingDesign, Paused, Failed],
            ReviewingDesign => &[Planning, Designing, Failed],
            Planning => &[ReviewingPlan, Paused, Failed],
            ReviewingPlan => &[Executing, Planning, Failed],
            Executing => &[Verifying, Paused, Failed],
            Verifying => &[Completed, Executing, Failed],
            Paused => &[Executing, Analyzing, Designing, Planning],
            Completed | Failed => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Analyzing => "analyzing",
            Self::Designing => "designing",
            Self::ReviewingDesign => "reviewing_design",
            Self::Planning => "planning",
            Self::ReviewingPlan => "reviewing_plan",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

/// Whether `to` is a legal successor of `from`.
pub fn can_transition(from: Phase, to: Phase) -> bool {
    from.successors().contains(&to)
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`Phase`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases_have_no_successors() {
        for phase in Phase::ALL {
            assert_eq!(phase.is_terminal(), phase.successors().is_empty());
        }
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Paused.is_terminal());
    }

    /// Every legal edge, written out by name.
    const EDGES: &[(&str, &str)] = &[
        ("initialized", "analyzing"),
        ("analyzing", "designing"),
        ("analyzing", "planning"),
        ("analyzing", "paused"),
        ("analyzing", "failed"),
        ("designing", "reviewing_design"),
        ("designing", "paused"),
        ("designing", "failed"),
        ("reviewing_design", "planning"),
        ("reviewing_design", "designing"),
        ("reviewing_design", "failed"),
        ("planning", "reviewing_plan"),
        ("planning", "paused"),
        ("planning", "failed"),
        ("reviewing_plan", "executing"),
        ("reviewing_plan", "planning"),
        ("reviewing_plan", "failed"),
        ("executing", "verifying"),
        ("executing", "paused"),
        ("executing", "failed"),
        ("verifying", "completed"),
        ("verifying", "executing"),
        ("verifying", "failed"),
        ("paused", "executing"),
        ("paused", "analyzing"),
        ("paused", "designing"),
        ("paused", "planning"),
    ];

    #[test]
    fn test_transition_table_matches_edge_list() {
        let mut allowed = 0;
        for from in Phase::ALL {
            for to in Phase::ALL {
                let listed = EDGES.contains(&(from.as_str(), to.as_str()));
                assert_eq!(can_transition(from, to), listed, "{} → {}", from, to);
                allowed += usize::from(listed);
            }
        }
        assert_eq!(allowed, EDGES.len());
    }

    #[test]
    fn test_documented_edges() {
        assert!(can_transition(Phase::Initialized, Phase::Analyzing));
        assert!(!can_transition(Phase::Initialized, Phase::Designing));
        assert!(can_transition(Phase::ReviewingDesign, Phase::Planning));
        assert!(can_transition(Phase::ReviewingDesign, Phase::Designing));
        assert!(can_transition(Phase::ReviewingDesign, Phase::Failed));
        assert!(can_transition(Phase::Verifying, Phase::Completed));
        assert!(can_transition(Phase::Verifying, Phase::Executing));
        assert!(can_transition(Phase::Paused, Phase::Planning));
        assert!(!can_transition(Phase::Analyzing, Phase::Executing));
        assert!(!can_transition(Phase::Completed, Phase::Executing));
    }

    #[test]
    fn test_no_self_loops() {
        for phase in Phase::ALL {
            assert!(!can_transition(phase, phase), "{} loops", phase);
        }
    }

    #[test]
    fn test_display_parse_roundtrip() {
        for phase in Phase::ALL {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
        assert!("shipping".parse::<Phase>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Phase::ReviewingDesign).unwrap();
        assert_eq!(json, "\"reviewing_design\"");
    }
}
