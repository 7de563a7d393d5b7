//! Capability flags and tagged classification results.
//!
//! The capability classifier lives outside this crate; its output arrives
//! here as a precomputed [`CapabilityProfile`]. [`Classified`] makes any
//! fallback value visible to the caller instead of substituting it silently.

use serde::{Deserialize, Serialize};

/// Precomputed classifier output for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// Design must pass an architect-approved gate before planning
    #[serde(default)]
    pub needs_architecture_review: bool,
    /// Completion must be signed off by the security reviewer
    #[serde(default)]
    pub needs_security_review: bool,
}

impl CapabilityProfile {
    pub fn with_architecture_review(mut self) -> Self {
        self.needs_architecture_review = true;
        self
    }

    pub fn with_security_review(mut self) -> Self {
        self.needs_security_review = true;
        self
    }
}

/// A value that was either determined directly or fell back to a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Classified<T> {
    /// Value came from an explicit rule
    Ok { value: T },
    /// No rule matched; `value` is the default and `reason` says why
    Fallback { value: T, reason: String },
}

impl<T> Classified<T> {
    pub fn ok(value: T) -> Self {
        Self::Ok { value }
    }

    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self::Fallback {
            value,
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Ok { value } | Self::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Ok { value } | Self::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::Fallback { reason, .. } => Some(reason),
        }
    }
}
