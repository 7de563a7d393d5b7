//! Coordinator configuration
//!
//! Loaded from a TOML file and overridden by `COUNCIL_*` environment
//! variables. Every field has a default, so an empty file is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::{AgentId, ParseAgentIdError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Rounds before a debate is force-escalated
    pub max_rounds: u32,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self { max_rounds: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Unresolved responses before a thread goes to the user
    pub user_threshold: usize,
    /// Escalation kind → agent name (or full `namespace:name`) overrides
    pub routes: BTreeMap<String, String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            user_threshold: crate::escalation::DEFAULT_USER_THRESHOLD,
            routes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Rejections of one gate lineage before the router is involved
    pub rejection_escalation_limit: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            rejection_escalation_limit: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Namespace for agent ids
    pub namespace: String,
    pub pm_agent: String,
    pub moderator: String,
    /// Root of the file store
    pub state_dir: PathBuf,
    pub debate: DebateConfig,
    pub escalation: EscalationConfig,
    pub gates: GateConfig,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            namespace: "council".to_string(),
            pm_agent: "pm".to_string(),
            moderator: "moderator".to_string(),
            state_dir: PathBuf::from(".council"),
            debate: DebateConfig::default(),
            escalation: EscalationConfig::default(),
            gates: GateConfig::default(),
        }
    }
}

impl CoordinationConfig {
    /// Parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Optional file, then environment overrides, then validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `COUNCIL_*` overrides from `lookup`. Unparsable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ns) = lookup("COUNCIL_NAMESPACE") {
            self.namespace = ns;
        }
        if let Some(pm) = lookup("COUNCIL_PM_AGENT") {
            self.pm_agent = pm;
        }
        if let Some(moderator) = lookup("COUNCIL_MODERATOR") {
            self.moderator = moderator;
        }
        if let Some(dir) = lookup("COUNCIL_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(n) = parse_override(&lookup, "COUNCIL_MAX_ROUNDS") {
            self.debate.max_rounds = n;
        }
        if let Some(n) = parse_override(&lookup, "COUNCIL_USER_THRESHOLD") {
            self.escalation.user_threshold = n;
        }
        if let Some(n) = parse_override(&lookup, "COUNCIL_REJECTION_LIMIT") {
            self.gates.rejection_escalation_limit = n;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() || self.namespace.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "namespace '{}' must be non-empty and contain no ':'",
                self.namespace
            )));
        }
        for name in [&self.pm_agent, &self.moderator]
            .into_iter()
            .chain(self.escalation.routes.values())
        {
            self.agent(name)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.debate.max_rounds == 0 {
            return Err(ConfigError::Invalid(
                "debate.max_rounds must be at least 1".to_string(),
            ));
        }
        if self.escalation.user_threshold == 0 {
            return Err(ConfigError::Invalid(
                "escalation.user_threshold must be at least 1".to_string(),
            ));
        }
        if self.gates.rejection_escalation_limit == 0 {
            return Err(ConfigError::Invalid(
                "gates.rejection_escalation_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve an agent name: `namespace:name` is parsed as-is, a bare name
    /// is placed in the configured namespace. Empty parts are refused.
    pub fn agent(&self, name: &str) -> Result<AgentId, ParseAgentIdError> {
        if name.contains(':') {
            name.parse()
        } else {
            AgentId::try_new(self.namespace.clone(), name)
        }
    }

    pub fn pm_agent_id(&self) -> Result<AgentId, ParseAgentIdError> {
        self.agent(&self.pm_agent)
    }

    pub fn moderator_id(&self) -> Result<AgentId, ParseAgentIdError> {
        self.agent(&self.moderator)
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable config override");
            None
        }
    }
}
