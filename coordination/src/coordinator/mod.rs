//! Coordinator — by-id operations over persisted aggregates
//!
//! Every mutating call follows the same path:
//!
//! ```text
//! load(id) → integrity check → mutate in memory → save(expected version) → audit
//! ```
//!
//! A failed mutation is never saved, so the stored aggregate is unchanged.
//! A concurrent writer that saved in between makes the save fail with a
//! version conflict instead of losing its update.

mod debate;
mod escalation;
mod orchestration;

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::agent::{DefaultTeam, TeamResolver};
use crate::audit::{ActivityEvent, DecisionEvent, SharedAuditSink, TracingAuditSink};
use crate::config::CoordinationConfig;
use crate::debate::DebateRoom;
use crate::error::{CoordinationError, CoordinationResult, EntityKind};
use crate::escalation::{EscalationRouter, EscalationThread};
use crate::integrity::{self, IntegrityStatus};
use crate::orchestration::OrchestrationState;
use crate::store::{self, Expected, RecordKey, SharedStateStore, StoreError, Versioned};

pub use orchestration::{GateRejection, GateSettlement, GateVerdict};

/// A persisted aggregate.
trait Aggregate: Serialize + DeserializeOwned {
    const ENTITY: EntityKind;

    fn key(id: &str) -> RecordKey;
    fn check(&self) -> IntegrityStatus;
}

impl Aggregate for OrchestrationState {
    const ENTITY: EntityKind = EntityKind::Orchestration;

    fn key(id: &str) -> RecordKey {
        RecordKey::orchestration(id)
    }

    fn check(&self) -> IntegrityStatus {
        integrity::validate_orchestration(self)
    }
}

impl Aggregate for DebateRoom {
    const ENTITY: EntityKind = EntityKind::Debate;

    fn key(id: &str) -> RecordKey {
        RecordKey::debate(id)
    }

    fn check(&self) -> IntegrityStatus {
        integrity::validate_debate(self)
    }
}

impl Aggregate for EscalationThread {
    const ENTITY: EntityKind = EntityKind::EscalationThread;

    fn key(id: &str) -> RecordKey {
        RecordKey::thread(id)
    }

    fn check(&self) -> IntegrityStatus {
        integrity::validate_thread(self)
    }
}

/// Entry point for all coordination operations.
///
/// Collaborators are injected once at construction; there is no global state.
pub struct Coordinator {
    store: SharedStateStore,
    audit: SharedAuditSink,
    team: Arc<dyn TeamResolver>,
    router: EscalationRouter,
    config: CoordinationConfig,
}

impl Coordinator {
    pub fn new(
        store: SharedStateStore,
        audit: SharedAuditSink,
        team: Arc<dyn TeamResolver>,
        config: CoordinationConfig,
    ) -> Self {
        let router = EscalationRouter::from_config(&config);
        Self {
            store,
            audit,
            team,
            router,
            config,
        }
    }

    /// Default team table and `tracing` audit output.
    pub fn with_defaults(store: SharedStateStore, config: CoordinationConfig) -> Self {
        let team = Arc::new(DefaultTeam::new(config.namespace.clone()));
        Self::new(store, Arc::new(TracingAuditSink), team, config)
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn router(&self) -> &EscalationRouter {
        &self.router
    }

    // =========================================================================
    // Generic persistence
    // =========================================================================

    fn load<A: Aggregate>(&self, id: &str) -> CoordinationResult<Versioned<A>> {
        store::load::<A>(self.store.as_ref(), &A::key(id))?
            .ok_or_else(|| CoordinationError::not_found(A::ENTITY, id))
    }

    fn get<A: Aggregate>(&self, id: &str) -> CoordinationResult<A> {
        Ok(self.load::<A>(id)?.value)
    }

    fn insert<A: Aggregate>(&self, id: &str, value: &A) -> CoordinationResult<()> {
        self.save(id, value, Expected::Absent)
    }

    /// Encode and write; a value that would not decode again is refused
    /// before it reaches the store.
    fn save<A: Aggregate>(
        &self,
        id: &str,
        value: &A,
        expected: Expected,
    ) -> CoordinationResult<()> {
        let record =
            serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Err(e) = serde_json::from_value::<A>(record.clone()) {
            return Err(CoordinationError::validation(format!(
                "{} {} would not reload: {}",
                A::ENTITY,
                id,
                e
            )));
        }
        self.store.write(&A::key(id), record, expected)?;
        Ok(())
    }

    /// Load, check, mutate with `f`, save at the version read.
    fn update<A, R, F>(&self, id: &str, f: F) -> CoordinationResult<(A, R)>
    where
        A: Aggregate,
        F: FnOnce(&mut A) -> CoordinationResult<R>,
    {
        let Versioned { version, mut value } = self.load::<A>(id)?;
        self.ensure_intact(&value, id)?;
        let out = f(&mut value)?;
        self.save(id, &value, Expected::Version(version))?;
        Ok((value, out))
    }

    fn ensure_intact<A: Aggregate>(&self, value: &A, id: &str) -> CoordinationResult<()> {
        match value.check() {
            IntegrityStatus::Valid => Ok(()),
            IntegrityStatus::Recoverable { warnings } => {
                warn!(kind = %A::ENTITY, id, ?warnings, "Stored record has minor inconsistencies");
                Ok(())
            }
            IntegrityStatus::Corrupted { errors } => Err(CoordinationError::validation(format!(
                "{} {} failed integrity check: {}",
                A::ENTITY,
                id,
                errors.join("; ")
            ))),
        }
    }

    // =========================================================================
    // Audit
    // =========================================================================

    fn activity(&self, event: ActivityEvent) {
        self.audit.log_activity(&event);
    }

    fn decision(&self, event: DecisionEvent) {
        self.audit.log_decision(&event);
    }
}
