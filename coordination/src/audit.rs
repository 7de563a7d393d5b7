//! Audit sinks
//!
//! The coordinator reports every material state change through
//! [`AuditSink`]. Calls are fire-and-forget: sinks cannot fail the operation
//! that produced the event and nothing reads their results.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::agent::AgentId;
use crate::orchestration::Decision;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    OrchestrationCreated,
    PhaseTransition,
    OrchestrationFailed,
    GateOpened,
    GateApproved,
    GateRejected,
    GateSkipped,
    GateContested,
    DebateOpened,
    DebateMessage,
    ConcernRaised,
    ConcernResolved,
    DebateRoundAdvanced,
    DebateResolved,
    DebateAbandoned,
    EscalationOpened,
    EscalationResponded,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrchestrationCreated => "orchestration_created",
            Self::PhaseTransition => "phase_transition",
            Self::OrchestrationFailed => "orchestration_failed",
            Self::GateOpened => "gate_opened",
            Self::GateApproved => "gate_approved",
            Self::GateRejected => "gate_rejected",
            Self::GateSkipped => "gate_skipped",
            Self::GateContested => "gate_contested",
            Self::DebateOpened => "debate_opened",
            Self::DebateMessage => "debate_message",
            Self::ConcernRaised => "concern_raised",
            Self::ConcernResolved => "concern_resolved",
            Self::DebateRoundAdvanced => "debate_round_advanced",
            Self::DebateResolved => "debate_resolved",
            Self::DebateAbandoned => "debate_abandoned",
            Self::EscalationOpened => "escalation_opened",
            Self::EscalationResponded => "escalation_responded",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    /// Id of the orchestration, debate or thread that changed
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<AgentId>,
    pub summary: String,
    pub at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, subject_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            actor: None,
            summary: summary.into(),
            at: Utc::now(),
        }
    }

    pub fn by(mut self, actor: AgentId) -> Self {
        self.actor = Some(actor);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub orchestration_id: String,
    pub decision: Decision,
}

/// Everything a sink can receive, for fan-out transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Activity(ActivityEvent),
    Decision(DecisionEvent),
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Activity(e) => e.kind.as_str(),
            Self::Decision(_) => "decision_recorded",
        }
    }
}

/// Append-only audit collaborator.
pub trait AuditSink: Send + Sync {
    fn log_activity(&self, event: &ActivityEvent);
    fn log_decision(&self, event: &DecisionEvent);
}

/// Shared reference to an audit sink
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// Emits audit events as structured `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_activity(&self, event: &ActivityEvent) {
        match &event.actor {
            Some(actor) => info!(
                kind = %event.kind,
                subject = %event.subject_id,
                actor = %actor,
                "{}",
                event.summary
            ),
            None => info!(kind = %event.kind, subject = %event.subject_id, "{}", event.summary),
        }
    }

    fn log_decision(&self, event: &DecisionEvent) {
        let d = &event.decision;
        info!(
            orchestration = %event.orchestration_id,
            decision = %d.id,
            phase = %d.phase,
            topic = %d.topic,
            chosen = %d.chosen,
            made_by = %d.made_by,
            consensus = d.consensus,
            "Decision recorded"
        );
    }
}

/// Broadcasts audit events to any number of async subscribers.
pub struct AuditBus {
    sender: broadcast::Sender<AuditEvent>,
}

impl AuditBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn publish(&self, event: AuditEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Audit event published"),
            // No receivers is fine
            Err(_) => debug!(event_type, "Audit event published (no receivers)"),
        }
    }
}

impl Default for AuditBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditBus {
    fn log_activity(&self, event: &ActivityEvent) {
        self.publish(AuditEvent::Activity(event.clone()));
    }

    fn log_decision(&self, event: &DecisionEvent) {
        self.publish(AuditEvent::Decision(event.clone()));
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn activity_kinds(&self) -> Vec<ActivityKind> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::Activity(a) => Some(a.kind),
                AuditEvent::Decision(_) => None,
            })
            .collect()
    }

    pub fn decisions(&self) -> Vec<DecisionEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::Decision(d) => Some(d),
                AuditEvent::Activity(_) => None,
            })
            .collect()
    }

    fn push(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl AuditSink for RecordingAuditSink {
    fn log_activity(&self, event: &ActivityEvent) {
        self.push(AuditEvent::Activity(event.clone()));
    }

    fn log_decision(&self, event: &DecisionEvent) {
        self.push(AuditEvent::Decision(event.clone()));
    }
}
