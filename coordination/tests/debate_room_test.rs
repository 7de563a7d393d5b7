//! Debate rooms through the coordinator: rounds, concerns, resolution and
//! settling contested gates.

use std::sync::Arc;

use council_coordination::audit::ActivityKind;
use council_coordination::store::RecordKind;
use council_coordination::{
    AgentId, ConcernDraft, ConcernPriority, CoordinationConfig, CoordinationError, Coordinator,
    DebateStatus, DefaultTeam, EntityKind, EscalationKind, GateStatus, GateVerdict, MemoryStore,
    MessageDraft, MessageKind, Phase, RecordingAuditSink, ResolutionDraft, SharedStateStore,
    StateStore,
};

fn agent(name: &str) -> AgentId {
    AgentId::new("council", name)
}

fn council() -> (Coordinator, Arc<RecordingAuditSink>, SharedStateStore) {
    let config = CoordinationConfig::default();
    let store = MemoryStore::new().shared();
    let sink = Arc::new(RecordingAuditSink::new());
    let team = Arc::new(DefaultTeam::new(config.namespace.clone()));
    (Coordinator::new(store.clone(), sink.clone(), team, config), sink, store)
}

fn open_debate(council: &Coordinator, max_rounds: Option<u32>) -> String {
    council
        .create_debate(
            "Queue backend",
            vec![agent("architect"), agent("developer"), agent("architect")],
            None,
            Some("Throughput target 5k msg/s".to_string()),
            max_rounds,
        )
        .unwrap()
        .id
}

/// Orchestration parked in `reviewing_plan` with a pending gate to `executing`.
fn gated_orchestration(council: &Coordinator) -> (String, String) {
    let state = council.create("Ship billing export", "s1").unwrap();
    for phase in [Phase::Analyzing, Phase::Planning, Phase::ReviewingPlan] {
        council.transition_phase(&state.id, phase).unwrap();
    }
    let gate = council
        .create_gate(&state.id, Phase::Executing, "Plan: nightly batch job", agent("pm"))
        .unwrap();
    (state.id, gate.id)
}

// ── Rounds ─────────────────────────────────────────────────────────

#[test]
fn test_new_debate_defaults() {
    let (council, sink, _) = council();
    let id = open_debate(&council, None);
    let room = council.get_debate(&id).unwrap();

    assert_eq!(room.round, 1);
    assert_eq!(room.max_rounds, 3);
    assert_eq!(room.moderator, agent("moderator"));
    assert_eq!(room.participants, vec![agent("architect"), agent("developer")]);
    assert_eq!(room.status, DebateStatus::Active);
    assert_eq!(sink.activity_kinds(), vec![ActivityKind::DebateOpened]);
}

#[test]
fn test_round_budget_escalates_debate() {
    let (council, _, _) = council();
    let id = open_debate(&council, Some(2));

    let room = council.advance_round(&id).unwrap();
    assert_eq!(room.round, 2);
    assert_eq!(room.status, DebateStatus::Active);

    let room = council.advance_round(&id).unwrap();
    assert_eq!(room.round, 3);
    assert_eq!(room.status, DebateStatus::Escalated);

    assert!(matches!(
        council.add_proposal(&id, agent("developer"), "Kafka"),
        Err(CoordinationError::DebateNotActive {
            status: DebateStatus::Escalated,
            ..
        })
    ));
    assert!(matches!(
        council.resolve_debate(
            &id,
            ResolutionDraft::new("Kafka", "late", agent("moderator"), false)
        ),
        Err(CoordinationError::DebateNotActive { .. })
    ));
    assert!(matches!(
        council.advance_round(&id),
        Err(CoordinationError::DebateNotActive { .. })
    ));
}

#[test]
fn test_zero_round_budget_is_rejected() {
    let (council, _, _) = council();
    assert!(matches!(
        council.create_debate("Topic", vec![agent("pm")], None, None, Some(0)),
        Err(CoordinationError::Validation { .. })
    ));
}

// ── Messages and concerns ──────────────────────────────────────────

#[test]
fn test_messages_thread_and_late_joiners() {
    let (council, _, _) = council();
    let id = open_debate(&council, None);

    let proposal = council
        .add_proposal(&id, agent("architect"), "Use NATS JetStream")
        .unwrap();
    let counter = council
        .add_counter(&id, agent("developer"), "Kafka has better tooling", Some(&proposal.id))
        .unwrap();
    assert_eq!(counter.references, vec![proposal.id.clone()]);

    council
        .add_message(
            &id,
            MessageDraft::new(agent("qa"), MessageKind::Question, "How do we load test?")
                .replying_to(counter.id.as_str()),
        )
        .unwrap();

    let room = council.get_debate(&id).unwrap();
    assert_eq!(room.messages.len(), 3);
    assert!(room.participants.contains(&agent("qa")));
}

#[test]
fn test_blockers_track_unresolved_concerns() {
    let (council, _, _) = council();
    let id = open_debate(&council, None);

    let minor = council
        .raise_concern(
            &id,
            ConcernDraft::new(agent("qa"), "No load test plan").with_priority(ConcernPriority::Low),
        )
        .unwrap();
    let blocker = council
        .raise_concern(
            &id,
            ConcernDraft::new(agent("developer"), "Ops cannot run Kafka")
                .with_priority(ConcernPriority::Blocker)
                .affecting(["deployment"])
                .with_options(["managed service", "NATS"]),
        )
        .unwrap();

    assert_eq!(council.active_concerns(&id).unwrap().len(), 2);
    let blockers = council.blockers(&id).unwrap();
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].id, blocker.id);

    let resolved = council
        .resolve_concern(&id, &blocker.id, "Use the managed offering", agent("pm"))
        .unwrap();
    assert_eq!(resolved.resolved_by, Some(agent("pm")));
    assert!(council.blockers(&id).unwrap().is_empty());
    assert_eq!(council.active_concerns(&id).unwrap()[0].id, minor.id);

    assert!(matches!(
        council.resolve_concern(&id, &blocker.id, "again", agent("pm")),
        Err(CoordinationError::AlreadyResolved {
            kind: EntityKind::Concern,
            ..
        })
    ));
    assert!(council
        .resolve_concern(&id, "missing", "x", agent("pm"))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_concern_mirrored_as_message() {
    let (council, _, _) = council();
    let id = open_debate(&council, None);
    let concern = council
        .raise_concern(&id, ConcernDraft::new(agent("reviewer"), "Unbounded retries"))
        .unwrap();

    let room = council.get_debate(&id).unwrap();
    let mirrored = room
        .messages
        .iter()
        .find(|m| m.kind == MessageKind::Concern)
        .unwrap();
    assert!(mirrored.tags.contains(&format!("concern:{}", concern.id)));
    assert_eq!(mirrored.priority, Some(ConcernPriority::Medium));
}

// ── Resolution ─────────────────────────────────────────────────────

#[test]
fn test_resolution_is_final() {
    let (council, sink, _) = council();
    let id = open_debate(&council, None);
    let proposal = council
        .add_proposal(&id, agent("architect"), "Use NATS JetStream")
        .unwrap();

    let room = council
        .resolve_debate(
            &id,
            ResolutionDraft::new("NATS", "Lower ops burden", agent("moderator"), true)
                .winning(proposal.id.as_str())
                .with_dissenters([agent("developer")]),
        )
        .unwrap();
    assert_eq!(room.status, DebateStatus::Consensus);
    let resolution = room.resolution.clone().unwrap();
    assert_eq!(resolution.winning_proposal_id, Some(proposal.id));
    assert_eq!(resolution.dissenters, vec![agent("developer")]);
    assert_eq!(room.messages.last().unwrap().kind, MessageKind::Decision);

    assert!(matches!(
        council.resolve_debate(&id, ResolutionDraft::new("Kafka", "x", agent("pm"), false)),
        Err(CoordinationError::AlreadyResolved {
            kind: EntityKind::Debate,
            ..
        })
    ));
    assert!(sink.activity_kinds().contains(&ActivityKind::DebateResolved));
}

#[test]
fn test_winning_proposal_must_be_a_proposal() {
    let (council, _, _) = council();
    let id = open_debate(&council, None);
    let question = council
        .add_message(
            &id,
            MessageDraft::new(agent("qa"), MessageKind::Question, "What about cost?"),
        )
        .unwrap();

    assert!(matches!(
        council.resolve_debate(
            &id,
            ResolutionDraft::new("NATS", "x", agent("moderator"), false).winning(question.id.as_str())
        ),
        Err(CoordinationError::Validation { .. })
    ));
    assert_eq!(council.get_debate(&id).unwrap().status, DebateStatus::Active);
}

#[test]
fn test_abandon_closes_debate() {
    let (council, _, _) = council();
    let id = open_debate(&council, None);
    let room = council.abandon_debate(&id, "task cancelled").unwrap();
    assert_eq!(room.status, DebateStatus::Abandoned);
    assert_eq!(room.closed_reason.as_deref(), Some("task cancelled"));
    assert!(matches!(
        council.raise_concern(&id, ConcernDraft::new(agent("qa"), "late")),
        Err(CoordinationError::DebateNotActive { .. })
    ));
}

// ── Escalating concerns ────────────────────────────────────────────

#[test]
fn test_escalate_concern_by_priority() {
    let (council, _, _) = council();
    let id = open_debate(&council, None);
    let blocker = council
        .raise_concern(
            &id,
            ConcernDraft::new(agent("developer"), "License incompatible")
                .with_priority(ConcernPriority::Blocker),
        )
        .unwrap();
    let minor = council
        .raise_concern(&id, ConcernDraft::new(agent("qa"), "Naming is unclear"))
        .unwrap();

    let thread = council
        .escalate_concern(&id, &blocker.id, agent("developer"))
        .unwrap();
    assert_eq!(thread.request.kind, EscalationKind::Blocker);
    assert_eq!(thread.assigned_to, agent("moderator"));
    assert_eq!(thread.request.subject.as_deref(), Some(id.as_str()));
    assert!(thread
        .request
        .context
        .as_deref()
        .unwrap()
        .contains("Queue backend"));

    let thread = council
        .escalate_concern(&id, &minor.id, agent("qa"))
        .unwrap();
    assert_eq!(thread.request.kind, EscalationKind::ContestedConcern);

    council
        .resolve_concern(&id, &minor.id, "renamed", agent("pm"))
        .unwrap();
    assert!(matches!(
        council.escalate_concern(&id, &minor.id, agent("qa")),
        Err(CoordinationError::AlreadyResolved { .. })
    ));
}

// ── Contested gates ────────────────────────────────────────────────

#[test]
fn test_contested_gate_settles_after_debate() {
    let (council, sink, _) = council();
    let (orch, gate) = gated_orchestration(&council);

    let room = council
        .contest_gate(&orch, &gate, vec![agent("developer"), agent("reviewer")], None)
        .unwrap();
    assert_eq!(room.participants[0], agent("pm"));
    assert_eq!(room.topic, "Plan: nightly batch job");
    let state = council.get_orchestration(&orch).unwrap();
    assert_eq!(state.gate(&gate).unwrap().debate_id.as_deref(), Some(room.id.as_str()));

    assert!(matches!(
        council.settle_gate_from_debate(&orch, &gate, GateVerdict::Approve, agent("pm")),
        Err(CoordinationError::DebateUnresolved { .. })
    ));

    let proposal = council
        .add_proposal(&room.id, agent("developer"), "Stream instead of batch")
        .unwrap();
    let blocker = council
        .raise_concern(
            &room.id,
            ConcernDraft::new(agent("reviewer"), "No idempotency key")
                .with_priority(ConcernPriority::Blocker),
        )
        .unwrap();
    council
        .resolve_debate(
            &room.id,
            ResolutionDraft::new("Keep batch", "Simpler to operate", agent("moderator"), false)
                .winning(proposal.id.as_str()),
        )
        .unwrap();

    assert!(matches!(
        council.settle_gate_from_debate(&orch, &gate, GateVerdict::Approve, agent("pm")),
        Err(CoordinationError::BlockersOutstanding { count: 1, .. })
    ));

    // concerns can still be closed once the debate is decided
    council
        .resolve_concern(&room.id, &blocker.id, "Key added to plan", agent("reviewer"))
        .unwrap();
    assert!(council.get_debate(&room.id).unwrap().is_closable());

    let settlement = council
        .settle_gate_from_debate(&orch, &gate, GateVerdict::Approve, agent("pm"))
        .unwrap();
    assert_eq!(settlement.state.phase, Phase::Executing);
    assert_eq!(settlement.state.gate(&gate).unwrap().status, GateStatus::Approved);
    assert_eq!(settlement.decision.chosen, "Keep batch");
    assert_eq!(settlement.decision.debate_id.as_deref(), Some(room.id.as_str()));
    assert!(!settlement.decision.consensus);
    assert_eq!(settlement.decision.options, vec!["Stream instead of batch".to_string()]);
    assert!(settlement.escalation.is_none());
    assert_eq!(settlement.state.decisions.len(), 1);
    assert_eq!(sink.decisions().len(), 1);
}

#[test]
fn test_contested_gate_rejected_by_debate() {
    let (council, _, _) = council();
    let (orch, gate) = gated_orchestration(&council);
    let room = council
        .contest_gate(&orch, &gate, vec![agent("reviewer")], Some(agent("architect")))
        .unwrap();
    assert_eq!(room.moderator, agent("architect"));
    council
        .resolve_debate(
            &room.id,
            ResolutionDraft::new("Rework plan", "Missing rollback", agent("architect"), true),
        )
        .unwrap();

    let settlement = council
        .settle_gate_from_debate(&orch, &gate, GateVerdict::Reject, agent("pm"))
        .unwrap();
    let gate = settlement.state.gate(&gate).unwrap();
    assert_eq!(gate.status, GateStatus::Rejected);
    assert_eq!(gate.revision_count, 1);
    assert_eq!(gate.feedback.as_deref(), Some("Missing rollback"));
    assert_eq!(settlement.state.phase, Phase::ReviewingPlan);
}

#[test]
fn test_gate_cannot_be_contested_twice() {
    let (council, _, store) = council();
    let (orch, gate) = gated_orchestration(&council);
    council
        .contest_gate(&orch, &gate, vec![agent("reviewer")], None)
        .unwrap();

    assert!(matches!(
        council.contest_gate(&orch, &gate, vec![agent("qa")], None),
        Err(CoordinationError::Validation { .. })
    ));
    assert_eq!(store.list(RecordKind::Debate).unwrap().len(), 1);
}

#[test]
fn test_uncontested_gate_cannot_be_settled() {
    let (council, _, _) = council();
    let (orch, gate) = gated_orchestration(&council);
    assert!(matches!(
        council.settle_gate_from_debate(&orch, &gate, GateVerdict::Approve, agent("pm")),
        Err(CoordinationError::Validation { .. })
    ));
}
