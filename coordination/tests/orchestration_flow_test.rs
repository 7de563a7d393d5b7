//! Orchestration lifecycle through the coordinator: phase walks, gates,
//! rejection lineage, ledger and the active-orchestration pointer.

use std::sync::Arc;

use council_coordination::audit::ActivityKind;
use council_coordination::store::{self, Expected, RecordKey, RecordKind};
use council_coordination::{
    AgentId, CapabilityProfile, CoordinationConfig, CoordinationError, Coordinator, DecisionDraft,
    DefaultTeam, EscalationKind, GateStatus, MemoryStore, OrchestrationState, Phase,
    RecordingAuditSink, SharedStateStore, StateStore, StoreError,
};

fn agent(name: &str) -> AgentId {
    AgentId::new("council", name)
}

fn council() -> (Coordinator, Arc<RecordingAuditSink>, SharedStateStore) {
    council_with(CoordinationConfig::default())
}

fn council_with(config: CoordinationConfig) -> (Coordinator, Arc<RecordingAuditSink>, SharedStateStore) {
    let store = MemoryStore::new().shared();
    let sink = Arc::new(RecordingAuditSink::new());
    let team = Arc::new(DefaultTeam::new(config.namespace.clone()));
    let coordinator = Coordinator::new(store.clone(), sink.clone(), team, config);
    (coordinator, sink, store)
}

fn walk(council: &Coordinator, id: &str, phases: &[Phase]) {
    for phase in phases {
        council.transition_phase(id, *phase).unwrap();
    }
}

// ── Phase table ────────────────────────────────────────────────────

#[test]
fn test_end_to_end_gate_lineage() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();
    assert_eq!(state.phase, Phase::Initialized);

    council.transition_phase(&state.id, Phase::Analyzing).unwrap();
    let err = council
        .transition_phase(&state.id, Phase::Executing)
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert_eq!(
        council.get_orchestration(&state.id).unwrap().phase,
        Phase::Analyzing
    );

    let first = council
        .create_gate(&state.id, Phase::Designing, "Design v1", agent("architect"))
        .unwrap();
    let rejected = council
        .reject_gate(&state.id, &first.id, "Missing failure modes", agent("architect"))
        .unwrap();
    assert_eq!(rejected.revision_count, 1);

    let second = council
        .create_gate(&state.id, Phase::Designing, "Design v2", agent("architect"))
        .unwrap();
    assert_eq!(second.revision_count, 1);
    let rejected = council
        .reject_gate(&state.id, &second.id, "Still vague", agent("architect"))
        .unwrap();
    assert_eq!(rejected.revision_count, 2);
    assert!(rejected.escalation.is_none());
    assert_eq!(rejected.state.phase, Phase::Analyzing);

    let third = council
        .create_gate(&state.id, Phase::Designing, "Design v3", agent("architect"))
        .unwrap();
    let approved = council
        .approve_gate(&state.id, &third.id, agent("architect"))
        .unwrap();
    assert_eq!(approved.phase, Phase::Designing);
    assert!(approved.current_gate.is_none());
    assert_eq!(approved.gates.len(), 3);
    assert_eq!(approved.gates[2].status, GateStatus::Approved);
    assert_eq!(approved.gates[2].resolved_by, Some(agent("architect")));
}

#[test]
fn test_illegal_transition_is_not_persisted() {
    let (council, sink, _) = council();
    let state = council.create("T", "s1").unwrap();
    let before = council.get_orchestration(&state.id).unwrap();

    assert!(council
        .transition_phase(&state.id, Phase::Completed)
        .is_err());

    let after = council.get_orchestration(&state.id).unwrap();
    assert_eq!(before, after);
    assert!(!sink.activity_kinds().contains(&ActivityKind::PhaseTransition));
}

#[test]
fn test_participants_accumulate_across_phases() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing, Phase::Planning]);

    let state = council.get_orchestration(&state.id).unwrap();
    assert!(state.participants.contains(&agent("pm")));
    assert!(state.participants.contains(&agent("architect")));
    assert!(!state.participants.contains(&agent("developer")));
}

#[test]
fn test_pause_and_resume() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing]);

    council.pause(&state.id).unwrap();
    let err = council.resume(&state.id, Phase::Verifying).unwrap_err();
    assert!(err.is_invalid_transition());

    let resumed = council.resume(&state.id, Phase::Planning).unwrap();
    assert_eq!(resumed.phase, Phase::Planning);

    assert!(matches!(
        council.resume(&state.id, Phase::Executing),
        Err(CoordinationError::Validation { .. })
    ));
}

#[test]
fn test_fail_from_any_live_phase() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();

    let failed = council.fail(&state.id, "requirements withdrawn").unwrap();
    assert_eq!(failed.phase, Phase::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("requirements withdrawn"));
    assert!(council.fail(&state.id, "again").unwrap_err().is_invalid_transition());
}

#[test]
fn test_failing_closes_the_open_gate() {
    let (council, _, records) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing, Phase::Planning, Phase::ReviewingPlan]);
    let gate = council
        .create_gate(&state.id, Phase::Executing, "Plan v1", agent("pm"))
        .unwrap();

    let failed = council.fail(&state.id, "requirements withdrawn").unwrap();
    assert!(failed.current_gate().is_none());
    assert_eq!(failed.gates[0].status, GateStatus::Skipped);

    let mut config = CoordinationConfig::default();
    config.gates.rejection_escalation_limit = 1;
    let strict = Coordinator::with_defaults(records.clone(), config);
    assert!(matches!(
        strict.reject_gate(&state.id, &gate.id, "late", agent("pm")),
        Err(CoordinationError::GateNotPending {
            status: GateStatus::Skipped,
            ..
        })
    ));
    assert!(records.list(RecordKind::EscalationThread).unwrap().is_empty());
    assert_eq!(council.get_orchestration(&state.id).unwrap(), failed);
}

// ── Active pointer ─────────────────────────────────────────────────

#[test]
fn test_active_pointer_clears_on_completion() {
    let (council, sink, _) = council();
    let state = council.create("T", "s1").unwrap();
    assert_eq!(
        council.active_orchestration("s1").unwrap().map(|s| s.id),
        Some(state.id.clone())
    );

    walk(
        &council,
        &state.id,
        &[
            Phase::Analyzing,
            Phase::Planning,
            Phase::ReviewingPlan,
            Phase::Executing,
            Phase::Verifying,
            Phase::Completed,
        ],
    );

    assert!(council.active_orchestration("s1").unwrap().is_none());
    let done = council.get_orchestration(&state.id).unwrap();
    assert!(done.completed_at.is_some());
    assert_eq!(
        sink.activity_kinds()
            .iter()
            .filter(|k| **k == ActivityKind::PhaseTransition)
            .count(),
        6
    );
}

#[test]
fn test_new_orchestration_replaces_active_pointer() {
    let (council, _, _) = council();
    let first = council.create("T1", "s1").unwrap();
    let second = council.create("T2", "s1").unwrap();

    assert_eq!(
        council.active_orchestration("s1").unwrap().map(|s| s.id),
        Some(second.id)
    );
    // finishing the replaced one leaves the newer pointer alone
    council.fail(&first.id, "superseded").unwrap();
    assert!(council.active_orchestration("s1").unwrap().is_some());
}

#[test]
fn test_missing_orchestration_is_not_found() {
    let (council, _, _) = council();
    let err = council.get_orchestration("nope").unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_storage_failure());
    assert!(council.active_orchestration("unknown-session").unwrap().is_none());
}

// ── Gates ──────────────────────────────────────────────────────────

#[test]
fn test_gate_policy_follows_capabilities() {
    let (council, _, _) = council();
    let plain = council.create("T", "s1").unwrap();
    let reviewed = council
        .create_with_capabilities(
            "T",
            "s2",
            CapabilityProfile::default()
                .with_architecture_review()
                .with_security_review(),
        )
        .unwrap();

    assert_eq!(council.required_gate(&plain.id, Phase::Planning).unwrap(), None);
    assert_eq!(
        council.required_gate(&reviewed.id, Phase::Planning).unwrap(),
        Some(agent("architect"))
    );
    assert_eq!(
        council.required_gate(&plain.id, Phase::Executing).unwrap(),
        Some(agent("pm"))
    );
    assert_eq!(
        council.required_gate(&plain.id, Phase::Completed).unwrap(),
        Some(agent("qa"))
    );
    assert_eq!(
        council.required_gate(&reviewed.id, Phase::Completed).unwrap(),
        Some(agent("security-reviewer"))
    );
    assert_eq!(council.required_gate(&plain.id, Phase::Designing).unwrap(), None);
}

#[test]
fn test_only_one_gate_open_at_a_time() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing]);

    let gate = council
        .create_gate(&state.id, Phase::Designing, "Design", agent("architect"))
        .unwrap();
    assert!(matches!(
        council.create_gate(&state.id, Phase::Planning, "Plan", agent("pm")),
        Err(CoordinationError::GateAlreadyOpen { gate_id }) if gate_id == gate.id
    ));
}

#[test]
fn test_gate_target_must_be_reachable() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();
    let err = council
        .create_gate(&state.id, Phase::Executing, "Skip ahead", agent("pm"))
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert!(council.get_orchestration(&state.id).unwrap().gates.is_empty());
}

#[test]
fn test_closed_gate_cannot_be_reused() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing]);
    let gate = council
        .create_gate(&state.id, Phase::Designing, "Design", agent("architect"))
        .unwrap();
    council
        .reject_gate(&state.id, &gate.id, "no", agent("architect"))
        .unwrap();

    assert!(matches!(
        council.approve_gate(&state.id, &gate.id, agent("architect")),
        Err(CoordinationError::GateNotPending {
            status: GateStatus::Rejected,
            ..
        })
    ));
    assert!(council
        .skip_gate(&state.id, "unknown-gate", agent("pm"))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_skip_gate_takes_transition() {
    let (council, sink, _) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing, Phase::Planning, Phase::ReviewingPlan]);
    let gate = council
        .create_gate(&state.id, Phase::Executing, "Plan", agent("pm"))
        .unwrap();

    let state = council.skip_gate(&state.id, &gate.id, agent("pm")).unwrap();
    assert_eq!(state.phase, Phase::Executing);
    assert_eq!(state.gates[0].status, GateStatus::Skipped);
    assert!(sink.activity_kinds().contains(&ActivityKind::GateSkipped));
}

#[test]
fn test_rejection_limit_opens_one_escalation() {
    let mut config = CoordinationConfig::default();
    config.gates.rejection_escalation_limit = 3;
    let (council, _, _) = council_with(config);
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing, Phase::Planning, Phase::ReviewingPlan]);

    let mut escalations = Vec::new();
    for round in 1..=4u32 {
        let gate = council
            .create_gate(&state.id, Phase::Executing, &format!("Plan v{round}"), agent("pm"))
            .unwrap();
        let rejection = council
            .reject_gate(&state.id, &gate.id, "Not ready", agent("pm"))
            .unwrap();
        assert_eq!(rejection.revision_count, round);
        escalations.extend(rejection.escalation);
    }

    assert_eq!(escalations.len(), 1);
    let thread = &escalations[0];
    assert_eq!(thread.request.kind, EscalationKind::RepeatedRejection);
    assert_eq!(thread.assigned_to, agent("pm"));
    assert_eq!(thread.request.subject.as_deref(), Some(state.id.as_str()));
    assert!(thread.request.message.contains("rejected 3 times"));
    assert!(council.get_thread(&thread.id).unwrap().is_open());
}

#[test]
fn test_lineage_resets_after_approval() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing]);

    let gate = council
        .create_gate(&state.id, Phase::Designing, "v1", agent("architect"))
        .unwrap();
    council
        .reject_gate(&state.id, &gate.id, "no", agent("architect"))
        .unwrap();
    let gate = council
        .create_gate(&state.id, Phase::Designing, "v2", agent("architect"))
        .unwrap();
    council
        .approve_gate(&state.id, &gate.id, agent("architect"))
        .unwrap();

    walk(&council, &state.id, &[Phase::ReviewingDesign]);

    // back to designing after review: the approved gate ended the lineage
    let gate = council
        .create_gate(&state.id, Phase::Designing, "v3", agent("reviewer"))
        .unwrap();
    assert_eq!(gate.revision_count, 0);
}

// ── Ledger ─────────────────────────────────────────────────────────

#[test]
fn test_decisions_are_recorded_in_order() {
    let (council, sink, _) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing]);

    let first = council
        .record_decision(
            &state.id,
            DecisionDraft::new("storage", "sqlite", "single node", agent("architect"))
                .with_options(["sqlite", "postgres"]),
        )
        .unwrap();
    assert_eq!(first.phase, Phase::Analyzing);
    walk(&council, &state.id, &[Phase::Designing]);
    council
        .record_decision(
            &state.id,
            DecisionDraft::new("storage", "postgres", "replication needed", agent("architect")),
        )
        .unwrap();

    let state = council.get_orchestration(&state.id).unwrap();
    assert_eq!(state.decisions.len(), 2);
    assert_eq!(state.decisions[0].id, first.id);
    assert_eq!(state.latest_decision("storage").map(|d| d.chosen.as_str()), Some("postgres"));
    assert_eq!(sink.decisions().len(), 2);

    assert!(matches!(
        council.record_decision(&state.id, DecisionDraft::new(" ", "x", "y", agent("pm"))),
        Err(CoordinationError::Validation { .. })
    ));
}

#[test]
fn test_agent_id_that_cannot_reload_is_refused() {
    let (council, _, _) = council();
    let state = council.create("T", "s1").unwrap();
    walk(&council, &state.id, &[Phase::Analyzing]);
    let gate = council
        .create_gate(&state.id, Phase::Designing, "Design v1", agent("architect"))
        .unwrap();

    for bad in [
        AgentId::new("council", ""),
        AgentId::new("", "architect"),
        AgentId::new("a:b", "architect"),
    ] {
        let err = council.approve_gate(&state.id, &gate.id, bad).unwrap_err();
        assert!(matches!(err, CoordinationError::Validation { .. }), "{err}");
    }
    assert!(council.config().agent("").is_err());

    // nothing was persisted, so the orchestration stays usable
    let stored = council.get_orchestration(&state.id).unwrap();
    assert_eq!(stored.phase, Phase::Analyzing);
    assert!(stored.gates[0].is_pending());
    council
        .record_decision(
            &state.id,
            DecisionDraft::new("cache", "redis", "Shared across pods", agent("architect")),
        )
        .unwrap();
    let approved = council
        .approve_gate(&state.id, &gate.id, agent("architect"))
        .unwrap();
    assert_eq!(approved.phase, Phase::Designing);
}

// ── Concurrency ────────────────────────────────────────────────────

#[test]
fn test_stale_write_is_a_version_conflict() {
    let (council, _, records) = council();
    let state = council.create("T", "s1").unwrap();
    let key = RecordKey::orchestration(&state.id);

    let a = store::load::<OrchestrationState>(records.as_ref(), &key)
        .unwrap()
        .unwrap();
    let b = store::load::<OrchestrationState>(records.as_ref(), &key)
        .unwrap()
        .unwrap();

    let mut first = a.value.clone();
    first.transition(Phase::Analyzing, vec![]).unwrap();
    store::save(records.as_ref(), &key, &first, Expected::Version(a.version)).unwrap();

    let mut second = b.value.clone();
    second.fail("stale").unwrap();
    let err = store::save(records.as_ref(), &key, &second, Expected::Version(b.version)).unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));

    // the coordinator surfaces conflicts as storage failures, not missing data
    let wrapped: CoordinationError = err.into();
    assert!(wrapped.is_storage_failure());
    assert_eq!(
        council.get_orchestration(&state.id).unwrap().phase,
        Phase::Analyzing
    );
}

#[test]
fn test_concurrent_coordinators_share_store() {
    let (council, _, store) = council();
    let other = Coordinator::with_defaults(store, CoordinationConfig::default());
    let state = council.create("T", "s1").unwrap();

    other.transition_phase(&state.id, Phase::Analyzing).unwrap();
    council.transition_phase(&state.id, Phase::Designing).unwrap();
    assert_eq!(
        other.get_orchestration(&state.id).unwrap().phase,
        Phase::Designing
    );
}
