//! Unit tests for the session state machine.
//!
//! # Scenarios covered
//!
//! | Scenario |
//! |----------|
//! | Quorum of three leaves `waiting` on the third distinct `readyToStart` |
//! | Start happens exactly once for every ordering of ready profiles |
//! | One record per profile per (activity, mode) under replays |
//! | Stale activity ids never mutate the context |
//! | Forward-only progress through the plan |
//! | `viewResults` is terminal and idempotent |
//! | `join`/`disconnect`/`readyToStart` outside `waiting` are no-ops |

use std::sync::Arc;

use workshop_conductor::models::action::SessionAction;
use workshop_conductor::models::activity::{ActivityMode, ActivityPlan, PlannedActivity};
use workshop_conductor::models::context::SessionContext;
use workshop_conductor::models::snapshot::{MachineState, Snapshot};
use workshop_conductor::orchestrator::machine::{transition, SessionMachine};

use ActivityMode::{Group, Individual};

fn single_activity_plan() -> Arc<ActivityPlan> {
    Arc::new(
        ActivityPlan::new(vec![PlannedActivity::new(
            "activity-1",
            vec![Individual, Group],
        )])
        .expect("plan"),
    )
}

fn two_activity_plan() -> Arc<ActivityPlan> {
    Arc::new(
        ActivityPlan::new(vec![
            PlannedActivity::new("activity-1", vec![Individual, Group]),
            PlannedActivity::new("activity-2", vec![Group]),
        ])
        .expect("plan"),
    )
}

fn join(p: &str) -> SessionAction {
    SessionAction::Join {
        profile_id: p.into(),
    }
}

fn ready_to_start(p: &str) -> SessionAction {
    SessionAction::ReadyToStart {
        profile_id: p.into(),
    }
}

fn set_value(p: &str, activity: &str, value: &str) -> SessionAction {
    SessionAction::SetValue {
        profile_id: p.into(),
        activity_id: activity.into(),
        value: value.into(),
    }
}

fn set_ready(p: &str, activity: &str) -> SessionAction {
    SessionAction::SetReady {
        profile_id: p.into(),
        activity_id: activity.into(),
    }
}

/// Apply an action, keeping the machine unchanged when it is rejected.
fn apply(machine: &SessionMachine, action: &SessionAction) -> SessionMachine {
    machine
        .step(action, 1_000)
        .unwrap_or_else(|| machine.clone())
}

fn run(machine: SessionMachine, actions: &[SessionAction]) -> SessionMachine {
    actions.iter().fold(machine, |m, a| apply(&m, a))
}

fn value(machine: &SessionMachine) -> String {
    machine.snapshot().value
}

/// All orderings of `items`.
fn permutations(items: &[&'static str]) -> Vec<Vec<&'static str>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (i, first) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, *first);
            out.push(tail);
        }
    }
    out
}

#[test]
fn quorum_of_three_scenario() {
    let machine = SessionMachine::new(single_activity_plan(), 3);
    let machine = run(
        machine,
        &[
            join("p1"),
            join("p2"),
            join("p3"),
            ready_to_start("p1"),
            ready_to_start("p2"),
        ],
    );
    assert_eq!(value(&machine), "waiting");

    let machine = apply(&machine, &ready_to_start("p3"));
    assert_eq!(value(&machine), "activity-1.individual");

    let machine = run(
        machine,
        &[set_value("p1", "activity-1", "v1"), set_ready("p1", "activity-1")],
    );
    assert_eq!(value(&machine), "activity-1.individual", "1 of 3 ready");

    let machine = run(
        machine,
        &[
            set_value("p2", "activity-1", "v2"),
            set_ready("p2", "activity-1"),
            set_value("p3", "activity-1", "v3"),
        ],
    );
    assert_eq!(value(&machine), "activity-1.individual", "p3 not ready yet");

    let machine = apply(&machine, &set_ready("p3", "activity-1"));
    assert_eq!(value(&machine), "activity-1.group");

    let records = machine.context().records("activity-1", Individual);
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.ready));
}

#[test]
fn acting_profile_readiness_need_not_preexist() {
    let plan = single_activity_plan();
    let start = MachineState::Activity(plan.first_cursor().expect("cursor"));
    let mut context = SessionContext::new(2);
    context.upsert_value("activity-1", Individual, "p1", "a");
    context.mark_ready("activity-1", Individual, "p1");
    context.upsert_value("activity-1", Individual, "p2", "b");

    let (state, next) =
        transition(&plan, start, &context, &set_ready("p2", "activity-1")).expect("advance");
    assert_eq!(state.path(&plan), "activity-1.group");
    assert!(next.records("activity-1", Individual).iter().all(|r| r.ready));
}

#[test]
fn set_ready_without_value_stores_empty_placeholder() {
    let plan = single_activity_plan();
    let start = MachineState::Activity(plan.first_cursor().expect("cursor"));
    let context = SessionContext::new(2);

    let (_, next) =
        transition(&plan, start, &context, &set_ready("p1", "activity-1")).expect("accepted");
    let records = next.records("activity-1", Individual);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, "");
    assert!(records[0].ready);
}

#[test]
fn start_happens_exactly_once_for_every_ordering() {
    for order in permutations(&["p1", "p2", "p3", "p4"]) {
        let mut machine = SessionMachine::new(single_activity_plan(), 3);
        let mut starts = 0;

        for (i, profile) in order.iter().enumerate() {
            let before = machine.state();
            machine = apply(&machine, &ready_to_start(profile));
            if before == MachineState::Waiting && machine.state() != MachineState::Waiting {
                starts += 1;
                assert_eq!(i, 2, "left waiting at the third distinct profile in {order:?}");
            }
        }
        assert_eq!(starts, 1, "ordering {order:?}");
    }
}

#[test]
fn repeated_ready_to_start_does_not_count_twice() {
    let machine = SessionMachine::new(single_activity_plan(), 2);
    let machine = run(machine, &[ready_to_start("p1"), ready_to_start("p1")]);
    assert_eq!(value(&machine), "waiting");
    assert_eq!(machine.version(), 1, "duplicate readyToStart is a no-op");
}

#[test]
fn one_record_per_profile_under_replays() {
    let machine = SessionMachine::new(single_activity_plan(), 3);
    let machine = run(
        machine,
        &[ready_to_start("p1"), ready_to_start("p2"), ready_to_start("p3")],
    );

    let replay: Vec<SessionAction> = (0..5)
        .flat_map(|i| {
            [
                set_value("p1", "activity-1", &format!("v{i}")),
                set_ready("p1", "activity-1"),
                set_value("p1", "activity-1", "final"),
            ]
        })
        .collect();
    let machine = run(machine, &replay);

    let records = machine.context().records("activity-1", Individual);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, "final");
    assert!(records[0].ready, "updating value keeps ready");
}

#[test]
fn stale_activity_id_is_a_deep_equal_noop() {
    let plan = two_activity_plan();
    let state = MachineState::Activity(plan.locate("activity-2", Group).expect("cursor"));
    let mut context = SessionContext::new(2);
    context.upsert_value("activity-2", Group, "p2", "keep");

    assert!(transition(&plan, state, &context, &set_value("p1", "activity-1", "x")).is_none());
    assert!(transition(&plan, state, &context, &set_ready("p1", "activity-1")).is_none());
    assert!(transition(&plan, state, &context, &set_value("p1", "unknown", "x")).is_none());

    let machine = SessionMachine::from_snapshot(
        Arc::clone(&plan),
        Snapshot {
            value: "activity-2.group".into(),
            version: 7,
            context: context.clone(),
        },
    )
    .expect("restore");
    let after = apply(&machine, &set_value("p1", "activity-1", "x"));
    assert_eq!(after, machine);
    assert_eq!(after.context(), &context);
}

#[test]
fn progress_is_forward_only() {
    let plan = two_activity_plan();
    let order = [
        "waiting",
        "activity-1.individual",
        "activity-1.group",
        "activity-2.group",
        "viewResults",
    ];
    let rank = |path: &str| order.iter().position(|p| *p == path).expect("known path");

    let mut machine = SessionMachine::new(plan, 1);
    let mut last = rank(&value(&machine));

    let actions = [
        ready_to_start("p1"),
        set_ready("p1", "activity-1"),
        set_value("p1", "activity-1", "late"),
        set_ready("p1", "activity-1"),
        set_ready("p1", "activity-1"),
        set_ready("p1", "activity-2"),
        ready_to_start("p1"),
        set_ready("p1", "activity-1"),
    ];
    for action in &actions {
        machine = apply(&machine, action);
        let now = rank(&value(&machine));
        assert!(now >= last, "regressed on {action:?}");
        last = now;
    }
    assert_eq!(value(&machine), "viewResults");
}

#[test]
fn view_results_is_idempotent() {
    let machine = SessionMachine::new(single_activity_plan(), 1);
    let machine = run(
        machine,
        &[
            ready_to_start("p1"),
            set_ready("p1", "activity-1"),
            set_ready("p1", "activity-1"),
        ],
    );
    assert_eq!(value(&machine), "viewResults");

    let snapshot = machine.snapshot();
    for _ in 0..3 {
        assert!(machine.step(&set_ready("p1", "activity-1"), 2_000).is_none());
    }
    assert_eq!(machine.snapshot(), snapshot);
}

#[test]
fn lobby_actions_outside_waiting_are_noops() {
    let plan = single_activity_plan();
    let state = MachineState::Activity(plan.first_cursor().expect("cursor"));
    let context = SessionContext::new(1);

    assert!(transition(&plan, state, &context, &join("p9")).is_none());
    assert!(transition(
        &plan,
        state,
        &context,
        &SessionAction::Disconnect {
            profile_id: "p1".into()
        }
    )
    .is_none());
    assert!(transition(&plan, state, &context, &ready_to_start("p1")).is_none());
}

#[test]
fn disconnect_only_leaves_active_set() {
    let machine = SessionMachine::new(single_activity_plan(), 3);
    let machine = run(machine, &[join("p1"), ready_to_start("p1")]);
    let machine = apply(
        &machine,
        &SessionAction::Disconnect {
            profile_id: "p1".into(),
        },
    );

    assert!(machine.context().current_active_profiles.is_empty());
    assert!(machine.context().ready_active_profiles.contains("p1"));
}

#[test]
fn activity_actions_in_waiting_are_noops() {
    let plan = single_activity_plan();
    let context = SessionContext::new(1);
    assert!(transition(
        &plan,
        MachineState::Waiting,
        &context,
        &set_value("p1", "activity-1", "x")
    )
    .is_none());
}

#[test]
fn restore_rejects_unknown_state() {
    let err = SessionMachine::from_snapshot(
        single_activity_plan(),
        Snapshot {
            value: "activity-7.group".into(),
            version: 1,
            context: SessionContext::new(1),
        },
    )
    .expect_err("unknown path");
    assert!(err.to_string().starts_with("catalog:"));
}
