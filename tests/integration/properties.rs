//! Property tests over random operation sequences and generated plans.

use std::collections::BTreeMap;

use epicflow::plan::LayerPlanner;
use epicflow::store::DocumentFormat;
use epicflow::{
    Epic, EpicState, Layer, LayerStatus, ListFilter, MemoryStateStore, Scheduler, SlotAllocator,
    SprintDefinition, SprintPlan, WorkflowState,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const EPICS: usize = 4;
const AGENTS: usize = 3;
const TASKS: u32 = 3;

#[derive(Debug, Clone)]
enum Op {
    Lock(usize),
    Assign(usize, usize),
    Park(usize),
    Resume(usize, usize),
    Progress(usize, u32),
    Review(usize),
    Integrate(usize),
    Release(usize),
    Abandon(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..EPICS).prop_map(Op::Lock),
        (0..EPICS, 0..AGENTS).prop_map(|(e, a)| Op::Assign(e, a)),
        (0..EPICS).prop_map(Op::Park),
        (0..EPICS, 0..AGENTS).prop_map(|(e, a)| Op::Resume(e, a)),
        (0..EPICS, 0..=TASKS).prop_map(|(e, done)| Op::Progress(e, done)),
        (0..EPICS).prop_map(Op::Review),
        (0..EPICS).prop_map(Op::Integrate),
        (0..EPICS).prop_map(Op::Release),
        (0..EPICS).prop_map(Op::Abandon),
    ]
}

fn epic_name(i: usize) -> String {
    format!("epic-{}", i)
}

fn agent_name(i: usize) -> String {
    format!("agent-{}", i)
}

async fn apply(scheduler: &Scheduler<MemoryStateStore>, op: &Op) -> bool {
    let result = match op {
        Op::Lock(e) => scheduler.lock_contracts(&epic_name(*e)).await.map(drop),
        Op::Assign(e, a) => scheduler
            .assign(&epic_name(*e), &agent_name(*a))
            .await
            .map(drop),
        Op::Park(e) => scheduler
            .park(&epic_name(*e), "blocked upstream", "platform-team")
            .await
            .map(drop),
        Op::Resume(e, a) => scheduler
            .resume(&epic_name(*e), &agent_name(*a))
            .await
            .map(drop),
        Op::Progress(e, done) => scheduler
            .report_progress(&epic_name(*e), *done, TASKS)
            .await
            .map(drop),
        Op::Review(e) => scheduler.submit_for_review(&epic_name(*e)).await.map(drop),
        Op::Integrate(e) => scheduler.integrate(&epic_name(*e)).await.map(drop),
        Op::Release(e) => scheduler.release(&epic_name(*e)).await.map(drop),
        Op::Abandon(e) => scheduler.abandon(&epic_name(*e), "descoped").await.map(drop),
    };
    result.is_ok()
}

fn states(state: &WorkflowState) -> BTreeMap<String, EpicState> {
    state
        .epics
        .iter()
        .map(|e| (e.name.clone(), e.state))
        .collect()
}

fn epic_in(name: &str, state: EpicState) -> Epic {
    let mut epic = Epic::new(name, 1);
    epic.state = state;
    epic
}

fn member_state() -> impl Strategy<Value = EpicState> {
    prop::sample::select(EpicState::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_random_operations_follow_transition_table(
        ops in prop::collection::vec(op(), 1..60),
        max_per_agent in 1u32..3,
    ) {
        tokio_test::block_on(async {
            let scheduler = Scheduler::new(MemoryStateStore::new(), SprintPlan::default(), max_per_agent)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            for i in 0..EPICS {
                scheduler
                    .add_epic(&epic_name(i), TASKS)
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
            }

            for op in &ops {
                let before = scheduler.snapshot().await;
                let applied = apply(&scheduler, op).await;
                let after = scheduler.snapshot().await;

                if !applied {
                    prop_assert_eq!(&*before, &*after, "failed {:?} changed state", op);
                }

                let (prev, next) = (states(&before), states(&after));
                for (name, from) in &prev {
                    let to = next[name];
                    prop_assert!(
                        *from == to || from.can_transition_to(to),
                        "{:?} moved {} from {} to {}", op, name, from, to
                    );
                }

                prop_assert!(after.validate().is_ok(), "{:?}", after.validate());
                let utilization = scheduler.list(&ListFilter::all()).await.utilization;
                let agents = after.wip_limits.agents.len() as u32;
                prop_assert!(utilization.occupied <= after.wip_limits.max_per_agent * agents);
                prop_assert_eq!(
                    utilization.occupied as usize,
                    after.epics_in(EpicState::Implementing).count()
                );
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn test_reachable_states_round_trip(ops in prop::collection::vec(op(), 0..40)) {
        tokio_test::block_on(async {
            let scheduler = Scheduler::with_store(MemoryStateStore::new())
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            for i in 0..EPICS {
                scheduler
                    .add_epic(&epic_name(i), TASKS)
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
            for op in &ops {
                apply(&scheduler, op).await;
            }

            let state = scheduler.snapshot().await;
            for format in [DocumentFormat::Json, DocumentFormat::Yaml] {
                let encoded = format
                    .encode(&*state)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                let decoded: WorkflowState = format
                    .decode(&encoded)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(&decoded, &*state);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn test_release_slot_is_idempotent(
        assigned in prop::collection::vec((0..EPICS, 0..AGENTS), 0..EPICS),
        target in (0..EPICS, 0..AGENTS),
    ) {
        let mut state = WorkflowState::new(EPICS as u32);
        for i in 0..EPICS {
            state.epics.push(Epic::new(epic_name(i), 1));
        }
        for (e, a) in &assigned {
            let epic = &mut state.epics[*e];
            epic.state = EpicState::Implementing;
            epic.agent = Some(agent_name(*a));
        }

        let (epic, agent) = (epic_name(target.0), agent_name(target.1));
        let mut once = SlotAllocator::from_state(&state);
        once.release_slot(&agent, &epic);
        let mut twice = SlotAllocator::from_state(&state);
        twice.release_slot(&agent, &epic);
        let second = twice.release_slot(&agent, &epic);

        prop_assert!(!second);
        prop_assert_eq!(once.utilization(), twice.utilization());
        prop_assert_eq!(once.held(&agent), twice.held(&agent));
    }

    #[test]
    fn test_lower_unfinished_layer_blocks_execution(
        layers in prop::collection::vec(
            (prop::collection::vec(member_state(), 1..4), any::<bool>()),
            1..5,
        ),
    ) {
        let mut state = WorkflowState::default();
        let mut plan_layers = Vec::new();
        for (i, (members, parallelizable)) in layers.iter().enumerate() {
            let index = i as u32 + 1;
            let mut names = Vec::new();
            for (j, member) in members.iter().enumerate() {
                let name = format!("l{}-e{}", index, j);
                state.epics.push(epic_in(&name, *member));
                names.push(name);
            }
            plan_layers.push(Layer::new(index, names, *parallelizable));
        }
        let plan = SprintPlan::new(plan_layers, Vec::new())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let planner = LayerPlanner::new(&plan, &state);

        for (i, _) in layers.iter().enumerate() {
            let index = i as u32 + 1;
            let lower_unfinished = layers[..i]
                .iter()
                .any(|(members, _)| members.iter().any(|s| !s.is_terminal_for_layer()));
            if lower_unfinished {
                prop_assert!(!planner.is_executable(index), "layer {} executable", index);
            }
        }
    }

    #[test]
    fn test_consolidation_succeeds_iff_every_member_succeeded(
        members in prop::collection::vec(
            (member_state(), any::<bool>(), any::<bool>()),
            1..6,
        ),
    ) {
        // Members are grouped two per sprint; an unregistered epic is still
        // part of the plan and has not started.
        let mut state = WorkflowState::default();
        let mut sprints = Vec::new();
        for (j, chunk) in members.chunks(2).enumerate() {
            let mut epics = Vec::new();
            for (k, (member, failed, registered)) in chunk.iter().enumerate() {
                let name = format!("epic-{}-{}", j, k);
                if *registered {
                    let mut epic = epic_in(&name, *member);
                    if *member == EpicState::Released && *failed {
                        epic.failure = Some("abandoned".to_string());
                    }
                    state.epics.push(epic);
                }
                epics.push(name);
            }
            sprints.push(SprintDefinition {
                name: format!("S{:02}", j + 1),
                epics,
            });
        }
        let expected = members.iter().all(|(_, _, registered)| *registered)
            && state.epics.iter().all(Epic::is_terminal_success);
        let sprint_names = sprints.iter().map(|s| s.name.clone()).collect();
        let plan = SprintPlan::new(vec![Layer::new(1, sprint_names, true)], sprints)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        tokio_test::block_on(async {
            let scheduler = Scheduler::new(MemoryStateStore::with_state(state), plan, 1)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let report = scheduler
                .consolidate(1)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(report.all_succeeded, expected);
            if expected {
                prop_assert_eq!(report.layer_status, LayerStatus::Complete);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
