//! End-to-end scheduling scenarios against the public facade.
//!
//! Each test builds a workflow through `Scheduler` operations only, the way
//! the CLI and automation drive it.

use std::fs;
use std::sync::Arc;

use epicflow::{
    AssignOutcome, EpicState, FileStateStore, Layer, LayerStatus, ListFilter, MemoryStateStore,
    QueueReason, Scheduler, SchedulerConfig, SchedulerError, SprintDefinition, SprintPlan,
    SprintReport, SprintReports, SprintStatus, StateStore,
};
use tempfile::TempDir;

async fn locked_epic<S: StateStore>(scheduler: &Scheduler<S>, name: &str, tasks: u32) {
    scheduler.add_epic(name, tasks).await.expect("add epic");
    scheduler.lock_contracts(name).await.expect("lock contracts");
}

fn two_layer_plan() -> SprintPlan {
    SprintPlan::new(
        vec![
            Layer::new(1, vec!["epic-a".into(), "epic-b".into()], true),
            Layer::new(2, vec!["epic-c".into()], true),
        ],
        Vec::new(),
    )
    .expect("plan")
}

async fn finish<S: StateStore>(scheduler: &Scheduler<S>, name: &str, agent: &str) {
    locked_epic(scheduler, name, 1).await;
    scheduler.assign(name, agent).await.expect("assign");
    scheduler.report_progress(name, 1, 1).await.expect("progress");
    scheduler.submit_for_review(name).await.expect("review");
    scheduler.integrate(name).await.expect("integrate");
}

#[tokio::test]
async fn test_assign_with_free_slot_starts_implementing() {
    let scheduler = Scheduler::with_store(MemoryStateStore::new()).expect("scheduler");
    locked_epic(&scheduler, "epic-auth-api", 5).await;

    let outcome = scheduler
        .assign("epic-auth-api", "backend-agent")
        .await
        .expect("assign");

    let AssignOutcome::Assigned { epic } = outcome else {
        panic!("expected assignment, got {:?}", outcome);
    };
    assert_eq!(epic.state, EpicState::Implementing);
    assert_eq!(epic.agent.as_deref(), Some("backend-agent"));
    assert!(!epic.waiting_for_slot);
    assert!(epic.started_at.is_some());
    assert!(epic.feature_flag.is_some());
}

#[tokio::test]
async fn test_second_assign_for_busy_agent_is_queued() {
    let scheduler = Scheduler::with_store(MemoryStateStore::new()).expect("scheduler");
    locked_epic(&scheduler, "epic-auth-api", 5).await;
    locked_epic(&scheduler, "epic-billing", 3).await;
    scheduler
        .assign("epic-auth-api", "backend-agent")
        .await
        .expect("first assign");

    let outcome = scheduler
        .assign("epic-billing", "backend-agent")
        .await
        .expect("second assign is not an error");

    match outcome {
        AssignOutcome::Queued { epic, reason } => {
            assert_eq!(epic.state, EpicState::ContractsLocked);
            assert!(epic.waiting_for_slot);
            assert_eq!(
                reason,
                QueueReason::AgentAtCapacity {
                    agent: "backend-agent".into(),
                    held: 1,
                    max: 1,
                }
            );
        }
        other => panic!("expected queued, got {:?}", other),
    }

    let listing = scheduler.list(&ListFilter::all()).await;
    assert_eq!(listing.wip, "1/1");
    assert_eq!(listing.waiting_for_slot, vec!["epic-billing".to_string()]);

    // A different agent takes it, which clears the waiting flag.
    let outcome = scheduler
        .assign("epic-billing", "frontend-agent")
        .await
        .expect("assign");
    assert!(!outcome.epic().waiting_for_slot);
    assert_eq!(scheduler.list(&ListFilter::all()).await.wip, "2/2");
}

#[tokio::test]
async fn test_park_releases_slot_and_rejects_second_park() {
    let scheduler = Scheduler::with_store(MemoryStateStore::new()).expect("scheduler");
    locked_epic(&scheduler, "epic-x", 8).await;
    scheduler.assign("epic-x", "backend-agent").await.expect("assign");
    scheduler.report_progress("epic-x", 6, 8).await.expect("progress");

    let parked = scheduler
        .park("epic-x", "waiting on vendor API", "devops-team")
        .await
        .expect("park");
    assert_eq!(parked.state, EpicState::Parked);
    assert_eq!(parked.agent, None);
    assert_eq!(parked.blocked_by.as_deref(), Some("devops-team"));
    assert_eq!(parked.tasks_complete, 6);
    assert_eq!(scheduler.utilization().await.occupied, 0);

    let err = scheduler
        .park("epic-x", "waiting on vendor API", "devops-team")
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::PreconditionFailed { .. }));

    // The freed slot lets the same agent take other work.
    locked_epic(&scheduler, "epic-y", 2).await;
    let outcome = scheduler.assign("epic-y", "backend-agent").await.expect("assign");
    assert!(!outcome.is_queued());

    // Resuming needs a slot too; the agent is full again.
    let outcome = scheduler.resume("epic-x", "backend-agent").await.expect("resume");
    assert!(outcome.is_queued());
    assert_eq!(outcome.epic().state, EpicState::Parked);

    let outcome = scheduler.resume("epic-x", "other-agent").await.expect("resume");
    assert_eq!(outcome.epic().state, EpicState::Implementing);
    assert_eq!(outcome.epic().parked_reason, None);
}

#[tokio::test]
async fn test_ci_failure_blocks_layer() {
    let plan = SprintPlan::new(
        vec![
            Layer::new(1, vec!["S01".into(), "S02".into(), "S03".into()], true),
            Layer::new(2, vec!["epic-next".into()], true),
        ],
        vec![
            SprintDefinition {
                name: "S01".into(),
                epics: vec!["epic-a".into()],
            },
            SprintDefinition {
                name: "S02".into(),
                epics: vec!["epic-b".into()],
            },
            SprintDefinition {
                name: "S03".into(),
                epics: vec!["epic-c".into()],
            },
        ],
    )
    .expect("plan");

    // S03 reports only the CI signal; the status it wrote is still in progress.
    let mut s03 = SprintReport::new("S03", SprintStatus::InProgress);
    s03.tasks_total = 4;
    s03.tasks_completed = 2;
    s03.ci_failed = true;
    let mut s01 = SprintReport::new("S01", SprintStatus::Completed);
    s01.tasks_total = 5;
    s01.tasks_completed = 5;
    s01.tests_passed = 40;
    s01.duration_hours = 6.5;
    let mut s02 = SprintReport::new("S02", SprintStatus::Completed);
    s02.tasks_total = 3;
    s02.tasks_completed = 3;
    s02.tests_passed = 12;
    s02.duration_hours = 2.0;

    let scheduler = Scheduler::new(MemoryStateStore::new(), plan, 1)
        .expect("scheduler")
        .with_reports(SprintReports::new(vec![s01, s02, s03]));

    let failure = scheduler
        .has_critical("S03")
        .await
        .expect("check")
        .expect("critical failure");
    assert_eq!(failure.sprint, "S03");
    assert!(failure.to_string().contains("CI pipeline failed"));
    assert_eq!(scheduler.layers().await[0].status, LayerStatus::Failed);
    assert!(scheduler.has_critical("S01").await.expect("check").is_none());

    let report = scheduler.consolidate(1).await.expect("consolidate");
    assert!(!report.all_succeeded);
    assert_eq!(report.summary.failed_sprints, vec!["S03".to_string()]);
    assert_eq!(report.summary.tasks_total, 12);
    assert_eq!(report.summary.tests_passed, 52);
    assert_eq!(report.layer_status, LayerStatus::Failed);
    assert!(report.verdict().contains("needs a decision"));

    // Layer 2 refuses to start until the operator clears the failure.
    locked_epic(&scheduler, "epic-next", 1).await;
    let err = scheduler.assign("epic-next", "agent").await.unwrap_err();
    match err {
        SchedulerError::CriticalFailureDetected(failure) => assert_eq!(failure.sprint, "S03"),
        other => panic!("expected critical failure, got {:?}", other),
    }
    assert!(!scheduler.is_executable(2).await);
    assert_eq!(scheduler.current_layer().await, Some(1));

    assert!(scheduler.clear_failure(1).await.expect("clear"));
    // Layer 1's epics never ran, so layer 2 now waits instead of failing.
    let outcome = scheduler.assign("epic-next", "agent").await.expect("assign");
    assert_eq!(
        outcome,
        AssignOutcome::Queued {
            epic: outcome.epic().clone(),
            reason: QueueReason::LayerNotReady { layer: 1 },
        }
    );
}

#[tokio::test]
async fn test_next_layer_executable_but_planned_member_cannot_start() {
    let scheduler =
        Scheduler::new(MemoryStateStore::new(), two_layer_plan(), 1).expect("scheduler");
    finish(&scheduler, "epic-a", "agent-1").await;
    finish(&scheduler, "epic-b", "agent-1").await;
    scheduler.add_epic("epic-c", 2).await.expect("add");

    assert!(scheduler.is_executable(2).await);
    assert_eq!(scheduler.current_layer().await, Some(2));

    let err = scheduler.assign("epic-c", "agent-1").await.unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::InvalidTransition {
            from: EpicState::Planned,
            to: EpicState::Implementing,
            ..
        }
    ));
}

#[tokio::test]
async fn test_layer_two_waits_for_layer_one() {
    let scheduler =
        Scheduler::new(MemoryStateStore::new(), two_layer_plan(), 2).expect("scheduler");
    locked_epic(&scheduler, "epic-a", 1).await;
    locked_epic(&scheduler, "epic-c", 1).await;

    let outcome = scheduler.assign("epic-c", "agent-1").await.expect("assign");
    assert!(outcome.is_queued());
    assert!(!scheduler.is_executable(2).await);

    finish(&scheduler, "epic-b", "agent-1").await;
    scheduler.assign("epic-a", "agent-1").await.expect("assign");
    scheduler.report_progress("epic-a", 1, 1).await.expect("progress");
    scheduler.submit_for_review("epic-a").await.expect("review");
    scheduler.integrate("epic-a").await.expect("integrate");

    let outcome = scheduler.assign("epic-c", "agent-1").await.expect("assign");
    assert_eq!(outcome.epic().state, EpicState::Implementing);
}

#[tokio::test]
async fn test_serial_layer_runs_one_member_at_a_time() {
    let plan = SprintPlan::new(
        vec![Layer::new(
            1,
            vec!["db-migration-a".into(), "db-migration-b".into()],
            false,
        )],
        Vec::new(),
    )
    .expect("plan");
    let scheduler = Scheduler::new(MemoryStateStore::new(), plan, 3).expect("scheduler");
    locked_epic(&scheduler, "db-migration-a", 1).await;
    locked_epic(&scheduler, "db-migration-b", 1).await;

    scheduler
        .assign("db-migration-a", "agent-1")
        .await
        .expect("assign");
    let outcome = scheduler
        .assign("db-migration-b", "agent-2")
        .await
        .expect("assign");
    assert!(matches!(
        outcome,
        AssignOutcome::Queued {
            reason: QueueReason::SerialLayerBusy { layer: 1, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_all_layers_complete_archives_workflow() {
    let scheduler =
        Scheduler::new(MemoryStateStore::new(), two_layer_plan(), 1).expect("scheduler");
    finish(&scheduler, "epic-a", "agent-1").await;
    finish(&scheduler, "epic-b", "agent-1").await;
    assert!(!scheduler.snapshot().await.is_archived());

    finish(&scheduler, "epic-c", "agent-1").await;
    scheduler.release("epic-c").await.expect("release");

    let state = scheduler.snapshot().await;
    assert!(state.is_archived());
    assert_eq!(state.current_layer_index, 0);
    let listing = scheduler.list(&ListFilter::all()).await;
    assert!(listing.archived);
    assert_eq!(listing.groups[&EpicState::Integrated].len(), 2);
    assert_eq!(listing.groups[&EpicState::Released].len(), 1);

    let report = scheduler.consolidate(2).await.expect("consolidate");
    assert!(report.all_succeeded);
    assert_eq!(report.layer_status, LayerStatus::Complete);
}

#[tokio::test]
async fn test_concurrent_assigns_never_exceed_capacity() {
    let temp_dir = TempDir::new().expect("temp dir");
    let config = SchedulerConfig::default()
        .with_journal_enabled(false)
        .with_base_dir(temp_dir.path());
    let scheduler = Arc::new(Scheduler::open(&config).expect("open"));

    let names: Vec<String> = (0..6).map(|i| format!("epic-{}", i)).collect();
    for name in &names {
        scheduler.add_epic(name, 1).await.expect("add");
        scheduler.lock_contracts(name).await.expect("lock");
    }

    let tasks = names.iter().map(|name| {
        let scheduler = Arc::clone(&scheduler);
        let name = name.clone();
        tokio::spawn(async move { scheduler.assign(&name, "shared-agent").await })
    });
    let outcomes: Vec<AssignOutcome> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("join").expect("assign"))
        .collect();

    let granted = outcomes.iter().filter(|o| !o.is_queued()).count();
    assert_eq!(granted, 1);
    assert_eq!(outcomes.len() - granted, 5);

    let on_disk = FileStateStore::new(&config.state_path)
        .load()
        .expect("load")
        .expect("state");
    assert_eq!(on_disk.epics_in(EpicState::Implementing).count(), 1);
    assert_eq!(on_disk, *scheduler.snapshot().await);
}

#[tokio::test]
async fn test_markdown_plan_drives_scheduling() {
    let temp_dir = TempDir::new().expect("temp dir");
    let plan_path = temp_dir.path().join("plan.md");
    fs::write(
        &plan_path,
        "# Sprint Plan\n\n\
         ## Layers\n\n\
         | Layer | Members | Parallel |\n\
         |-------|---------|----------|\n\
         | 1 | S01 | yes |\n\
         | 2 | epic-ui | no |\n\n\
         ## Sprints\n\n\
         | Sprint | Epics |\n\
         |--------|-------|\n\
         | S01 | epic-api, epic-db |\n",
    )
    .expect("write plan");

    let config = SchedulerConfig::default()
        .with_base_dir(temp_dir.path())
        .with_plan_path(&plan_path);
    let scheduler = Scheduler::open(&config).expect("open");
    assert_eq!(scheduler.plan().layers.len(), 2);

    locked_epic(&scheduler, "epic-ui", 1).await;
    let outcome = scheduler.assign("epic-ui", "frontend-agent").await.expect("assign");
    assert!(matches!(
        outcome,
        AssignOutcome::Queued {
            reason: QueueReason::LayerNotReady { layer: 1 },
            ..
        }
    ));

    let history = scheduler.history("epic-ui").await.expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].detail.as_deref(), Some("queued: waiting for layer 1 to finish"));
}
