//! The scheduler facade.
//!
//! Every mutating operation runs the same atomic cycle: take the in-process
//! writer lock, take the store's cross-process lock, load the current
//! document, apply the change to a copy, save it whole, publish the new
//! snapshot, then journal what happened. Readers only ever see a published
//! snapshot.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::outcome::{AssignOutcome, ConsolidationReport, EpicListing, ListFilter, QueueReason};
use crate::config::SchedulerConfig;
use crate::epic::{Epic, EpicState};
use crate::error::{EntityKind, SchedulerError, SchedulerResult};
use crate::journal::{Journal, JournalRecord};
use crate::plan::{Layer, LayerPlanner, LayerStatus, LayerView, Readiness, SprintPlan};
use crate::sprint::{
    consolidate, first_critical_failure, has_critical_failure, FailureReport, SprintReport,
    SprintReports,
};
use crate::store::{FileStateStore, StateStore};
use crate::wip::{SlotAllocator, SlotDecision, WipUtilization};
use crate::workflow::{WorkflowState, DEFAULT_MAX_PER_AGENT};

/// Where sprint reports come from.
#[derive(Debug, Clone)]
enum ReportSource {
    Fixed(SprintReports),
    /// Re-read on every use; collaborators write it while we run.
    File(PathBuf),
}

impl ReportSource {
    fn load(&self) -> SchedulerResult<SprintReports> {
        match self {
            ReportSource::Fixed(reports) => Ok(reports.clone()),
            ReportSource::File(path) => Ok(SprintReports::load(path)?),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    Assign,
    Resume,
}

impl StartMode {
    fn operation(self) -> &'static str {
        match self {
            StartMode::Assign => "assign",
            StartMode::Resume => "resume",
        }
    }
}

/// Single entry point for the workflow.
pub struct Scheduler<S = FileStateStore> {
    store: S,
    plan: SprintPlan,
    reports: ReportSource,
    journal: Option<Journal>,
    max_per_agent: u32,
    writer: Mutex<()>,
    snapshot: RwLock<Arc<WorkflowState>>,
}

impl Scheduler<FileStateStore> {
    /// Open the workspace described by `config`.
    pub fn open(config: &SchedulerConfig) -> SchedulerResult<Self> {
        let plan = SprintPlan::load(&config.plan_path)?;
        let store = FileStateStore::new(&config.state_path);
        let mut scheduler = Scheduler::new(store, plan, config.max_per_agent)?
            .with_reports_path(&config.reports_path);

        if config.journal_enabled {
            let journal = Journal::new(&config.journal_dir, config.journal_retention_days)?;
            match journal.enforce_retention() {
                Ok(0) => {}
                Ok(pruned) => debug!(pruned, "pruned expired journal records"),
                Err(err) => warn!(error = %err, "journal retention failed"),
            }
            scheduler = scheduler.with_journal(journal);
        }

        info!(
            state = %config.state_path.display(),
            layers = scheduler.plan.layers.len(),
            "scheduler opened"
        );
        Ok(scheduler)
    }
}

impl<S: StateStore> Scheduler<S> {
    /// Create a scheduler over `store`. A store with no document starts from
    /// an empty workflow limited to `max_per_agent` slots per agent.
    pub fn new(store: S, plan: SprintPlan, max_per_agent: u32) -> SchedulerResult<Self> {
        let max_per_agent = max_per_agent.max(1);
        let initial = store
            .load()?
            .unwrap_or_else(|| WorkflowState::new(max_per_agent));
        Ok(Self {
            store,
            plan,
            reports: ReportSource::Fixed(SprintReports::default()),
            journal: None,
            max_per_agent,
            writer: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(initial)),
        })
    }

    /// Scheduler with an empty plan and the default slot limit.
    pub fn with_store(store: S) -> SchedulerResult<Self> {
        Self::new(store, SprintPlan::default(), DEFAULT_MAX_PER_AGENT)
    }

    pub fn with_reports(mut self, reports: SprintReports) -> Self {
        self.reports = ReportSource::Fixed(reports);
        self
    }

    pub fn with_reports_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.reports = ReportSource::File(path.into());
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn plan(&self) -> &SprintPlan {
        &self.plan
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The last published workflow state.
    pub async fn snapshot(&self) -> Arc<WorkflowState> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Re-read the document from the store, picking up writes made by other
    /// processes.
    pub async fn refresh(&self) -> SchedulerResult<Arc<WorkflowState>> {
        let _writer = self.writer.lock().await;
        let current = Arc::new(self.load_current()?);
        *self.snapshot.write().await = Arc::clone(&current);
        Ok(current)
    }

    fn load_current(&self) -> SchedulerResult<WorkflowState> {
        Ok(self
            .store
            .load()?
            .unwrap_or_else(|| WorkflowState::new(self.max_per_agent)))
    }

    /// Run `apply` as one atomic read-modify-write of the state document.
    ///
    /// Nothing is saved when `apply` fails. The document is only rewritten
    /// when it actually changed.
    async fn mutate<T, F>(&self, apply: F) -> SchedulerResult<T>
    where
        F: FnOnce(&mut WorkflowState, &mut Vec<JournalRecord>) -> SchedulerResult<T>,
    {
        let _writer = self.writer.lock().await;
        let guard = self.store.lock()?;

        let before = self.load_current()?;
        let mut next = before.clone();
        let mut records = Vec::new();
        let value = apply(&mut next, &mut records)?;
        self.update_layer_pointer(&mut next, &mut records);

        if next != before {
            self.store.save(&next)?;
        }
        drop(guard);
        *self.snapshot.write().await = Arc::new(next);

        self.journal_all(&records);
        Ok(value)
    }

    fn update_layer_pointer(&self, state: &mut WorkflowState, records: &mut Vec<JournalRecord>) {
        let planner = LayerPlanner::new(&self.plan, state);
        let current = planner.current_layer().unwrap_or(0);
        let finished = planner.all_complete();

        if state.current_layer_index != current {
            debug!(from = state.current_layer_index, to = current, "current layer moved");
            state.current_layer_index = current;
        }
        if finished && state.archived_at.is_none() {
            state.archived_at = Some(Utc::now());
            info!("every layer complete, workflow archived");
            records.push(JournalRecord::new("archive"));
        }
    }

    fn journal_all(&self, records: &[JournalRecord]) {
        let Some(journal) = &self.journal else {
            return;
        };
        for record in records {
            if let Err(err) = journal.append(record) {
                warn!(operation = %record.operation, error = %err, "failed to journal transition");
            }
        }
    }

    /// Register a new `Planned` epic.
    pub async fn add_epic(&self, name: &str, tasks_total: u32) -> SchedulerResult<Epic> {
        self.mutate(|state, records| {
            let epic = state.add_epic(Epic::new(name, tasks_total))?.clone();
            info!(epic = name, tasks_total, "epic added");
            records.push(
                JournalRecord::new("add")
                    .with_epic(name)
                    .with_detail(format!("{} tasks", tasks_total)),
            );
            Ok(epic)
        })
        .await
    }

    /// `Planned → ContractsLocked`.
    pub async fn lock_contracts(&self, name: &str) -> SchedulerResult<Epic> {
        self.mutate(|state, records| {
            let epic = state.require_epic_mut(name)?;
            let from = epic.state;
            epic.lock_contracts(Utc::now())?;
            info!(epic = name, "contracts locked");
            records.push(
                JournalRecord::new("lock")
                    .with_epic(name)
                    .with_transition(from, epic.state),
            );
            Ok(epic.clone())
        })
        .await
    }

    /// Start a `ContractsLocked` epic on `agent`.
    ///
    /// A full agent, an unfinished lower layer, or a busy serial layer yields
    /// [`AssignOutcome::Queued`]; a failed lower layer is an error.
    pub async fn assign(&self, name: &str, agent: &str) -> SchedulerResult<AssignOutcome> {
        self.mutate(|state, records| self.start(state, records, name, agent, StartMode::Assign))
            .await
    }

    /// Bring a `Parked` epic back to `Implementing` on `agent`, subject to
    /// the same checks as [`assign`](Self::assign).
    pub async fn resume(&self, name: &str, agent: &str) -> SchedulerResult<AssignOutcome> {
        self.mutate(|state, records| self.start(state, records, name, agent, StartMode::Resume))
            .await
    }

    fn start(
        &self,
        state: &mut WorkflowState,
        records: &mut Vec<JournalRecord>,
        name: &str,
        agent: &str,
        mode: StartMode,
    ) -> SchedulerResult<AssignOutcome> {
        let epic = state.require_epic(name)?;
        match (mode, epic.state) {
            (StartMode::Assign, EpicState::ContractsLocked)
            | (StartMode::Resume, EpicState::Parked) => {}
            (StartMode::Assign, EpicState::Parked) => {
                return Err(SchedulerError::precondition(
                    name,
                    "epic is parked; resume it instead",
                ));
            }
            (StartMode::Assign, from) => {
                return Err(SchedulerError::InvalidTransition {
                    epic: name.to_string(),
                    from,
                    to: EpicState::Implementing,
                });
            }
            (StartMode::Resume, from) => {
                return Err(SchedulerError::precondition(
                    name,
                    format!("only parked epics can be resumed (state is {})", from),
                ));
            }
        }
        if agent.trim().is_empty() {
            return Err(SchedulerError::precondition(name, "an agent is required"));
        }

        let reason = match LayerPlanner::new(&self.plan, state).readiness_for(name) {
            Readiness::Ready => None,
            Readiness::WaitingOn { layer } => Some(QueueReason::LayerNotReady { layer }),
            Readiness::SerialBusy { layer, epic } => {
                Some(QueueReason::SerialLayerBusy { layer, epic })
            }
            Readiness::BlockedBy { layer, failure } => {
                warn!(epic = name, layer, "start refused, lower layer failed");
                return Err(SchedulerError::CriticalFailureDetected(failure));
            }
        };
        if let Some(reason) = reason {
            return queue(state, records, name, mode, reason);
        }

        let mut allocator = SlotAllocator::from_state(state);
        let decision = allocator.acquire_slot(agent, state.require_epic(name)?)?;
        let slot = match decision {
            SlotDecision::Granted(slot) => slot,
            SlotDecision::Denied { agent, held, max } => {
                let reason = QueueReason::AgentAtCapacity { agent, held, max };
                return queue(state, records, name, mode, reason);
            }
        };

        let epic = state.require_epic_mut(name)?;
        let from = epic.state;
        epic.start_implementing(agent, None, Utc::now())?;
        let started = epic.clone();
        state.wip_limits.register_agent(agent);

        info!(epic = name, agent, held = slot.held, "epic implementing");
        records.push(
            JournalRecord::new(mode.operation())
                .with_epic(name)
                .with_transition(from, EpicState::Implementing)
                .with_agent(agent),
        );
        Ok(AssignOutcome::Assigned { epic: started })
    }

    /// `Implementing → Parked`, freeing the agent's slot.
    pub async fn park(&self, name: &str, reason: &str, blocked_by: &str) -> SchedulerResult<Epic> {
        self.mutate(|state, records| {
            let mut allocator = SlotAllocator::from_state(state);
            let epic = state.require_epic_mut(name)?;
            let agent = epic.agent.clone();
            epic.park(reason, blocked_by, Utc::now())?;
            if let Some(agent) = &agent {
                let freed = allocator.release_slot(agent, name);
                debug!(
                    epic = name,
                    agent = agent.as_str(),
                    freed,
                    held = allocator.held(agent),
                    "slot released"
                );
            }

            info!(epic = name, blocked_by, reason, "epic parked");
            let mut record = JournalRecord::new("park")
                .with_epic(name)
                .with_transition(EpicState::Implementing, EpicState::Parked)
                .with_detail(format!("{} (blocked by {})", reason, blocked_by));
            if let Some(agent) = agent {
                record = record.with_agent(agent);
            }
            records.push(record);
            Ok(epic.clone())
        })
        .await
    }

    /// Record task counters reported for an epic.
    pub async fn report_progress(
        &self,
        name: &str,
        tasks_complete: u32,
        tasks_total: u32,
    ) -> SchedulerResult<Epic> {
        self.mutate(|state, records| {
            let epic = state.require_epic_mut(name)?;
            epic.record_progress(tasks_complete, tasks_total)?;
            debug!(epic = name, tasks_complete, tasks_total, "progress recorded");
            records.push(
                JournalRecord::new("progress")
                    .with_epic(name)
                    .with_detail(format!("{}/{}", tasks_complete, tasks_total)),
            );
            Ok(epic.clone())
        })
        .await
    }

    /// `Implementing → Review`, freeing the agent's slot.
    pub async fn submit_for_review(&self, name: &str) -> SchedulerResult<Epic> {
        self.mutate(|state, records| {
            let mut allocator = SlotAllocator::from_state(state);
            let epic = state.require_epic_mut(name)?;
            let agent = epic.agent.clone();
            let from = epic.state;
            epic.submit_for_review(Utc::now())?;
            if let Some(agent) = &agent {
                let freed = allocator.release_slot(agent, name);
                debug!(
                    epic = name,
                    agent = agent.as_str(),
                    freed,
                    held = allocator.held(agent),
                    "slot released"
                );
            }
            info!(epic = name, "epic in review");
            records.push(
                JournalRecord::new("review")
                    .with_epic(name)
                    .with_transition(from, EpicState::Review),
            );
            Ok(epic.clone())
        })
        .await
    }

    /// `Review → Integrated`.
    pub async fn integrate(&self, name: &str) -> SchedulerResult<Epic> {
        self.simple_transition("integrate", name, |epic| epic.integrate(Utc::now()))
            .await
    }

    /// `Integrated → Released`.
    pub async fn release(&self, name: &str) -> SchedulerResult<Epic> {
        self.simple_transition("release", name, |epic| epic.release(Utc::now()))
            .await
    }

    /// Give up on an `Implementing` or `Review` epic. It ends `Released`
    /// with the failure recorded and does not count as a success.
    pub async fn abandon(&self, name: &str, reason: &str) -> SchedulerResult<Epic> {
        self.simple_transition("abandon", name, |epic| epic.abandon(reason, Utc::now()))
            .await
    }

    async fn simple_transition<F>(
        &self,
        operation: &'static str,
        name: &str,
        transition: F,
    ) -> SchedulerResult<Epic>
    where
        F: FnOnce(&mut Epic) -> SchedulerResult<()>,
    {
        self.mutate(|state, records| {
            let epic = state.require_epic_mut(name)?;
            let from = epic.state;
            transition(epic)?;
            info!(epic = name, from = %from, to = %epic.state, "{}", operation);
            let mut record = JournalRecord::new(operation)
                .with_epic(name)
                .with_transition(from, epic.state);
            if let Some(failure) = &epic.failure {
                record = record.with_detail(failure.clone());
            }
            records.push(record);
            Ok(epic.clone())
        })
        .await
    }

    /// Epics grouped by state, with WIP utilization.
    pub async fn list(&self, filter: &ListFilter) -> EpicListing {
        let state = self.snapshot().await;
        let mut groups: BTreeMap<EpicState, Vec<Epic>> = BTreeMap::new();
        for epic in state.epics.iter().filter(|e| filter.matches(e)) {
            groups.entry(epic.state).or_default().push(epic.clone());
        }
        let utilization = SlotAllocator::from_state(&state).utilization();

        EpicListing {
            total: groups.values().map(Vec::len).sum(),
            groups,
            wip: utilization.to_string(),
            utilization,
            waiting_for_slot: state
                .epics
                .iter()
                .filter(|e| e.waiting_for_slot)
                .map(|e| e.name.clone())
                .collect(),
            current_layer: (state.current_layer_index > 0).then_some(state.current_layer_index),
            archived: state.is_archived(),
        }
    }

    pub async fn utilization(&self) -> WipUtilization {
        SlotAllocator::from_state(&*self.snapshot().await).utilization()
    }

    /// Lowest layer that is not complete.
    pub async fn current_layer(&self) -> Option<u32> {
        LayerPlanner::new(&self.plan, &*self.snapshot().await).current_layer()
    }

    pub async fn is_executable(&self, layer: u32) -> bool {
        LayerPlanner::new(&self.plan, &*self.snapshot().await).is_executable(layer)
    }

    pub async fn layers(&self) -> Vec<LayerView> {
        LayerPlanner::new(&self.plan, &*self.snapshot().await).views()
    }

    /// Reports for every member of `layer`: the sprint's own report when it
    /// wrote one, otherwise one derived from the member epics.
    fn layer_reports(
        &self,
        layer: &Layer,
        state: &WorkflowState,
        reports: &SprintReports,
    ) -> Vec<SprintReport> {
        layer
            .members
            .iter()
            .map(|member| {
                reports
                    .get(member)
                    .cloned()
                    .unwrap_or_else(|| self.derive_report(member, state))
            })
            .collect()
    }

    /// Report for a member that wrote none, resolved against every planned
    /// epic. A member with no sprint definition is a single epic.
    fn derive_report(&self, member: &str, state: &WorkflowState) -> SprintReport {
        let epics: Vec<Option<&Epic>> = match self.plan.sprint(member) {
            Some(sprint) => sprint.epics.iter().map(|n| state.epic(n)).collect(),
            None => vec![state.epic(member)],
        };
        SprintReport::derive_from_epics(member, &epics)
    }

    /// Aggregate a layer's sprint reports and check its hard gates.
    ///
    /// A critical failure marks the layer failed; later layers then refuse to
    /// start until [`clear_failure`](Self::clear_failure) is called.
    pub async fn consolidate(&self, index: u32) -> SchedulerResult<ConsolidationReport> {
        let layer = self
            .plan
            .layer(index)
            .ok_or_else(|| SchedulerError::not_found(EntityKind::Layer, index.to_string()))?;
        let reports = self.reports.load()?;
        let state = self.snapshot().await;
        let member_reports = self.layer_reports(layer, &state, &reports);

        let summary = consolidate(index, &member_reports);
        let critical_failure = first_critical_failure(&member_reports);
        if let Some(failure) = &critical_failure {
            self.mark_layer_failed(index, failure.clone()).await?;
        }

        let layer_status = LayerPlanner::new(&self.plan, &*self.snapshot().await)
            .layer_status(index)
            .unwrap_or(LayerStatus::Pending);
        // Pending sprints are not failures, but they are not successes yet either.
        let all_succeeded =
            summary.all_succeeded && summary.is_finished() && critical_failure.is_none();
        info!(
            layer = index,
            sprints = summary.sprint_count,
            failed = summary.failed_sprints.len(),
            critical = critical_failure.is_some(),
            "layer consolidated"
        );

        Ok(ConsolidationReport {
            summary,
            critical_failure,
            layer_status,
            all_succeeded,
        })
    }

    /// Check one sprint's hard gates. A failure blocks the sprint's layer.
    pub async fn has_critical(&self, sprint: &str) -> SchedulerResult<Option<FailureReport>> {
        let reports = self.reports.load()?;
        let report = match reports.get(sprint) {
            Some(report) => report.clone(),
            None => {
                if self.plan.sprint(sprint).is_none() {
                    return Err(SchedulerError::not_found(EntityKind::Sprint, sprint));
                }
                self.derive_report(sprint, &*self.snapshot().await)
            }
        };

        let failure = has_critical_failure(&report);
        if let (Some(failure), Some(layer)) = (&failure, self.plan.layer_of_sprint(sprint)) {
            self.mark_layer_failed(layer, failure.clone()).await?;
        }
        Ok(failure)
    }

    async fn mark_layer_failed(&self, layer: u32, failure: FailureReport) -> SchedulerResult<()> {
        self.mutate(|state, records| {
            if state.failed_layers.contains_key(&layer) {
                return Ok(());
            }
            warn!(layer, failure = %failure, "layer blocked");
            records.push(
                JournalRecord::new("layer_failed")
                    .with_layer(layer)
                    .with_detail(failure.to_string()),
            );
            state.failed_layers.insert(layer, failure);
            Ok(())
        })
        .await
    }

    /// Operator decision: unblock a failed layer. Returns whether it was
    /// failed.
    pub async fn clear_failure(&self, layer: u32) -> SchedulerResult<bool> {
        let known = self.plan.layer(layer).is_some()
            || self.snapshot().await.failed_layers.contains_key(&layer);
        if !known {
            return Err(SchedulerError::not_found(EntityKind::Layer, layer.to_string()));
        }
        self.mutate(|state, records| {
            let Some(failure) = state.failed_layers.remove(&layer) else {
                return Ok(false);
            };
            info!(layer, failure = %failure, "layer failure cleared");
            records.push(
                JournalRecord::new("clear_failure")
                    .with_layer(layer)
                    .with_detail(failure.to_string()),
            );
            Ok(true)
        })
        .await
    }

    /// Journaled transitions of `epic`, oldest first. Empty without a journal.
    pub async fn history(&self, name: &str) -> SchedulerResult<Vec<JournalRecord>> {
        match &self.journal {
            Some(journal) => Ok(journal.history(name)?),
            None => Ok(Vec::new()),
        }
    }
}

fn queue(
    state: &mut WorkflowState,
    records: &mut Vec<JournalRecord>,
    name: &str,
    mode: StartMode,
    reason: QueueReason,
) -> SchedulerResult<AssignOutcome> {
    let epic = state.require_epic_mut(name)?;
    if mode == StartMode::Assign {
        epic.waiting_for_slot = true;
    }
    info!(epic = name, reason = %reason, "{} queued", mode.operation());
    records.push(
        JournalRecord::new(mode.operation())
            .with_epic(name)
            .with_detail(format!("queued: {}", reason)),
    );
    Ok(AssignOutcome::Queued {
        epic: epic.clone(),
        reason,
    })
}
