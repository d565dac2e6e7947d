//! `epicflow` command line: a thin wrapper over the scheduler facade.

mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use epicflow::{EpicState, ListFilter, Scheduler, SchedulerConfig, SchedulerError};

use output::Printer;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "EPICFLOW_LOG";

/// Recorded as `blockedBy` when `park` names no blocker.
const UNSPECIFIED_BLOCKER: &str = "unspecified";

#[derive(Parser, Debug)]
#[command(name = "epicflow", version, about = "WIP-limited epic workflow scheduler")]
struct Cli {
    /// Config file (default: ./epicflow.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workflow state document
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Sprint plan (markdown, JSON or YAML)
    #[arg(long, global = true)]
    plan: Option<PathBuf>,

    /// Sprint reports document
    #[arg(long, global = true)]
    reports: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new planned epic
    Add {
        epic: String,
        #[arg(long, default_value_t = 0)]
        tasks: u32,
    },
    /// Freeze an epic's contracts
    Lock { epic: String },
    /// Start a contracts-locked epic on an agent
    Assign { epic: String, agent: String },
    /// Pause an implementing epic and free its slot
    Park {
        epic: String,
        reason: String,
        /// Who or what the epic waits on
        blocked_by: Option<String>,
    },
    /// Bring a parked epic back on an agent
    Resume { epic: String, agent: String },
    /// Record task counters for an epic
    Progress { epic: String, done: u32, total: u32 },
    /// Submit a finished epic for review
    Review { epic: String },
    /// Mark a reviewed epic integrated
    Integrate { epic: String },
    /// Release an integrated epic
    Release { epic: String },
    /// Give up on an epic; it ends released with a failure
    Abandon { epic: String, reason: String },
    /// Show epics grouped by state with WIP utilization
    List {
        #[arg(long)]
        state: Option<EpicState>,
        #[arg(long)]
        agent: Option<String>,
        /// Only epics waiting for a slot
        #[arg(long)]
        waiting: bool,
    },
    /// Show every layer of the sprint plan
    Layers,
    /// Aggregate a layer's sprint reports
    Consolidate { layer: u32 },
    /// Check one sprint's CI, security and deployment gates
    HasCritical { sprint: String },
    /// Unblock a failed layer
    ClearFailure { layer: u32 },
    /// Show journaled transitions of an epic
    History { epic: String },
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Success = 0,
    Invalid = 1,
    /// Denied for now; retry later.
    Queued = 3,
    /// Blocked on a critical failure; do not retry.
    Blocked = 4,
    Internal = 5,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let printer = Printer::new(cli.json);
    match run(cli, &printer).await {
        Ok(exit) => exit.into(),
        Err(err) => {
            let exit = classify(&err);
            printer.error(&err, exit);
            exit.into()
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn classify(err: &anyhow::Error) -> Exit {
    match err.downcast_ref::<SchedulerError>() {
        Some(SchedulerError::CriticalFailureDetected(_)) => Exit::Blocked,
        Some(e) if e.is_validation() => Exit::Invalid,
        _ => Exit::Internal,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SchedulerConfig> {
    let mut config = SchedulerConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(state) = &cli.state {
        config = config.with_state_path(state);
    }
    if let Some(plan) = &cli.plan {
        config = config.with_plan_path(plan);
    }
    if let Some(reports) = &cli.reports {
        config = config.with_reports_path(reports);
    }
    debug!(?config, "configuration loaded");
    Ok(config)
}

async fn run(cli: Cli, printer: &Printer) -> anyhow::Result<Exit> {
    let config = load_config(&cli)?;
    let scheduler = Scheduler::open(&config).context("failed to open workflow")?;

    match cli.command {
        Command::Add { epic, tasks } => {
            printer.epic("Added", &scheduler.add_epic(&epic, tasks).await?);
        }
        Command::Lock { epic } => {
            printer.epic("Contracts locked", &scheduler.lock_contracts(&epic).await?);
        }
        Command::Assign { epic, agent } => {
            return Ok(printer.assignment(&scheduler.assign(&epic, &agent).await?));
        }
        Command::Park {
            epic,
            reason,
            blocked_by,
        } => {
            let blocked_by = blocked_by.as_deref().unwrap_or(UNSPECIFIED_BLOCKER);
            printer.epic("Parked", &scheduler.park(&epic, &reason, blocked_by).await?);
        }
        Command::Resume { epic, agent } => {
            return Ok(printer.assignment(&scheduler.resume(&epic, &agent).await?));
        }
        Command::Progress { epic, done, total } => {
            printer.epic(
                "Progress recorded",
                &scheduler.report_progress(&epic, done, total).await?,
            );
        }
        Command::Review { epic } => {
            printer.epic("In review", &scheduler.submit_for_review(&epic).await?);
        }
        Command::Integrate { epic } => {
            printer.epic("Integrated", &scheduler.integrate(&epic).await?);
        }
        Command::Release { epic } => {
            printer.epic("Released", &scheduler.release(&epic).await?);
        }
        Command::Abandon { epic, reason } => {
            printer.epic("Abandoned", &scheduler.abandon(&epic, &reason).await?);
        }
        Command::List {
            state,
            agent,
            waiting,
        } => {
            let filter = ListFilter {
                state,
                agent,
                waiting_only: waiting,
            };
            printer.listing(&scheduler.list(&filter).await);
        }
        Command::Layers => printer.layers(&scheduler.layers().await),
        Command::Consolidate { layer } => {
            return Ok(printer.consolidation(&scheduler.consolidate(layer).await?));
        }
        Command::HasCritical { sprint } => {
            let failure = scheduler.has_critical(&sprint).await?;
            return Ok(printer.critical(&sprint, failure.as_ref()));
        }
        Command::ClearFailure { layer } => {
            printer.cleared(layer, scheduler.clear_failure(layer).await?);
        }
        Command::History { epic } => printer.history(&epic, &scheduler.history(&epic).await?),
    }
    Ok(Exit::Success)
}
