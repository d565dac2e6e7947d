//! Scheduler configuration.
//!
//! Values come from built-in defaults, then an optional `epicflow.toml`, then
//! `EPICFLOW_*` environment variables (e.g. `EPICFLOW_MAX_PER_AGENT=2`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::journal::DEFAULT_RETENTION_DAYS;
use crate::workflow::DEFAULT_MAX_PER_AGENT;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "epicflow.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "EPICFLOW";

const DEFAULT_STATE_PATH: &str = ".epicflow/workflow-state.json";
const DEFAULT_PLAN_PATH: &str = ".epicflow/sprint-plan.md";
const DEFAULT_REPORTS_PATH: &str = ".epicflow/sprint-reports.json";
const DEFAULT_JOURNAL_DIR: &str = ".epicflow/journal";

/// Paths and limits for one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Workflow state document (JSON, or YAML by extension).
    pub state_path: PathBuf,
    /// Sprint plan (markdown, JSON or YAML).
    pub plan_path: PathBuf,
    /// Sprint reports written by external collaborators.
    pub reports_path: PathBuf,
    /// Directory holding the transition journal.
    pub journal_dir: PathBuf,
    pub journal_enabled: bool,
    /// 0 disables pruning.
    pub journal_retention_days: u64,
    /// Applied only when a fresh workflow state is created.
    pub max_per_agent: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            plan_path: PathBuf::from(DEFAULT_PLAN_PATH),
            reports_path: PathBuf::from(DEFAULT_REPORTS_PATH),
            journal_dir: PathBuf::from(DEFAULT_JOURNAL_DIR),
            journal_enabled: true,
            journal_retention_days: DEFAULT_RETENTION_DAYS,
            max_per_agent: DEFAULT_MAX_PER_AGENT,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `file` (or `epicflow.toml` when `None`) layered under the
    /// environment. A missing file is not an error.
    pub fn load(file: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let defaults = Self::default();
        let file = file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

        let settings = ::config::Config::builder()
            .set_default("state_path", path_str(&defaults.state_path))?
            .set_default("plan_path", path_str(&defaults.plan_path))?
            .set_default("reports_path", path_str(&defaults.reports_path))?
            .set_default("journal_dir", path_str(&defaults.journal_dir))?
            .set_default("journal_enabled", defaults.journal_enabled)?
            .set_default("journal_retention_days", defaults.journal_retention_days)?
            .set_default("max_per_agent", u64::from(defaults.max_per_agent))?
            .add_source(::config::File::from(file).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let mut loaded: SchedulerConfig = settings.try_deserialize()?;
        loaded.max_per_agent = loaded.max_per_agent.max(1);
        Ok(loaded)
    }

    /// Resolve every relative path against `base`.
    pub fn with_base_dir(mut self, base: &Path) -> Self {
        for path in [
            &mut self.state_path,
            &mut self.plan_path,
            &mut self.reports_path,
            &mut self.journal_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    pub fn with_plan_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_path = path.into();
        self
    }

    pub fn with_reports_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.reports_path = path.into();
        self
    }

    pub fn with_journal_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_dir = path.into();
        self
    }

    pub fn with_journal_enabled(mut self, enabled: bool) -> Self {
        self.journal_enabled = enabled;
        self
    }

    pub fn with_journal_retention_days(mut self, days: u64) -> Self {
        self.journal_retention_days = days;
        self
    }

    pub fn with_max_per_agent(mut self, max: u32) -> Self {
        self.max_per_agent = max.max(1);
        self
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
