use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::epic::EpicState;

/// Current journal schema version.
pub const JOURNAL_SCHEMA_VERSION: u32 = 1;

/// One applied facade mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalRecord {
    pub schema_version: u32,
    pub recorded_at: DateTime<Utc>,
    /// Facade operation name, e.g. "assign" or "park".
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<EpicState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<EpicState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JournalRecord {
    /// Create a record stamped with the current time.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            schema_version: JOURNAL_SCHEMA_VERSION,
            recorded_at: Utc::now(),
            operation: operation.into(),
            epic: None,
            from: None,
            to: None,
            agent: None,
            layer: None,
            detail: None,
        }
    }

    pub fn with_epic(mut self, epic: impl Into<String>) -> Self {
        self.epic = Some(epic.into());
        self
    }

    pub fn with_transition(mut self, from: EpicState, to: EpicState) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
