//! Sprint plan model: ordered layers and the sprints they name.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parser::parse_markdown_plan;
use super::PlanError;
use crate::store::DocumentFormat;

fn default_parallelizable() -> bool {
    true
}

/// An ordered execution group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// 1-based position in the plan.
    pub index: u32,
    /// Sprint or epic identifiers.
    pub members: Vec<String>,
    /// When false, members must be implemented one at a time.
    #[serde(default = "default_parallelizable")]
    pub parallelizable: bool,
}

impl Layer {
    pub fn new(index: u32, members: Vec<String>, parallelizable: bool) -> Self {
        Self {
            index,
            members,
            parallelizable,
        }
    }
}

/// A named group of epics evaluated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintDefinition {
    pub name: String,
    #[serde(default)]
    pub epics: Vec<String>,
}

/// The plan document: layers in order plus sprint membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintPlan {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub sprints: Vec<SprintDefinition>,
}

impl SprintPlan {
    pub fn new(layers: Vec<Layer>, sprints: Vec<SprintDefinition>) -> Result<Self, PlanError> {
        let plan = Self { layers, sprints };
        plan.validate()?;
        Ok(plan)
    }

    /// Load a plan from markdown (`.md`), JSON or YAML. A missing file is an
    /// empty plan.
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no sprint plan; scheduling without layers");
                return Ok(Self::default());
            }
            Err(err) => return Err(PlanError::Io(err)),
        };

        let is_markdown = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("md") | Some("markdown")
        );
        let plan: SprintPlan = if is_markdown {
            parse_markdown_plan(&content)?
        } else {
            DocumentFormat::from_path(path).decode(&content)?
        };
        plan.validate()?;
        debug!(layers = plan.layers.len(), sprints = plan.sprints.len(), "loaded sprint plan");
        Ok(plan)
    }

    /// Layers numbered 1..N in order, each epic in at most one layer.
    pub fn validate(&self) -> Result<(), PlanError> {
        for (position, layer) in self.layers.iter().enumerate() {
            let expected = position as u32 + 1;
            if layer.index != expected {
                return Err(PlanError::Invalid(format!(
                    "layer {} found where layer {} was expected",
                    layer.index, expected
                )));
            }
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            for epic in self.resolve_epics(layer) {
                if !seen.insert(epic.clone()) {
                    return Err(PlanError::Invalid(format!(
                        "epic '{}' appears in more than one layer slot",
                        epic
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn layer(&self, index: u32) -> Option<&Layer> {
        self.layers.iter().find(|l| l.index == index)
    }

    pub fn sprint(&self, name: &str) -> Option<&SprintDefinition> {
        self.sprints.iter().find(|s| s.name == name)
    }

    /// Epic names a layer covers, expanding sprint members.
    pub fn resolve_epics(&self, layer: &Layer) -> Vec<String> {
        layer
            .members
            .iter()
            .flat_map(|member| match self.sprint(member) {
                Some(sprint) => sprint.epics.clone(),
                None => vec![member.clone()],
            })
            .collect()
    }

    /// Layer an epic belongs to, directly or through its sprint.
    pub fn layer_of_epic(&self, epic: &str) -> Option<u32> {
        self.layers
            .iter()
            .find(|layer| self.resolve_epics(layer).iter().any(|e| e == epic))
            .map(|layer| layer.index)
    }

    /// Layer that lists `sprint` as a member.
    pub fn layer_of_sprint(&self, sprint: &str) -> Option<u32> {
        self.layers
            .iter()
            .find(|layer| layer.members.iter().any(|m| m == sprint))
            .map(|layer| layer.index)
    }
}
