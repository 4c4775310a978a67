//! Milestone weight templates
//!
//! A template is the ordered list of milestones (with weights) that make up a
//! component type's progress. Templates exist at two scopes: the system
//! default for every component type, and an optional per-project override
//! that fully replaces the system template for that project.

pub mod seed;
pub mod store;
pub mod validator;

pub use store::TemplateStore;
pub use validator::{apply_weights, validate, WeightProblem, WeightViolation};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Storage key used for system-scope rows
pub const SYSTEM_SCOPE_KEY: &str = "system";

/// Which tier a template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "project_id", rename_all = "snake_case")]
pub enum TemplateScope {
    System,
    Project(Uuid),
}

impl TemplateScope {
    /// Value stored in the `scope` column
    pub fn storage_key(&self) -> String {
        match self {
            TemplateScope::System => SYSTEM_SCOPE_KEY.to_string(),
            TemplateScope::Project(id) => id.to_string(),
        }
    }

    pub fn from_storage_key(key: &str) -> Result<Self> {
        if key == SYSTEM_SCOPE_KEY {
            return Ok(TemplateScope::System);
        }
        Uuid::parse_str(key)
            .map(TemplateScope::Project)
            .map_err(|e| Error::Internal(format!("Invalid template scope '{}': {}", key, e)))
    }

    /// Effective-template lookup chain, most specific first
    pub fn lookup_chain(project_id: Uuid) -> [TemplateScope; 2] {
        [TemplateScope::Project(project_id), TemplateScope::System]
    }
}

impl fmt::Display for TemplateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateScope::System => write!(f, "system"),
            TemplateScope::Project(id) => write!(f, "project {}", id),
        }
    }
}

/// One milestone of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDef {
    pub name: String,
    pub weight: i32,
    /// Partial milestones track a 0-100 fraction instead of done/not-done
    pub is_partial: bool,
}

impl MilestoneDef {
    pub fn discrete(name: &str, weight: i32) -> Self {
        Self {
            name: name.to_string(),
            weight,
            is_partial: false,
        }
    }

    pub fn partial(name: &str, weight: i32) -> Self {
        Self {
            name: name.to_string(),
            weight,
            is_partial: true,
        }
    }
}

/// A (milestone, weight) pair as entered by an operator or recorded in the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub milestone: String,
    pub weight: i32,
}

impl WeightEntry {
    pub fn new(milestone: &str, weight: i32) -> Self {
        Self {
            milestone: milestone.to_string(),
            weight,
        }
    }
}

/// A stored template version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub scope: TemplateScope,
    pub component_type: String,
    /// Monotonic per (scope, component_type); only one version is active
    pub version: i64,
    pub milestones: Vec<MilestoneDef>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn weights(&self) -> Vec<WeightEntry> {
        self.milestones
            .iter()
            .map(|m| WeightEntry::new(&m.name, m.weight))
            .collect()
    }

    pub fn milestone(&self, name: &str) -> Option<&MilestoneDef> {
        self.milestones.iter().find(|m| m.name == name)
    }

    /// Version of the project override this template represents, if any
    pub fn project_version(&self) -> Option<i64> {
        match self.scope {
            TemplateScope::Project(_) => Some(self.version),
            TemplateScope::System => None,
        }
    }
}

/// Position of a (project, component type) pair in the override lifecycle
///
/// `NoProjectOverride -> ProjectActive(1) -> ProjectActive(2) -> ...`; there is
/// no transition back to `NoProjectOverride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TemplateState {
    NoProjectOverride,
    ProjectActive { version: i64 },
}

impl TemplateState {
    pub fn active_version(&self) -> Option<i64> {
        match self {
            TemplateState::NoProjectOverride => None,
            TemplateState::ProjectActive { version } => Some(*version),
        }
    }
}
