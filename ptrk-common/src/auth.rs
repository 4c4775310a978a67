//! Caller identity as supplied by the permission service
//!
//! The engine does not look up roles. The role arrives with the request from
//! the upstream permission check and is only compared against the set of
//! roles allowed to manage templates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    ProjectManager,
    Foreman,
    QcInspector,
    Viewer,
}

impl Role {
    /// Roles allowed to edit weights and clone templates
    pub fn may_manage_templates(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin | Role::ProjectManager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::ProjectManager => "project_manager",
            Role::Foreman => "foreman",
            Role::QcInspector => "qc_inspector",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "project_manager" | "pm" => Ok(Role::ProjectManager),
            "foreman" => Ok(Role::Foreman),
            "qc_inspector" => Ok(Role::QcInspector),
            "viewer" => Ok(Role::Viewer),
            other => Err(Error::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

/// Who is making a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            role,
        }
    }

    pub fn ensure_may_manage_templates(&self) -> Result<()> {
        if self.role.may_manage_templates() {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "{} ({}) may not modify milestone templates",
                self.id, self.role
            )))
        }
    }
}
