//! Collaborator roles and their capability definitions.
//!
//! Roles form a closed enumeration; `ALL` is a broadcast address, not an
//! occupant. Capabilities follow the standing rules: `HUMAN` can do
//! everything, `ORCH` initiates and approves, executors carry an
//! `ask_before` list naming who they defer to.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RoomError;

/// A collaborator identity within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Orchestrator: coordinates the room.
    #[serde(rename = "ORCH")]
    Orch,
    /// Solution architect.
    #[serde(rename = "SA")]
    Sa,
    /// Backend developer.
    #[serde(rename = "BE_DEV")]
    BeDev,
    /// Frontend developer.
    #[serde(rename = "FE_DEV")]
    FeDev,
    /// Quality assurance.
    #[serde(rename = "QA")]
    Qa,
    /// DevOps engineer.
    #[serde(rename = "DEVOPS")]
    Devops,
    /// Database administrator.
    #[serde(rename = "DBA")]
    Dba,
    /// Security engineer.
    #[serde(rename = "SEC")]
    Sec,
    /// The human operator.
    #[serde(rename = "HUMAN")]
    Human,
    /// Broadcast address; never an occupant.
    #[serde(rename = "ALL")]
    All,
}

impl Role {
    /// Every role, including the broadcast address.
    pub const ALL_ROLES: [Self; 10] = [
        Self::Orch,
        Self::Sa,
        Self::BeDev,
        Self::FeDev,
        Self::Qa,
        Self::Devops,
        Self::Dba,
        Self::Sec,
        Self::Human,
        Self::All,
    ];

    /// The roles that can occupy a room (everything but `ALL`).
    pub const OCCUPANTS: [Self; 9] = [
        Self::Orch,
        Self::Sa,
        Self::BeDev,
        Self::FeDev,
        Self::Qa,
        Self::Devops,
        Self::Dba,
        Self::Sec,
        Self::Human,
    ];

    /// The wire spelling of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Orch => "ORCH",
            Self::Sa => "SA",
            Self::BeDev => "BE_DEV",
            Self::FeDev => "FE_DEV",
            Self::Qa => "QA",
            Self::Devops => "DEVOPS",
            Self::Dba => "DBA",
            Self::Sec => "SEC",
            Self::Human => "HUMAN",
            Self::All => "ALL",
        }
    }

    /// Whether this is the broadcast address.
    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ORCH" => Ok(Self::Orch),
            "SA" => Ok(Self::Sa),
            "BE_DEV" => Ok(Self::BeDev),
            "FE_DEV" => Ok(Self::FeDev),
            "QA" => Ok(Self::Qa),
            "DEVOPS" => Ok(Self::Devops),
            "DBA" => Ok(Self::Dba),
            "SEC" => Ok(Self::Sec),
            "HUMAN" => Ok(Self::Human),
            "ALL" => Ok(Self::All),
            other => Err(RoomError::InvalidRole(other.to_owned())),
        }
    }
}

/// Per-role capabilities and prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// The role being defined.
    pub role: Role,
    /// May start new work in the room.
    pub can_initiate: bool,
    /// May approve review requests.
    pub can_approve: bool,
    /// May execute tasks.
    pub can_execute: bool,
    /// Roles to consult before acting.
    #[serde(default)]
    pub ask_before: Vec<Role>,
    /// Tools this role may use; empty means all.
    #[serde(default)]
    pub tools: Vec<String>,
    /// System prompt fragment for agents joining under this role.
    #[serde(default)]
    pub system_prompt: String,
}

impl RoleDefinition {
    fn executor(role: Role, ask_before: Vec<Role>) -> Self {
        Self {
            role,
            can_initiate: false,
            can_approve: false,
            can_execute: true,
            ask_before,
            tools: Vec::new(),
            system_prompt: String::new(),
        }
    }
}

/// Registry of role definitions keyed by role.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    definitions: HashMap<Role, RoleDefinition>,
}

impl RoleRegistry {
    /// Build the registry with the standing capability table.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut definitions = HashMap::new();

        definitions.insert(
            Role::Human,
            RoleDefinition {
                role: Role::Human,
                can_initiate: true,
                can_approve: true,
                can_execute: true,
                ask_before: Vec::new(),
                tools: Vec::new(),
                system_prompt: String::new(),
            },
        );
        definitions.insert(
            Role::Orch,
            RoleDefinition {
                role: Role::Orch,
                can_initiate: true,
                can_approve: true,
                can_execute: false,
                ask_before: vec![Role::Human],
                tools: Vec::new(),
                system_prompt: String::new(),
            },
        );
        definitions.insert(
            Role::Sa,
            RoleDefinition::executor(Role::Sa, vec![Role::Orch]),
        );
        definitions.insert(
            Role::BeDev,
            RoleDefinition::executor(Role::BeDev, vec![Role::Orch, Role::Sa]),
        );
        definitions.insert(
            Role::FeDev,
            RoleDefinition::executor(Role::FeDev, vec![Role::Orch, Role::Sa]),
        );
        definitions.insert(
            Role::Qa,
            RoleDefinition::executor(Role::Qa, vec![Role::Orch]),
        );
        definitions.insert(
            Role::Devops,
            RoleDefinition::executor(Role::Devops, vec![Role::Orch, Role::Sec]),
        );
        definitions.insert(
            Role::Dba,
            RoleDefinition::executor(Role::Dba, vec![Role::Orch, Role::Sa]),
        );
        definitions.insert(
            Role::Sec,
            RoleDefinition::executor(Role::Sec, vec![Role::Orch]),
        );

        Self { definitions }
    }

    /// Look up a role definition.
    #[must_use]
    pub fn get(&self, role: Role) -> Option<&RoleDefinition> {
        self.definitions.get(&role)
    }

    /// Replace or add a definition (loaded from role files by the embedder).
    pub fn set(&mut self, definition: RoleDefinition) {
        self.definitions.insert(definition.role, definition);
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
