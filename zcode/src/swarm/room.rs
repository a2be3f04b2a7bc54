//! Rooms, room codes, and the room manager.
//!
//! A room is identified by its human-readable code
//! (`{adjective}-{animal}-{4 hex}`), which doubles as its id and join
//! token. The manager owns room objects and indexes them by id and code.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use super::role::Role;
use crate::error::RoomError;

const ADJECTIVES: [&str; 20] = [
    "amber", "bold", "calm", "deft", "eager", "fuzzy", "gentle", "happy", "icy", "jolly", "keen",
    "lively", "mellow", "nimble", "odd", "proud", "quiet", "rapid", "sly", "tidy",
];

const ANIMALS: [&str; 20] = [
    "badger", "crane", "dolphin", "eagle", "ferret", "gecko", "heron", "ibis", "jackal", "koala",
    "lemur", "marmot", "newt", "otter", "panda", "quokka", "raven", "stoat", "tapir", "walrus",
];

/// Generate a room code: `{adjective}-{animal}-{4 hex}`, lower-case.
#[must_use]
pub fn generate_room_code() -> String {
    let adjective = ADJECTIVES[fastrand::usize(..ADJECTIVES.len())];
    let animal = ANIMALS[fastrand::usize(..ANIMALS.len())];
    format!("{adjective}-{animal}-{:04x}", fastrand::u16(..))
}

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    /// Open for collaboration.
    Active,
    /// Work is suspended.
    Paused,
    /// Work finished; room readable.
    Completed,
    /// No further joins or sends.
    Closed,
}

/// Room configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Roles allowed to join; empty means all occupant roles.
    #[serde(default)]
    pub allowed_roles: Vec<Role>,
    /// Whether executor actions need approval.
    #[serde(default)]
    pub require_approval: bool,
    /// Default autopilot setting for joining agents.
    #[serde(default = "default_true")]
    pub auto_pilot: bool,
    /// Maximum number of occupants.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Persisted message history cap.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

const fn default_true() -> bool {
    true
}
const fn default_max_agents() -> usize {
    10
}
const fn default_history_limit() -> usize {
    1000
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            allowed_roles: Vec::new(),
            require_approval: false,
            auto_pilot: true,
            max_agents: default_max_agents(),
            history_limit: default_history_limit(),
        }
    }
}

/// An agent occupying a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// The occupied role.
    pub role: Role,
    /// Session that joined.
    pub session_id: String,
    /// When the agent joined.
    pub joined_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub last_seen: DateTime<Utc>,
    /// Provider the agent runs on, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model the agent runs, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug)]
struct RoomInner {
    state: RoomState,
    agents: HashMap<Role, AgentInfo>,
}

/// A collaboration room.
#[derive(Debug)]
pub struct Room {
    /// Room id (equal to the code).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Human-readable join code.
    pub code: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Role that created the room.
    pub created_by: Role,
    /// Configuration.
    pub config: RoomConfig,
    inner: RwLock<RoomInner>,
}

impl Room {
    /// Create a room with a fresh code.
    #[must_use]
    pub fn new(name: impl Into<String>, created_by: Role, config: RoomConfig) -> Self {
        Self::with_code(generate_room_code(), name, created_by, config)
    }

    /// Create a room with a known code (joining a remote room).
    #[must_use]
    pub fn with_code(
        code: impl Into<String>,
        name: impl Into<String>,
        created_by: Role,
        config: RoomConfig,
    ) -> Self {
        let code = code.into();
        Self {
            id: code.clone(),
            name: name.into(),
            code,
            created_at: Utc::now(),
            created_by,
            config,
            inner: RwLock::new(RoomInner {
                state: RoomState::Active,
                agents: HashMap::new(),
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> RoomState {
        self.inner.read().await.state
    }

    /// Add an agent under a role.
    ///
    /// Fails, in order, when the room is closed, the role is taken, the
    /// role is excluded by config, or the room is at capacity.
    pub async fn add_agent(&self, role: Role, session_id: &str) -> Result<(), RoomError> {
        if role.is_broadcast() {
            return Err(RoomError::InvalidRole(role.to_string()));
        }
        let mut inner = self.inner.write().await;
        if inner.state == RoomState::Closed {
            return Err(RoomError::Closed);
        }
        if inner.agents.contains_key(&role) {
            return Err(RoomError::RoleTaken(role.to_string()));
        }
        if !self.config.allowed_roles.is_empty() && !self.config.allowed_roles.contains(&role) {
            return Err(RoomError::RoleNotAllowed(role.to_string()));
        }
        if inner.agents.len() >= self.config.max_agents {
            return Err(RoomError::Full);
        }

        let now = Utc::now();
        inner.agents.insert(
            role,
            AgentInfo {
                role,
                session_id: session_id.to_owned(),
                joined_at: now,
                last_seen: now,
                provider: None,
                model: None,
            },
        );
        info!(room = %self.code, %role, "Agent joined room");
        Ok(())
    }

    /// Remove an agent.
    pub async fn remove_agent(&self, role: Role) -> Result<(), RoomError> {
        let mut inner = self.inner.write().await;
        if inner.agents.remove(&role).is_none() {
            return Err(RoomError::RoleNotFound(role.to_string()));
        }
        info!(room = %self.code, %role, "Agent left room");
        Ok(())
    }

    /// Refresh an agent's last-seen timestamp.
    pub async fn update_agent_last_seen(&self, role: Role) -> Result<(), RoomError> {
        let mut inner = self.inner.write().await;
        match inner.agents.get_mut(&role) {
            Some(agent) => {
                agent.last_seen = Utc::now();
                Ok(())
            }
            None => Err(RoomError::RoleNotFound(role.to_string())),
        }
    }

    /// Snapshot of the current occupants.
    pub async fn agents(&self) -> Vec<AgentInfo> {
        let mut agents: Vec<AgentInfo> = self.inner.read().await.agents.values().cloned().collect();
        agents.sort_by_key(|a| a.role);
        agents
    }

    /// Whether a role is occupied.
    pub async fn has_agent(&self, role: Role) -> bool {
        self.inner.read().await.agents.contains_key(&role)
    }

    /// Number of occupants.
    pub async fn agent_count(&self) -> usize {
        self.inner.read().await.agents.len()
    }

    /// Whether a role may drive room state transitions.
    ///
    /// Only the creator and the human operator qualify.
    fn authorize_control(&self, role: Role) -> Result<(), RoomError> {
        if role == self.created_by || role == Role::Human {
            Ok(())
        } else {
            Err(RoomError::NotOrchestrator)
        }
    }

    /// Suspend the room.
    pub async fn pause(&self, acting: Role) -> Result<(), RoomError> {
        self.authorize_control(acting)?;
        self.transition(RoomState::Paused).await
    }

    /// Resume the room.
    pub async fn resume(&self, acting: Role) -> Result<(), RoomError> {
        self.authorize_control(acting)?;
        self.transition(RoomState::Active).await
    }

    /// Mark the room completed.
    pub async fn complete(&self, acting: Role) -> Result<(), RoomError> {
        self.authorize_control(acting)?;
        self.transition(RoomState::Completed).await
    }

    /// Close the room permanently.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        inner.state = RoomState::Closed;
        info!(room = %self.code, "Room closed");
    }

    async fn transition(&self, to: RoomState) -> Result<(), RoomError> {
        let mut inner = self.inner.write().await;
        if inner.state == RoomState::Closed {
            return Err(RoomError::Closed);
        }
        inner.state = to;
        Ok(())
    }
}

/// Owns rooms, indexed by id and by code.
#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    codes: RwLock<HashMap<String, String>>,
}

impl RoomManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with a collision-free code.
    pub async fn create_room(
        &self,
        name: &str,
        created_by: Role,
        config: RoomConfig,
    ) -> Arc<Room> {
        loop {
            let room = Arc::new(Room::new(name, created_by, config.clone()));
            let mut rooms = self.rooms.write().await;
            if rooms.contains_key(&room.id) {
                continue;
            }
            let mut codes = self.codes.write().await;
            rooms.insert(room.id.clone(), Arc::clone(&room));
            codes.insert(room.code.clone(), room.id.clone());
            info!(room = %room.code, "Room created");
            return room;
        }
    }

    /// Register an externally constructed room (join placeholder).
    pub async fn insert_room(&self, room: Arc<Room>) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.id) {
            return Err(RoomError::AlreadyExists(room.code.clone()));
        }
        let mut codes = self.codes.write().await;
        codes.insert(room.code.clone(), room.id.clone());
        rooms.insert(room.id.clone(), room);
        Ok(())
    }

    /// Look up a room by id.
    pub async fn get(&self, id: &str) -> Result<Arc<Room>, RoomError> {
        self.rooms
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(id.to_owned()))
    }

    /// Look up a room by its join code.
    pub async fn get_by_code(&self, code: &str) -> Result<Arc<Room>, RoomError> {
        let id = self
            .codes
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.to_owned()))?;
        self.get(&id).await
    }

    /// Delete a room, removing both indexes.
    pub async fn delete(&self, id: &str) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.remove(id).ok_or_else(|| RoomError::NotFound(id.to_owned()))?;
        self.codes.write().await.remove(&room.code);
        Ok(())
    }

    /// Codes of every managed room, sorted.
    pub async fn list_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.codes.read().await.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Number of managed rooms.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Whether no rooms are managed.
    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
