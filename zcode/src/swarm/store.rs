//! Room persistence: one JSON snapshot per room code.
//!
//! Snapshots live at `{dataDir}/{code}.json`; the default data directory
//! is `{home}/.zcode/swarm`. Message history is truncated from the front
//! to `max_messages` (oldest dropped first).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::message::SwarmMessage;
use super::room::{AgentInfo, Room};
use crate::error::StoreError;

/// Default cap on persisted messages per room.
pub const DEFAULT_MAX_MESSAGES: usize = 1000;

/// The on-disk shape of a room snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRoom {
    /// Room id.
    pub room_id: String,
    /// Display name.
    pub name: String,
    /// Join code.
    pub code: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
    /// Message history, oldest first.
    #[serde(default)]
    pub messages: Vec<SwarmMessage>,
    /// Occupants at snapshot time.
    #[serde(default)]
    pub agents: Vec<AgentInfo>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Append-only room snapshot store.
#[derive(Debug, Clone)]
pub struct RoomStore {
    data_dir: PathBuf,
    max_messages: usize,
}

impl RoomStore {
    /// Create a store rooted at `data_dir`, creating it if needed.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            max_messages: DEFAULT_MAX_MESSAGES,
        })
    }

    /// Create a store at the default location (`{home}/.zcode/swarm`).
    pub fn default_location() -> Result<Self, StoreError> {
        let base = directories::BaseDirs::new().ok_or(StoreError::NoDataDir)?;
        Self::new(base.home_dir().join(".zcode").join("swarm"))
    }

    /// Override the message cap.
    #[must_use]
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// The store's root directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, code: &str) -> PathBuf {
        self.data_dir.join(format!("{code}.json"))
    }

    fn truncate(&self, snapshot: &mut PersistedRoom) {
        if snapshot.messages.len() > self.max_messages {
            let excess = snapshot.messages.len() - self.max_messages;
            snapshot.messages.drain(..excess);
        }
    }

    fn write(&self, snapshot: &PersistedRoom) -> Result<(), StoreError> {
        let path = self.path_for(&snapshot.code);
        let payload = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&path, payload)?;
        debug!(path = %path.display(), messages = snapshot.messages.len(), "Room snapshot written");
        Ok(())
    }

    /// Snapshot a room with its current occupants.
    pub async fn save_room(&self, room: &Room) -> Result<(), StoreError> {
        let mut snapshot = match self.load(&room.code) {
            Ok(existing) => existing,
            Err(StoreError::Missing(_)) => PersistedRoom {
                room_id: room.id.clone(),
                name: room.name.clone(),
                code: room.code.clone(),
                created_at: room.created_at,
                updated_at: Utc::now(),
                messages: Vec::new(),
                agents: Vec::new(),
                metadata: Map::new(),
            },
            Err(e) => return Err(e),
        };
        snapshot.agents = room.agents().await;
        snapshot.updated_at = Utc::now();
        self.truncate(&mut snapshot);
        self.write(&snapshot)
    }

    /// Append a message to a room's history.
    pub fn append_message(&self, code: &str, message: &SwarmMessage) -> Result<(), StoreError> {
        let mut snapshot = match self.load(code) {
            Ok(existing) => existing,
            Err(StoreError::Missing(_)) => PersistedRoom {
                room_id: code.to_owned(),
                name: code.to_owned(),
                code: code.to_owned(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                messages: Vec::new(),
                agents: Vec::new(),
                metadata: Map::new(),
            },
            Err(e) => return Err(e),
        };
        snapshot.messages.push(message.clone());
        snapshot.updated_at = Utc::now();
        self.truncate(&mut snapshot);
        self.write(&snapshot)
    }

    /// Load a room snapshot by code.
    pub fn load(&self, code: &str) -> Result<PersistedRoom, StoreError> {
        let path = self.path_for(code);
        if !path.exists() {
            return Err(StoreError::Missing(code.to_owned()));
        }
        let payload = fs::read(&path)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Codes of every persisted room, sorted.
    pub fn list_codes(&self) -> Result<Vec<String>, StoreError> {
        let mut codes = Vec::new();
        for entry in fs::read_dir(&self.data_dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                codes.push(stem.to_owned());
            }
        }
        codes.sort();
        Ok(codes)
    }

    /// Delete a room snapshot.
    pub fn delete(&self, code: &str) -> Result<(), StoreError> {
        let path = self.path_for(code);
        if !path.exists() {
            return Err(StoreError::Missing(code.to_owned()));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::role::Role;
    use crate::swarm::room::RoomConfig;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RoomStore {
        RoomStore::new(dir.path()).unwrap()
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let room = Room::new("alpha", Role::Orch, RoomConfig::default());
        room.add_agent(Role::Orch, "s1").await.unwrap();

        store.save_room(&room).await.unwrap();
        let snapshot = store.load(&room.code).unwrap();
        assert_eq!(snapshot.room_id, room.id);
        assert_eq!(snapshot.agents.len(), 1);
        assert_eq!(snapshot.agents[0].role, Role::Orch);
    }

    #[test]
    fn append_creates_and_grows_history() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for i in 0..3 {
            let msg = SwarmMessage::broadcast("calm-otter-0001", Role::Orch, format!("msg {i}"));
            store.append_message("calm-otter-0001", &msg).unwrap();
        }
        let snapshot = store.load("calm-otter-0001").unwrap();
        assert_eq!(snapshot.messages.len(), 3);
        assert_eq!(snapshot.messages[0].content, "msg 0");
    }

    #[test]
    fn history_truncates_oldest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).with_max_messages(5);
        for i in 0..8 {
            let msg = SwarmMessage::broadcast("r-code-0001", Role::Orch, format!("msg {i}"));
            store.append_message("r-code-0001", &msg).unwrap();
        }
        let snapshot = store.load("r-code-0001").unwrap();
        assert_eq!(snapshot.messages.len(), 5);
        assert_eq!(snapshot.messages[0].content, "msg 3");
        assert_eq!(snapshot.messages[4].content, "msg 7");
    }

    #[test]
    fn list_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let msg = SwarmMessage::broadcast("b-room-0001", Role::Orch, "x");
        store.append_message("b-room-0001", &msg).unwrap();
        store.append_message("a-room-0002", &msg).unwrap();

        assert_eq!(store.list_codes().unwrap(), vec!["a-room-0002", "b-room-0001"]);
        store.delete("a-room-0002").unwrap();
        assert_eq!(store.list_codes().unwrap(), vec!["b-room-0001"]);
        assert!(matches!(
            store.delete("a-room-0002"),
            Err(StoreError::Missing(_))
        ));
    }

    #[test]
    fn missing_snapshot_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(store.load("nope"), Err(StoreError::Missing(_))));
    }
}
