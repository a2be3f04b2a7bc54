//! Presence events and the per-room liveness tracker.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::role::Role;
use crate::error::TransportError;

/// Default age after which a role is considered offline.
pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_secs(30);

/// Liveness status of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Connected and idle.
    Online,
    /// Not connected.
    Offline,
    /// Working on something.
    Busy,
    /// Composing a message.
    Typing,
    /// Connected but inactive.
    Away,
}

impl PresenceStatus {
    /// Statuses that count as present in the room.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Online | Self::Busy | Self::Typing)
    }
}

/// A presence announcement on the presence subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// Room the event belongs to.
    pub room_id: String,
    /// The role announcing.
    pub role: Role,
    /// Its status.
    pub status: PresenceStatus,
    /// When the announcement was made.
    pub timestamp: DateTime<Utc>,
    /// Session making the announcement.
    pub session_id: String,
    /// Optional free-form status line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PresenceEvent {
    /// Create an announcement stamped now.
    #[must_use]
    pub fn new(
        room_id: impl Into<String>,
        role: Role,
        status: PresenceStatus,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            role,
            status,
            timestamp: Utc::now(),
            session_id: session_id.into(),
            message: None,
        }
    }

    /// Encode to the JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::InvalidMessage(e.to_string()))
    }

    /// Decode from the JSON wire form.
    pub fn decode(payload: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(payload).map_err(|e| TransportError::InvalidMessage(e.to_string()))
    }
}

#[derive(Debug, Clone)]
struct PresenceEntry {
    status: PresenceStatus,
    last_seen: DateTime<Utc>,
    session_id: String,
}

/// Tracks last-known presence per role.
///
/// Last-seen timestamps here are authoritative; presence events themselves
/// are advisory.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    entries: RwLock<HashMap<Role, PresenceEntry>>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a presence announcement.
    pub async fn apply(&self, event: &PresenceEvent) {
        let mut entries = self.entries.write().await;
        entries.insert(
            event.role,
            PresenceEntry {
                status: event.status,
                last_seen: event.timestamp,
                session_id: event.session_id.clone(),
            },
        );
    }

    /// Current status of a role, if ever seen.
    pub async fn status(&self, role: Role) -> Option<PresenceStatus> {
        self.entries.read().await.get(&role).map(|e| e.status)
    }

    /// Session id last announced for a role.
    pub async fn session_id(&self, role: Role) -> Option<String> {
        self.entries
            .read()
            .await
            .get(&role)
            .map(|e| e.session_id.clone())
    }

    /// Roles whose status is online, busy, or typing.
    pub async fn online(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.status.is_active())
            .map(|(r, _)| *r)
            .collect();
        roles.sort();
        roles
    }

    /// Mark roles unseen for longer than `threshold` as offline; returns them.
    pub async fn check_stale(&self, threshold: Duration) -> Vec<Role> {
        let now = Utc::now();
        let max_age =
            chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::seconds(30));
        let mut stale = Vec::new();
        let mut entries = self.entries.write().await;
        for (role, entry) in entries.iter_mut() {
            if entry.status != PresenceStatus::Offline && now - entry.last_seen > max_age {
                entry.status = PresenceStatus::Offline;
                stale.push(*role);
            }
        }
        stale.sort();
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_round_trip() {
        let mut event = PresenceEvent::new("room-1", Role::Qa, PresenceStatus::Online, "sess-1");
        event.message = Some("running tests".into());
        let decoded = PresenceEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn wire_field_names() {
        let event = PresenceEvent::new("room-1", Role::Qa, PresenceStatus::Busy, "sess-1");
        let value = serde_json::to_value(&event).unwrap();
        for field in ["room_id", "role", "status", "timestamp", "session_id"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["status"], "busy");
    }

    #[tokio::test]
    async fn online_reports_active_statuses() {
        let tracker = PresenceTracker::new();
        tracker
            .apply(&PresenceEvent::new("r", Role::Orch, PresenceStatus::Online, "s1"))
            .await;
        tracker
            .apply(&PresenceEvent::new("r", Role::Qa, PresenceStatus::Typing, "s2"))
            .await;
        tracker
            .apply(&PresenceEvent::new("r", Role::Dba, PresenceStatus::Away, "s3"))
            .await;
        tracker
            .apply(&PresenceEvent::new("r", Role::Sec, PresenceStatus::Offline, "s4"))
            .await;

        assert_eq!(tracker.online().await, vec![Role::Orch, Role::Qa]);
    }

    #[tokio::test]
    async fn check_stale_marks_old_entries_offline() {
        let tracker = PresenceTracker::new();
        let mut old = PresenceEvent::new("r", Role::BeDev, PresenceStatus::Online, "s1");
        old.timestamp = Utc::now() - chrono::Duration::seconds(120);
        tracker.apply(&old).await;
        tracker
            .apply(&PresenceEvent::new("r", Role::Qa, PresenceStatus::Online, "s2"))
            .await;

        let stale = tracker.check_stale(DEFAULT_OFFLINE_THRESHOLD).await;
        assert_eq!(stale, vec![Role::BeDev]);
        assert_eq!(tracker.status(Role::BeDev).await, Some(PresenceStatus::Offline));
        assert_eq!(tracker.status(Role::Qa).await, Some(PresenceStatus::Online));
    }

    #[tokio::test]
    async fn newer_announcement_overwrites() {
        let tracker = PresenceTracker::new();
        tracker
            .apply(&PresenceEvent::new("r", Role::Qa, PresenceStatus::Online, "s1"))
            .await;
        tracker
            .apply(&PresenceEvent::new("r", Role::Qa, PresenceStatus::Busy, "s1"))
            .await;
        assert_eq!(tracker.status(Role::Qa).await, Some(PresenceStatus::Busy));
    }
}
