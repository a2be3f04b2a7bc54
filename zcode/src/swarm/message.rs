//! Typed swarm messages and their JSON envelope.
//!
//! Wire shape (exact field names): `id, room_id, timestamp, from, to, type,
//! content, reply_to, metadata`. Control messages (`PAUSE`, `RESUME`,
//! `HUMAN_OVERRIDE`) default to urgent priority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;
use crate::error::TransportError;

/// Kind of a swarm message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Message for every role in the room.
    Broadcast,
    /// A request expecting a response.
    Request,
    /// A response to an earlier request.
    Response,
    /// Transfer of a task to another role.
    Handoff,
    /// A status update.
    Status,
    /// A request to review work.
    ReviewRequest,
    /// Approval of a review request.
    Approval,
    /// Rejection of a review request.
    Rejection,
    /// Human override: bypasses the autopilot gate unconditionally.
    HumanOverride,
    /// Control: suspend autopilot.
    Pause,
    /// Control: resume autopilot.
    Resume,
}

impl MessageType {
    /// Whether this is a control-plane message.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(self, Self::Pause | Self::Resume | Self::HumanOverride)
    }
}

/// Message priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background noise.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Deal with it soon.
    High,
    /// Drop everything.
    Urgent,
}

/// Attachments and routing hints carried alongside the content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// File paths referenced by the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Code blocks referenced by the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_blocks: Vec<String>,
    /// Ids of related messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    /// Message priority.
    #[serde(default)]
    pub priority: Priority,
    /// Whether the sender expects an acknowledgement.
    #[serde(default)]
    pub requires_ack: bool,
    /// Task this message belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_id: String,
}

/// A message exchanged within a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmMessage {
    /// Unique message id.
    pub id: String,
    /// Room the message belongs to.
    pub room_id: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Sender role.
    pub from: Role,
    /// Recipient role; `ALL` broadcasts.
    pub to: Role,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Message body.
    pub content: String,
    /// Id of the message this answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Attachments and routing hints.
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl SwarmMessage {
    /// Create a message; control kinds default to urgent priority.
    #[must_use]
    pub fn new(
        room_id: impl Into<String>,
        from: Role,
        to: Role,
        kind: MessageType,
        content: impl Into<String>,
    ) -> Self {
        let mut metadata = MessageMetadata::default();
        if kind.is_control() {
            metadata.priority = Priority::Urgent;
        }
        Self {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            timestamp: Utc::now(),
            from,
            to,
            kind,
            content: content.into(),
            reply_to: None,
            metadata,
        }
    }

    /// A broadcast message.
    #[must_use]
    pub fn broadcast(room_id: impl Into<String>, from: Role, content: impl Into<String>) -> Self {
        Self::new(room_id, from, Role::All, MessageType::Broadcast, content)
    }

    /// A direct request.
    #[must_use]
    pub fn request(
        room_id: impl Into<String>,
        from: Role,
        to: Role,
        content: impl Into<String>,
    ) -> Self {
        Self::new(room_id, from, to, MessageType::Request, content)
    }

    /// A response correlated to an earlier message.
    #[must_use]
    pub fn response(
        room_id: impl Into<String>,
        from: Role,
        to: Role,
        content: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(room_id, from, to, MessageType::Response, content);
        msg.reply_to = Some(reply_to.into());
        msg
    }

    /// A pause control message.
    #[must_use]
    pub fn pause(room_id: impl Into<String>, from: Role, to: Role) -> Self {
        Self::new(room_id, from, to, MessageType::Pause, "pause")
    }

    /// A resume control message.
    #[must_use]
    pub fn resume(room_id: impl Into<String>, from: Role, to: Role) -> Self {
        Self::new(room_id, from, to, MessageType::Resume, "resume")
    }

    /// A human override message.
    #[must_use]
    pub fn human_override(
        room_id: impl Into<String>,
        to: Role,
        content: impl Into<String>,
    ) -> Self {
        Self::new(room_id, Role::Human, to, MessageType::HumanOverride, content)
    }

    /// `to == ALL` or a broadcast kind.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.to == Role::All || self.kind == MessageType::Broadcast
    }

    /// Addressed to a single role.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        !self.is_broadcast()
    }

    /// Whether this is a control-plane message.
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.kind.is_control()
    }

    /// Attach a reply-to correlation.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = priority;
        self
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
