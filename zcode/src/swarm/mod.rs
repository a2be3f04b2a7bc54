//! The swarm runtime: rooms, roles, presence, messaging, and the client
//! facade over a pub/sub bus.

pub mod bus;
pub mod client;
pub mod message;
pub mod presence;
pub mod role;
pub mod room;
pub mod store;
pub mod subjects;
pub mod transport;

pub use bus::{Bus, MemoryBus};
pub use client::{AgentSink, ClientEvent, PromptSink, SwarmClient};
pub use message::{MessageMetadata, MessageType, Priority, SwarmMessage};
pub use presence::{PresenceEvent, PresenceStatus, PresenceTracker};
pub use role::{Role, RoleDefinition, RoleRegistry};
pub use room::{AgentInfo, Room, RoomConfig, RoomManager, RoomState, generate_room_code};
pub use store::{PersistedRoom, RoomStore};
pub use transport::{
    ConnectionEvent, ConnectionState, MessageHandler, SwarmTransport, TransportConfig,
};
