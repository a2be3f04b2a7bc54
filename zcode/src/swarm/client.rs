//! The client facade: lifecycle, the autopilot gate, and mention routing.
//!
//! A [`SwarmClient`] binds one local agent session to a room. Inbound
//! messages pass the autopilot gate: control messages act synchronously,
//! messages from HUMAN always reach the agent, everything else is injected
//! only while autopilot is on. Responses are scanned for `@ROLE` mentions
//! and forwarded back onto the bus.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bus::Bus;
use super::message::{MessageType, SwarmMessage};
use super::presence::{PresenceEvent, PresenceTracker};
use super::role::Role;
use super::room::{Room, RoomConfig, RoomManager};
use super::store::{PersistedRoom, RoomStore};
use super::transport::{ConnectionEvent, SwarmTransport, TransportConfig};
use crate::error::{Result, RoomError, TransportError};
use crate::tool::SwarmLink;

const CLIENT_EVENT_CAPACITY: usize = 100;

/// Events surfaced to the embedding UI.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// An inbound swarm message.
    Message(SwarmMessage),
    /// A presence update.
    Presence(PresenceEvent),
    /// A transport state transition.
    Connection(ConnectionEvent),
    /// An authoritative room-state snapshot from the orchestrator.
    RoomState(Box<PersistedRoom>),
    /// A local notice (gate decisions, errors).
    Notice(String),
}

/// The local agent loop, seen from the swarm side.
///
/// `inject` feeds a prompt into the loop and returns the final assistant
/// response.
#[async_trait]
pub trait PromptSink: Send + Sync {
    /// Run one prompt through the agent loop.
    async fn inject(&self, prompt: &str) -> Result<String>;
}

/// Adapter exposing an [`Agent`](crate::agent::Agent) as a [`PromptSink`].
///
/// The loop is serialized behind a lock: one injected prompt runs at a
/// time, in arrival order.
pub struct AgentSink {
    agent: Mutex<crate::agent::Agent>,
}

impl std::fmt::Debug for AgentSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSink").finish_non_exhaustive()
    }
}

impl AgentSink {
    /// Wrap an agent loop for swarm injection.
    #[must_use]
    pub fn new(agent: crate::agent::Agent) -> Arc<Self> {
        Arc::new(Self {
            agent: Mutex::new(agent),
        })
    }
}

#[async_trait]
impl PromptSink for AgentSink {
    async fn inject(&self, prompt: &str) -> Result<String> {
        let mut agent = self.agent.lock().await;
        Ok(agent.chat(prompt).await?.response)
    }
}

/// Client lifecycle facade over the transport, rooms, and persistence.
pub struct SwarmClient {
    weak: Weak<Self>,
    transport: Arc<SwarmTransport>,
    manager: RoomManager,
    store: Option<RoomStore>,
    tracker: Arc<PresenceTracker>,
    autopilot: AtomicBool,
    sink: RwLock<Option<Arc<dyn PromptSink>>>,
    remote_state: RwLock<Option<PersistedRoom>>,
    events_tx: mpsc::Sender<ClientEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ClientEvent>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SwarmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmClient")
            .field("session_id", &self.transport.session_id())
            .field("autopilot", &self.autopilot())
            .finish_non_exhaustive()
    }
}

impl SwarmClient {
    /// Create a client over a bus.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>, config: TransportConfig, store: Option<RoomStore>) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(CLIENT_EVENT_CAPACITY);
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            transport: SwarmTransport::new(bus, config),
            manager: RoomManager::new(),
            store,
            tracker: Arc::new(PresenceTracker::new()),
            autopilot: AtomicBool::new(true),
            sink: RwLock::new(None),
            remote_state: RwLock::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            tasks: StdMutex::new(Vec::new()),
        })
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<SwarmTransport> {
        &self.transport
    }

    /// The presence tracker fed by this client.
    #[must_use]
    pub fn tracker(&self) -> &Arc<PresenceTracker> {
        &self.tracker
    }

    /// Whether autopilot is on.
    #[must_use]
    pub fn autopilot(&self) -> bool {
        self.autopilot.load(Ordering::SeqCst)
    }

    /// Flip the autopilot flag.
    pub fn set_autopilot(&self, enabled: bool) {
        self.autopilot.store(enabled, Ordering::SeqCst);
    }

    /// Attach the local agent loop.
    pub async fn set_prompt_sink(&self, sink: Arc<dyn PromptSink>) {
        *self.sink.write().await = Some(sink);
    }

    /// Take the UI event receiver (first caller wins).
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Connect the transport.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect().await
    }

    /// Create a room and join it as orchestrator, with background
    /// consumers and heartbeat running.
    pub async fn create_room(&self, name: &str, config: RoomConfig) -> Result<Arc<Room>> {
        let room = self.create_room_raw(name, config).await?;
        self.start_consumers();
        self.transport.start_heartbeat();
        Ok(room)
    }

    /// Create and join a room without starting background consumers.
    pub async fn create_room_raw(
        &self,
        name: &str,
        config: RoomConfig,
    ) -> Result<Arc<Room>> {
        let room = self.manager.create_room(name, Role::Orch, config).await;
        room.add_agent(Role::Orch, self.transport.session_id())
            .await?;
        self.transport.join_room(&room.id, Role::Orch).await?;
        if let Some(store) = &self.store {
            store.save_room(&room).await?;
        }
        info!(room = %room.code, "Created room as orchestrator");
        Ok(room)
    }

    /// Join an existing room by code, with background consumers and
    /// heartbeat running.
    pub async fn join_room(&self, code: &str, role: Role) -> Result<Arc<Room>> {
        let room = self.join_room_raw(code, role).await?;
        self.start_consumers();
        self.transport.start_heartbeat();
        Ok(room)
    }

    /// Join by code without starting background consumers.
    ///
    /// The local room is a placeholder keyed by the code; the orchestrator
    /// may publish authoritative state on the state subject.
    pub async fn join_room_raw(&self, code: &str, role: Role) -> Result<Arc<Room>> {
        if role.is_broadcast() {
            return Err(RoomError::InvalidRole(role.to_string()).into());
        }
        let room = Arc::new(Room::with_code(code, code, role, RoomConfig::default()));
        room.add_agent(role, self.transport.session_id()).await?;
        match self.manager.insert_room(Arc::clone(&room)).await {
            Ok(()) | Err(RoomError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.transport.join_room(code, role).await?;
        if let Some(store) = &self.store {
            store.save_room(&room).await?;
        }
        info!(room = code, %role, "Joined room");
        Ok(room)
    }

    /// Leave the current room.
    pub async fn leave_room(&self) -> Result<(), TransportError> {
        self.transport.leave_room().await
    }

    /// Publish an authoritative snapshot of a room on the state subject.
    ///
    /// Orchestrators call this so joiners can replace their placeholder
    /// view.
    pub async fn publish_room_state(&self, room: &Room) -> Result<()> {
        let snapshot = PersistedRoom {
            room_id: room.id.clone(),
            name: room.name.clone(),
            code: room.code.clone(),
            created_at: room.created_at,
            updated_at: chrono::Utc::now(),
            messages: Vec::new(),
            agents: room.agents().await,
            metadata: serde_json::Map::new(),
        };
        let payload = serde_json::to_vec(&snapshot)?;
        self.transport.publish_state(payload).await?;
        Ok(())
    }

    /// The last room-state snapshot received from the orchestrator.
    pub async fn remote_room_state(&self) -> Option<PersistedRoom> {
        self.remote_state.read().await.clone()
    }

    /// Close the client and its transport.
    pub async fn close(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.transport.close().await;
    }

    async fn local_identity(&self) -> Option<(String, Role)> {
        self.transport.identity().await
    }

    async fn notice(&self, text: impl Into<String>) {
        let text = text.into();
        debug!(notice = %text, "Client notice");
        let _ = self.events_tx.try_send(ClientEvent::Notice(text));
    }

    async fn inject(&self, prompt: String) -> Option<String> {
        let sink = self.sink.read().await.clone();
        let Some(sink) = sink else {
            self.notice("no agent attached; message not processed").await;
            return None;
        };
        match sink.inject(&prompt).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(error = %e, "Agent injection failed");
                self.notice(format!("agent error: {e}")).await;
                None
            }
        }
    }

    /// Apply the autopilot gate to one inbound message.
    ///
    /// Exposed for embedders that drain the raw transport channels.
    pub async fn handle_incoming(&self, message: SwarmMessage) {
        let Some((_room, local_role)) = self.local_identity().await else {
            return;
        };
        if message.from == local_role {
            return;
        }
        if message.to != local_role && !message.is_broadcast() {
            return;
        }

        match message.kind {
            MessageType::Pause => {
                if local_role != Role::Human {
                    self.set_autopilot(false);
                    self.notice(format!("autopilot paused by {}", message.from))
                        .await;
                }
            }
            MessageType::Resume => {
                if local_role != Role::Human {
                    self.set_autopilot(true);
                    self.notice(format!("autopilot resumed by {}", message.from))
                        .await;
                }
            }
            MessageType::HumanOverride => {
                // Overrides bypass the gate unconditionally, paused or not.
                let prompt =
                    format!("[URGENT OVERRIDE from {}]: {}", message.from, message.content);
                if let Some(response) = self.inject(prompt).await {
                    self.route_mentions(&response).await;
                }
            }
            _ => {
                let from_human = message.from == Role::Human;
                if from_human || self.autopilot() {
                    let prompt =
                        format!("[Swarm message from {}]: {}", message.from, message.content);
                    if let Some(response) = self.inject(prompt).await {
                        self.route_mentions(&response).await;
                    }
                } else {
                    self.notice(format!(
                        "message from {} held (autopilot off): {}",
                        message.from, message.content
                    ))
                    .await;
                }
            }
        }
    }

    /// Scan an assistant response for `@ROLE` mentions and forward it.
    pub async fn route_mentions(&self, response: &str) {
        use std::sync::LazyLock;
        static MENTION: LazyLock<regex::Regex> = LazyLock::new(|| {
            regex::Regex::new(r"@([A-Z][A-Z_]*)").expect("mention regex is valid")
        });

        let Some((room_id, local_role)) = self.local_identity().await else {
            return;
        };

        let mut seen = std::collections::BTreeSet::new();
        for caps in MENTION.captures_iter(response) {
            if let Ok(role) = caps[1].parse::<Role>() {
                if role != local_role {
                    seen.insert(role);
                }
            }
        }

        for role in seen {
            let message = if role == Role::All {
                SwarmMessage::broadcast(&room_id, local_role, response)
            } else {
                SwarmMessage::request(&room_id, local_role, role, response)
            };
            if let Err(e) = self.send_swarm(message).await {
                self.notice(format!("mention routing failed: {e}")).await;
            }
        }
    }

    async fn send_swarm(&self, message: SwarmMessage) -> Result<(), TransportError> {
        if let Some(store) = &self.store {
            if let Err(e) = store.append_message(&message.room_id, &message) {
                warn!(error = %e, "Could not persist outbound message");
            }
        }
        self.transport.send(message).await
    }

    fn start_consumers(&self) {
        let weak = self.weak.clone();
        let handle = tokio::spawn(async move {
            let Some(client) = weak.upgrade() else { return };
            let Some(mut messages) = client.transport.take_messages().await else {
                return;
            };
            drop(client);
            loop {
                let Some(message) = messages.recv().await else { break };
                let Some(client) = weak.upgrade() else { break };
                if let Some(store) = &client.store {
                    if let Err(e) = store.append_message(&message.room_id, &message) {
                        warn!(error = %e, "Could not persist inbound message");
                    }
                }
                let _ = client
                    .events_tx
                    .try_send(ClientEvent::Message(message.clone()));
                client.handle_incoming(message).await;
            }
        });
        self.push_task(handle);

        let weak = self.weak.clone();
        let handle = tokio::spawn(async move {
            let Some(client) = weak.upgrade() else { return };
            let Some(mut presence) = client.transport.take_presence().await else {
                return;
            };
            drop(client);
            loop {
                let Some(event) = presence.recv().await else { break };
                let Some(client) = weak.upgrade() else { break };
                client.tracker.apply(&event).await;
                let _ = client.events_tx.try_send(ClientEvent::Presence(event));
            }
        });
        self.push_task(handle);

        let weak = self.weak.clone();
        let handle = tokio::spawn(async move {
            let Some(client) = weak.upgrade() else { return };
            let Some(mut events) = client.transport.take_events().await else {
                return;
            };
            drop(client);
            loop {
                let Some(event) = events.recv().await else { break };
                let Some(client) = weak.upgrade() else { break };
                let _ = client.events_tx.try_send(ClientEvent::Connection(event));
            }
        });
        self.push_task(handle);

        let weak = self.weak.clone();
        let handle = tokio::spawn(async move {
            let Some(client) = weak.upgrade() else { return };
            let Some(mut states) = client.transport.take_states().await else {
                return;
            };
            drop(client);
            loop {
                let Some(payload) = states.recv().await else { break };
                let Some(client) = weak.upgrade() else { break };
                match serde_json::from_slice::<PersistedRoom>(&payload) {
                    Ok(snapshot) => {
                        *client.remote_state.write().await = Some(snapshot.clone());
                        let _ = client
                            .events_tx
                            .try_send(ClientEvent::RoomState(Box::new(snapshot)));
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable state snapshot"),
                }
            }
        });
        self.push_task(handle);
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }
}

#[async_trait]
impl SwarmLink for SwarmClient {
    async fn broadcast(&self, content: &str) -> Result<(), TransportError> {
        let (room_id, local_role) = self
            .local_identity()
            .await
            .ok_or(TransportError::NoRecipient)?;
        self.send_swarm(SwarmMessage::broadcast(&room_id, local_role, content))
            .await
    }

    async fn send_to(&self, role: Role, content: &str) -> Result<(), TransportError> {
        let (room_id, local_role) = self
            .local_identity()
            .await
            .ok_or(TransportError::NoRecipient)?;
        self.send_swarm(SwarmMessage::request(&room_id, local_role, role, content))
            .await
    }

    async fn online_roles(&self) -> Vec<Role> {
        self.tracker.online().await
    }
}
