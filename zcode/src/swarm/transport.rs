//! The swarm transport: subjects, subscriptions, reconnection, heartbeat.
//!
//! Sits between the [`Bus`] seam and the client facade. Inbound frames are
//! decoded and pushed onto bounded channels (messages 100, presence 50);
//! overflow drops the frame and records an error event rather than
//! blocking the reader. Registered handlers are dispatched concurrently,
//! one task per handler, from a snapshot taken under the lock.
//!
//! Background tasks hold a `Weak` reference back to the transport so a
//! dropped transport winds its tasks down even without an explicit
//! `close`.

use std::sync::Mutex as StdMutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bus::Bus;
use super::message::SwarmMessage;
use super::presence::{PresenceEvent, PresenceStatus};
use super::role::Role;
use super::subjects;
use crate::error::TransportError;

/// Capacity of the inbound message channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 100;
/// Capacity of the inbound presence channel.
const PRESENCE_CHANNEL_CAPACITY: usize = 50;
/// Capacity of the connection-event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;
/// Capacity of the room-state snapshot channel.
const STATE_CHANNEL_CAPACITY: usize = 8;
/// Largest frame the transport will publish.
const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for the initial connect.
    pub connect_timeout: Duration,
    /// Backoff between reconnect attempts.
    pub reconnect_wait: Duration,
    /// Reconnect attempts before giving up.
    pub max_reconnects: u32,
    /// Interval between presence heartbeats.
    pub heartbeat_interval: Duration,
    /// Interval between connection liveness checks.
    pub monitor_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reconnect_wait: Duration::from_secs(2),
            max_reconnects: 5,
            heartbeat_interval: Duration::from_secs(10),
            monitor_interval: Duration::from_secs(1),
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection.
    Disconnected,
    /// Connect in progress.
    Connecting,
    /// Connected and usable.
    Connected,
    /// Connection lost; reconnect in progress.
    Reconnecting,
    /// Closed for good.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(text)
    }
}

/// Emitted on every state transition (and on dropped-frame errors, with
/// `from == to`).
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// State before.
    pub from: ConnectionState,
    /// State after.
    pub to: ConnectionState,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
    /// Human-readable detail.
    pub message: Option<String>,
}

/// Inbound message observer registered on the transport.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one inbound message.
    async fn handle(&self, message: SwarmMessage);
}

/// The session's binding to a room over a pub/sub bus.
pub struct SwarmTransport {
    weak: Weak<Self>,
    bus: Arc<dyn Bus>,
    config: TransportConfig,
    session_id: String,
    state: RwLock<ConnectionState>,
    identity: RwLock<Option<(String, Role)>>,
    messages_tx: mpsc::Sender<SwarmMessage>,
    messages_rx: Mutex<Option<mpsc::Receiver<SwarmMessage>>>,
    presence_tx: mpsc::Sender<PresenceEvent>,
    presence_rx: Mutex<Option<mpsc::Receiver<PresenceEvent>>>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
    states_tx: mpsc::Sender<Vec<u8>>,
    states_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for SwarmTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmTransport")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl SwarmTransport {
    /// Create a transport over a bus.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>, config: TransportConfig) -> Arc<Self> {
        let (messages_tx, messages_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (presence_tx, presence_rx) = mpsc::channel(PRESENCE_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (states_tx, states_rx) = mpsc::channel(STATE_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            bus,
            config,
            session_id: Uuid::new_v4().to_string(),
            state: RwLock::new(ConnectionState::Disconnected),
            identity: RwLock::new(None),
            messages_tx,
            messages_rx: Mutex::new(Some(messages_rx)),
            presence_tx,
            presence_rx: Mutex::new(Some(presence_rx)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            states_tx,
            states_rx: Mutex::new(Some(states_rx)),
            handlers: RwLock::new(Vec::new()),
            tasks: StdMutex::new(Vec::new()),
            shutdown,
        })
    }

    /// This session's id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// The room and role this transport is bound to, if joined.
    pub async fn identity(&self) -> Option<(String, Role)> {
        self.identity.read().await.clone()
    }

    /// Take the inbound message receiver (first caller wins).
    pub async fn take_messages(&self) -> Option<mpsc::Receiver<SwarmMessage>> {
        self.messages_rx.lock().await.take()
    }

    /// Take the inbound presence receiver (first caller wins).
    pub async fn take_presence(&self) -> Option<mpsc::Receiver<PresenceEvent>> {
        self.presence_rx.lock().await.take()
    }

    /// Take the connection-event receiver (first caller wins).
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Take the room-state snapshot receiver (first caller wins).
    ///
    /// Frames are the raw payloads published on the state subject; the
    /// client facade owns their decoding.
    pub async fn take_states(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.states_rx.lock().await.take()
    }

    /// Register an inbound message handler.
    pub async fn add_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().await.push(handler);
    }

    async fn transition(&self, to: ConnectionState, message: Option<String>) {
        let mut state = self.state.write().await;
        let from = *state;
        if from == ConnectionState::Closed {
            return;
        }
        *state = to;
        drop(state);
        debug!(%from, %to, "Transport state transition");
        let _ = self.events_tx.try_send(ConnectionEvent {
            from,
            to,
            timestamp: Utc::now(),
            message,
        });
    }

    fn record_error(&self, error: &TransportError) {
        warn!(%error, "Transport error");
        let _ = self.events_tx.try_send(ConnectionEvent {
            from: ConnectionState::Connected,
            to: ConnectionState::Connected,
            timestamp: Utc::now(),
            message: Some(error.to_string()),
        });
    }

    /// Connect the underlying bus, honouring the connect timeout.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transition(ConnectionState::Connecting, None).await;
        match tokio::time::timeout(self.config.connect_timeout, self.bus.connect()).await {
            Ok(Ok(())) => {
                self.transition(ConnectionState::Connected, None).await;
                self.spawn_monitor();
                Ok(())
            }
            Ok(Err(e)) => {
                self.transition(ConnectionState::Disconnected, Some(e.to_string()))
                    .await;
                Err(e)
            }
            Err(_) => {
                self.transition(
                    ConnectionState::Disconnected,
                    Some("connect timed out".to_owned()),
                )
                .await;
                Err(TransportError::ConnectionTimeout)
            }
        }
    }

    /// Reconnect with backoff, re-announcing presence on success.
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        self.transition(
            ConnectionState::Reconnecting,
            Some("connection lost".to_owned()),
        )
        .await;
        for attempt in 1..=self.config.max_reconnects {
            if *self.shutdown.borrow() {
                return Err(TransportError::NotConnected);
            }
            tokio::time::sleep(self.config.reconnect_wait).await;
            match self.bus.connect().await {
                Ok(()) => {
                    info!(attempt, "Transport reconnected");
                    self.transition(ConnectionState::Connected, None).await;
                    if self.identity().await.is_some() {
                        let _ = self.publish_presence(PresenceStatus::Online, None).await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }
        self.transition(
            ConnectionState::Disconnected,
            Some("reconnect attempts exhausted".to_owned()),
        )
        .await;
        Err(TransportError::MaxReconnects(self.config.max_reconnects))
    }

    fn spawn_monitor(&self) {
        let weak = self.weak.clone();
        let interval = self.config.monitor_interval;
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(interval) => {
                        let Some(transport) = weak.upgrade() else { break };
                        let state = transport.state().await;
                        if state == ConnectionState::Closed {
                            break;
                        }
                        if state == ConnectionState::Connected && !transport.bus.is_connected() {
                            let _ = transport.reconnect().await;
                        }
                    }
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

    fn spawn_message_reader(&self, mut rx: mpsc::Receiver<Vec<u8>>) {
        let weak = self.weak.clone();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    frame = rx.recv() => {
                        let Some(payload) = frame else { break };
                        let Some(transport) = weak.upgrade() else { break };
                        match SwarmMessage::decode(&payload) {
                            Ok(message) => transport.deliver(message).await,
                            Err(e) => {
                                // Per-message decode failures are logged and skipped.
                                warn!(error = %e, "Dropping undecodable frame");
                            }
                        }
                    }
                }
            }
        });
        self.push_task(handle);
    }

    async fn deliver(&self, message: SwarmMessage) {
        if self.messages_tx.try_send(message.clone()).is_err() {
            self.record_error(&TransportError::ChannelFull("messages"));
            return;
        }
        let handlers = self.handlers.read().await.clone();
        for handler in handlers {
            let msg = message.clone();
            tokio::spawn(async move {
                handler.handle(msg).await;
            });
        }
    }

    fn spawn_presence_reader(&self, mut rx: mpsc::Receiver<Vec<u8>>) {
        let weak = self.weak.clone();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    frame = rx.recv() => {
                        let Some(payload) = frame else { break };
                        let Some(transport) = weak.upgrade() else { break };
                        match PresenceEvent::decode(&payload) {
                            Ok(event) => {
                                if transport.presence_tx.try_send(event).is_err() {
                                    transport.record_error(&TransportError::ChannelFull("presence"));
                                }
                            }
                            Err(e) => warn!(error = %e, "Dropping undecodable presence frame"),
                        }
                    }
                }
            }
        });
        self.push_task(handle);
    }

    fn spawn_state_reader(&self, mut rx: mpsc::Receiver<Vec<u8>>) {
        let weak = self.weak.clone();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    frame = rx.recv() => {
                        let Some(payload) = frame else { break };
                        let Some(transport) = weak.upgrade() else { break };
                        if transport.states_tx.try_send(payload).is_err() {
                            transport.record_error(&TransportError::ChannelFull("state"));
                        }
                    }
                }
            }
        });
        self.push_task(handle);
    }

    /// Publish an authoritative room-state snapshot on the state subject.
    pub async fn publish_state(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        let (room_id, _) = self.identity().await.ok_or(TransportError::NoRecipient)?;
        self.bus.publish(&subjects::state(&room_id), payload).await
    }

    /// Join a room under a role: subscribe the direct, broadcast,
    /// presence, and state subjects, then announce `online`.
    pub async fn join_room(&self, room_id: &str, role: Role) -> Result<(), TransportError> {
        if self.state().await != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        *self.identity.write().await = Some((room_id.to_owned(), role));

        let direct = self.bus.subscribe(&subjects::direct(room_id, role)).await?;
        let broadcast = self.bus.subscribe(&subjects::broadcast(room_id)).await?;
        let presence = self.bus.subscribe(&subjects::presence(room_id)).await?;
        let state = self.bus.subscribe(&subjects::state(room_id)).await?;

        self.spawn_message_reader(direct);
        self.spawn_message_reader(broadcast);
        self.spawn_presence_reader(presence);
        self.spawn_state_reader(state);

        self.publish_presence(PresenceStatus::Online, None).await?;
        info!(room = room_id, %role, "Joined room");
        Ok(())
    }

    /// Leave the current room, announcing `offline`.
    pub async fn leave_room(&self) -> Result<(), TransportError> {
        if self.identity().await.is_some() {
            let _ = self.publish_presence(PresenceStatus::Offline, None).await;
        }
        *self.identity.write().await = None;
        Ok(())
    }

    /// Send a message, filling the room id from the session when empty.
    pub async fn send(&self, mut message: SwarmMessage) -> Result<(), TransportError> {
        match self.state().await {
            ConnectionState::Connected => {}
            ConnectionState::Reconnecting => return Err(TransportError::Reconnecting),
            _ => return Err(TransportError::NotConnected),
        }
        if message.room_id.is_empty() {
            let (room_id, _) = self.identity().await.ok_or(TransportError::NoRecipient)?;
            message.room_id = room_id;
        }

        let subject = if message.is_direct() {
            subjects::direct(&message.room_id, message.to)
        } else {
            subjects::broadcast(&message.room_id)
        };
        let payload = message.encode()?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(TransportError::MessageTooLarge(payload.len()));
        }
        self.bus
            .publish(&subject, payload)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Publish a presence announcement for the local session.
    pub async fn publish_presence(
        &self,
        status: PresenceStatus,
        message: Option<String>,
    ) -> Result<(), TransportError> {
        let (room_id, role) = self.identity().await.ok_or(TransportError::NoRecipient)?;
        let mut event = PresenceEvent::new(&room_id, role, status, &self.session_id);
        event.message = message;
        self.bus
            .publish(&subjects::presence(&room_id), event.encode()?)
            .await
    }

    /// Start the presence heartbeat: republish `online` on a fixed
    /// interval until the transport closes.
    pub fn start_heartbeat(&self) {
        let weak = self.weak.clone();
        let interval = self.config.heartbeat_interval;
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(interval) => {
                        let Some(transport) = weak.upgrade() else { break };
                        if transport.state().await == ConnectionState::Connected
                            && transport.identity().await.is_some()
                        {
                            let _ = transport
                                .publish_presence(PresenceStatus::Online, None)
                                .await;
                        }
                    }
                }
            }
        });
        self.push_task(handle);
    }

    /// Close the transport: stop background tasks and seal the state.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        let mut state = self.state.write().await;
        let from = *state;
        *state = ConnectionState::Closed;
        drop(state);
        let _ = self.events_tx.try_send(ConnectionEvent {
            from,
            to: ConnectionState::Closed,
            timestamp: Utc::now(),
            message: None,
        });
        info!("Transport closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::bus::MemoryBus;
    use crate::swarm::message::MessageType;

    fn fast_config() -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(500),
            reconnect_wait: Duration::from_millis(20),
            max_reconnects: 3,
            heartbeat_interval: Duration::from_millis(50),
            monitor_interval: Duration::from_millis(20),
        }
    }

    async fn joined_pair() -> (Arc<MemoryBus>, Arc<SwarmTransport>, Arc<SwarmTransport>) {
        let bus = Arc::new(MemoryBus::new());
        let a = SwarmTransport::new(Arc::clone(&bus) as Arc<dyn Bus>, fast_config());
        let b = SwarmTransport::new(Arc::clone(&bus) as Arc<dyn Bus>, fast_config());
        a.connect().await.unwrap();
        b.connect().await.unwrap();
        a.join_room("room-1", Role::Orch).await.unwrap();
        b.join_room("room-1", Role::BeDev).await.unwrap();
        (bus, a, b)
    }

    #[tokio::test]
    async fn direct_message_reaches_target_role() {
        let (_bus, a, b) = joined_pair().await;
        let mut inbox = b.take_messages().await.unwrap();

        a.send(SwarmMessage::request(
            "room-1",
            Role::Orch,
            Role::BeDev,
            "build it",
        ))
        .await
        .unwrap();

        let received = inbox.recv().await.unwrap();
        assert_eq!(received.kind, MessageType::Request);
        assert_eq!(received.content, "build it");
        assert_eq!(received.from, Role::Orch);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member() {
        let (_bus, a, b) = joined_pair().await;
        let mut inbox_a = a.take_messages().await.unwrap();
        let mut inbox_b = b.take_messages().await.unwrap();

        a.send(SwarmMessage::broadcast("room-1", Role::Orch, "standup"))
            .await
            .unwrap();

        assert_eq!(inbox_b.recv().await.unwrap().content, "standup");
        // The sender's own broadcast subscription also sees it.
        assert_eq!(inbox_a.recv().await.unwrap().content, "standup");
    }

    #[tokio::test]
    async fn empty_room_id_is_filled_from_identity() {
        let (_bus, a, b) = joined_pair().await;
        let mut inbox = b.take_messages().await.unwrap();

        let msg = SwarmMessage::request("", Role::Orch, Role::BeDev, "hi");
        a.send(msg).await.unwrap();

        assert_eq!(inbox.recv().await.unwrap().room_id, "room-1");
    }

    #[tokio::test]
    async fn join_announces_online_presence() {
        let bus = Arc::new(MemoryBus::new());
        let watcher = SwarmTransport::new(Arc::clone(&bus) as Arc<dyn Bus>, fast_config());
        watcher.connect().await.unwrap();
        watcher.join_room("room-1", Role::Orch).await.unwrap();
        let mut presence = watcher.take_presence().await.unwrap();

        let joiner = SwarmTransport::new(Arc::clone(&bus) as Arc<dyn Bus>, fast_config());
        joiner.connect().await.unwrap();
        joiner.join_room("room-1", Role::Qa).await.unwrap();

        let event = presence.recv().await.unwrap();
        assert_eq!(event.role, Role::Qa);
        assert_eq!(event.status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn state_subject_round_trips_payloads() {
        let (_bus, a, b) = joined_pair().await;
        let mut states = b.take_states().await.unwrap();

        a.publish_state(b"snapshot".to_vec()).await.unwrap();
        assert_eq!(states.recv().await.unwrap(), b"snapshot");
    }

    #[tokio::test]
    async fn reconnect_after_connection_loss() {
        let (bus, a, _b) = joined_pair().await;
        let mut events = a.take_events().await.unwrap();
        // Drain the connect/join transitions.
        while events.try_recv().is_ok() {}

        bus.drop_connection();
        // The monitor notices and reconnects; presence is re-announced.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = events.recv().await.unwrap();
                if event.to == ConnectionState::Connected
                    && event.from == ConnectionState::Reconnecting
                {
                    break;
                }
            }
        })
        .await
        .expect("transport should reconnect");
        assert_eq!(a.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn reconnect_exhaustion_disconnects() {
        let bus = Arc::new(MemoryBus::new());
        let transport = SwarmTransport::new(Arc::clone(&bus) as Arc<dyn Bus>, fast_config());
        transport.connect().await.unwrap();
        bus.drop_connection();
        bus.fail_next_connects(100);

        let err = transport.reconnect().await.unwrap_err();
        assert!(matches!(err, TransportError::MaxReconnects(3)));
        assert_eq!(transport.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn heartbeat_republishes_presence() {
        let bus = Arc::new(MemoryBus::new());
        let watcher = SwarmTransport::new(Arc::clone(&bus) as Arc<dyn Bus>, fast_config());
        watcher.connect().await.unwrap();
        watcher.join_room("room-1", Role::Orch).await.unwrap();
        let mut presence = watcher.take_presence().await.unwrap();

        let beating = SwarmTransport::new(Arc::clone(&bus) as Arc<dyn Bus>, fast_config());
        beating.connect().await.unwrap();
        beating.join_room("room-1", Role::Qa).await.unwrap();
        beating.start_heartbeat();

        // Expect announcements beyond the join itself.
        let mut seen = 0;
        tokio::time::timeout(Duration::from_secs(2), async {
            while seen < 3 {
                let event = presence.recv().await.unwrap();
                if event.role == Role::Qa && event.status == PresenceStatus::Online {
                    seen += 1;
                }
            }
        })
        .await
        .expect("heartbeat should republish presence");

        beating.close().await;
        assert_eq!(beating.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let bus = Arc::new(MemoryBus::new());
        let transport = SwarmTransport::new(bus as Arc<dyn Bus>, fast_config());
        let err = transport
            .send(SwarmMessage::broadcast("r", Role::Orch, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn handlers_receive_inbound_messages() {
        struct Recorder(tokio::sync::mpsc::Sender<String>);

        #[async_trait]
        impl MessageHandler for Recorder {
            async fn handle(&self, message: SwarmMessage) {
                let _ = self.0.send(message.content).await;
            }
        }

        let (_bus, a, b) = joined_pair().await;
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        b.add_handler(Arc::new(Recorder(tx))).await;

        a.send(SwarmMessage::request(
            "room-1",
            Role::Orch,
            Role::BeDev,
            "ping",
        ))
        .await
        .unwrap();

        let content = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, "ping");
    }
}
