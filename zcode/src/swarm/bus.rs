//! The pub/sub seam and its in-process implementation.
//!
//! [`Bus`] is the narrow surface a broker client must provide: connect,
//! publish, subscribe, and a liveness probe. [`MemoryBus`] implements it
//! with per-subject fan-out over tokio channels, and adds test hooks for
//! simulating connection loss.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::TransportError;

/// Capacity of each subscription's delivery queue.
const SUBSCRIPTION_CAPACITY: usize = 256;

/// A pub/sub broker connection.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Establish (or re-establish) the connection.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Publish a payload to a subject.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe to a subject; frames arrive on the returned receiver.
    async fn subscribe(&self, subject: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError>;

    /// Whether the connection is currently up.
    fn is_connected(&self) -> bool;
}

/// In-process broker: per-subject fan-out over bounded channels.
///
/// Share one instance (via `Arc`) between sessions to form a room's bus.
#[derive(Debug, Default)]
pub struct MemoryBus {
    subjects: Mutex<HashMap<String, Vec<mpsc::Sender<Vec<u8>>>>>,
    connected: AtomicBool,
    fail_connects: AtomicUsize,
}

impl MemoryBus {
    /// Create a disconnected bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the connection (test hook): publishes start failing until the
    /// next successful `connect`.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Make the next `n` connect attempts fail (test hook).
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn connect(&self) -> Result<(), TransportError> {
        let remaining = self.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectionFailed(
                "simulated connect failure".to_owned(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let mut subjects = self.subjects.lock().map_err(|_| {
            TransportError::SendFailed("bus state poisoned".to_owned())
        })?;
        if let Some(senders) = subjects.get_mut(subject) {
            senders.retain(|tx| !tx.is_closed());
            trace!(subject, receivers = senders.len(), "Publishing frame");
            for tx in senders.iter() {
                // A full subscriber queue drops the frame for that
                // subscriber only; the bounded channels above the bus
                // enforce the real backpressure contract.
                let _ = tx.try_send(payload.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let mut subjects = self.subjects.lock().map_err(|_| {
            TransportError::SendFailed("bus state poisoned".to_owned())
        })?;
        subjects.entry(subject.to_owned()).or_default().push(tx);
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = MemoryBus::new();
        bus.connect().await.unwrap();
        let mut rx1 = bus.subscribe("room.r.broadcast").await.unwrap();
        let mut rx2 = bus.subscribe("room.r.broadcast").await.unwrap();

        bus.publish("room.r.broadcast", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(rx1.recv().await.unwrap(), b"hello");
        assert_eq!(rx2.recv().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn subjects_are_isolated() {
        let bus = MemoryBus::new();
        bus.connect().await.unwrap();
        let mut direct = bus.subscribe("room.r.QA").await.unwrap();
        bus.publish("room.r.ORCH", b"not yours".to_vec())
            .await
            .unwrap();
        bus.publish("room.r.QA", b"yours".to_vec()).await.unwrap();
        assert_eq!(direct.recv().await.unwrap(), b"yours");
    }

    #[tokio::test]
    async fn disconnected_bus_rejects_publish() {
        let bus = MemoryBus::new();
        assert!(matches!(
            bus.publish("s", vec![]).await,
            Err(TransportError::NotConnected)
        ));
        bus.connect().await.unwrap();
        bus.publish("s", vec![]).await.unwrap();
        bus.drop_connection();
        assert!(matches!(
            bus.publish("s", vec![]).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn failed_connects_then_recovery() {
        let bus = MemoryBus::new();
        bus.fail_next_connects(2);
        assert!(bus.connect().await.is_err());
        assert!(bus.connect().await.is_err());
        bus.connect().await.unwrap();
        assert!(bus.is_connected());
    }

    #[tokio::test]
    async fn subscriptions_survive_reconnect() {
        let bus = MemoryBus::new();
        bus.connect().await.unwrap();
        let mut rx = bus.subscribe("s").await.unwrap();
        bus.drop_connection();
        bus.connect().await.unwrap();
        bus.publish("s", b"after".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"after");
    }
}
