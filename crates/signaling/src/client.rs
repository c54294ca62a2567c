//! Connection state and registry management.
//!
//! The registry maps transport-level connection ids to send handles.
//! It is the only place that resolves "notify participant X" intent
//! into an actual WebSocket send; every other component hands it a
//! [`ConnId`].

use crate::error::{Result, SignalingError};
use crate::protocol::ServerMessage;
use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique connection identifier.
pub type ConnId = Uuid;

/// Buffer size for per-connection message channels.
/// Bounded to prevent OOM with slow clients.
pub const CLIENT_CHANNEL_BUFFER_SIZE: usize = 256;

/// State for a single connected participant.
pub struct ClientState {
    /// Unique connection identifier.
    pub id: ConnId,
    /// Channel to the connection's WebSocket send task.
    pub tx: mpsc::Sender<Message>,
    /// Timestamp when the connection was established.
    pub connected_at: i64,
    /// Timestamp of last ping received.
    pub last_ping: AtomicI64,
}

impl ClientState {
    /// Create connection state with a bounded channel.
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            tx,
            connected_at: now,
            last_ping: AtomicI64::new(now),
        }
    }

    /// Send a protocol message to this connection.
    /// Uses try_send for non-blocking behavior - drops the message if
    /// the buffer is full.
    pub fn send(&self, msg: ServerMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.tx
            .try_send(Message::Text(json.into()))
            .map_err(|_| SignalingError::ChannelSend)
    }

    /// Try to send a raw message to this connection.
    /// Returns true if sent, false if the buffer is full.
    pub fn try_send_raw(&self, msg: Message) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Update the last ping timestamp.
    pub fn update_ping(&self) {
        self.last_ping
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Get the last ping timestamp.
    pub fn last_ping_time(&self) -> i64 {
        self.last_ping.load(Ordering::Relaxed)
    }
}

/// Registry of live connections.
pub struct ClientRegistry {
    clients: DashMap<ConnId, Arc<ClientState>>,
}

impl ClientRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a new connection.
    pub fn register(&self, client: Arc<ClientState>) -> ConnId {
        let id = client.id;
        self.clients.insert(id, client);
        debug!("Connection {} registered", id);
        id
    }

    /// Unregister a connection.
    pub fn unregister(&self, conn_id: &ConnId) {
        if self.clients.remove(conn_id).is_some() {
            debug!("Connection {} unregistered", conn_id);
        }
    }

    /// Get a connection by id.
    pub fn get(&self, conn_id: &ConnId) -> Option<Arc<ClientState>> {
        self.clients.get(conn_id).map(|r| r.clone())
    }

    /// Send a protocol message to one connection, if it is still live.
    /// Delivery to gone or slow connections is dropped, not an error.
    pub fn send_to(&self, conn_id: &ConnId, msg: ServerMessage) {
        if let Some(client) = self.get(conn_id) {
            if let Err(e) = client.send(msg) {
                debug!("Failed to send to connection {}: {}", conn_id, e);
            }
        } else {
            debug!("Dropping message for unknown connection {}", conn_id);
        }
    }

    /// Broadcast a message to every connected participant.
    pub fn broadcast_all(&self, msg: &ServerMessage) {
        // Pre-serialize the message once
        let json = match serde_json::to_string(msg) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize broadcast message: {}", e);
                return;
            }
        };

        for entry in self.clients.iter() {
            if !entry
                .value()
                .try_send_raw(Message::Text(json.clone().into()))
            {
                debug!("Failed to broadcast to connection {}", entry.key());
            }
        }
    }

    /// Total number of live connections.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Connections that haven't pinged within the idle limit. Nothing
    /// is removed here; the caller owns the disconnect path so
    /// presence and rooms get resolved before unregistration.
    pub fn stale_connections(&self, max_idle_ms: i64) -> Vec<ConnId> {
        let now = Utc::now().timestamp_millis();
        self.clients
            .iter()
            .filter(|entry| now - entry.value().last_ping_time() > max_idle_ms)
            .map(|entry| *entry.key())
            .collect()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client() -> (Arc<ClientState>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_BUFFER_SIZE);
        (Arc::new(ClientState::new(tx)), rx)
    }

    #[tokio::test]
    async fn test_send_to_delivers_json() {
        let registry = ClientRegistry::new();
        let (client, mut rx) = make_client();
        let id = registry.register(client);

        registry.send_to(&id, ServerMessage::OnlineCount { count: 3 });

        let msg = rx.recv().await.unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["type"], "online-count");
        assert_eq!(value["count"], 3);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_connections() {
        let registry = ClientRegistry::new();
        let (a, mut rx_a) = make_client();
        let (b, mut rx_b) = make_client();
        registry.register(a);
        registry.register(b);

        registry.broadcast_all(&ServerMessage::OnlineCount { count: 2 });

        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_stale_connections_selects_only_idle() {
        let registry = ClientRegistry::new();
        let (idle, _idle_rx) = make_client();
        let (fresh, _fresh_rx) = make_client();
        let idle_id = registry.register(idle.clone());
        registry.register(fresh);

        idle.last_ping.store(0, Ordering::Relaxed);

        assert_eq!(registry.stale_connections(90_000), vec![idle_id]);
        // selection does not remove anything
        assert_eq!(registry.client_count(), 2);
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let registry = ClientRegistry::new();
        let (client, mut rx) = make_client();
        let id = registry.register(client);
        registry.unregister(&id);

        registry.send_to(&id, ServerMessage::Pong);
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.client_count(), 0);
    }
}
