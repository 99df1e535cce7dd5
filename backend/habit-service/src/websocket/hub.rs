use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

/// Runtime handle for a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Outbound channel into a connection's session actor. A failed send means the
/// session is gone and the connection must be evicted.
pub type ConnectionSender = UnboundedSender<String>;

#[derive(Default)]
struct Registry {
    /// Every live connection, identified or not.
    connections: HashMap<ConnectionId, ConnectionSender>,
    /// Self-declared identity -> connection. Last announcement wins; a
    /// connection that announces several identities appears once per identity
    /// and loses all of them on disconnect.
    identities: HashMap<String, ConnectionId>,
}

impl Registry {
    fn evict(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
        self.identities.retain(|_, conn| *conn != id);
    }
}

/// Owns the set of live WebSocket connections and delivers messages to them.
///
/// One mutex guards both the live set and the identity map, so registry
/// mutation, broadcast iteration and targeted sends are fully serialized and
/// no connection is ever written to concurrently. Session read loops never
/// hold the lock while blocked on I/O.
#[derive(Clone)]
pub struct ConnectionHub {
    registry: Arc<Mutex<Registry>>,
    broadcast_tx: UnboundedSender<String>,
    broadcast_rx: Arc<Mutex<Option<UnboundedReceiver<String>>>>,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHub {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            broadcast_tx: tx,
            broadcast_rx: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Add a connection to the live set, with no identity yet. Returns the
    /// handle the session uses for everything else.
    pub async fn register(&self, sender: ConnectionSender) -> ConnectionId {
        let id = ConnectionId::new();
        let mut registry = self.registry.lock().await;
        registry.connections.insert(id, sender);
        tracing::info!(connections = registry.connections.len(), "client connected");
        id
    }

    /// Remove a connection and every identity it announced. Idempotent; the
    /// session actor calls this exactly once on teardown.
    pub async fn deregister(&self, id: ConnectionId) {
        let mut registry = self.registry.lock().await;
        registry.evict(id);
        tracing::info!(
            connections = registry.connections.len(),
            "client disconnected"
        );
    }

    /// Record a self-declared identity for a connection, displacing whichever
    /// connection previously held it. Earlier identities announced by the same
    /// connection are left in place.
    pub async fn authenticate(&self, id: ConnectionId, user_id: String) {
        let mut registry = self.registry.lock().await;
        if !registry.connections.contains_key(&id) {
            // The session died between reading the frame and getting here.
            return;
        }
        tracing::info!(user_id = %user_id, "client identified");
        registry.identities.insert(user_id, id);
    }

    /// Enqueue a payload for delivery to every live connection. Never blocks;
    /// ordering is fixed at enqueue time.
    pub fn queue_broadcast(&self, message: String) {
        // The receiver lives for the life of the hub.
        let _ = self.broadcast_tx.send(message);
    }

    /// Drain the broadcast queue, one message at a time, writing to every live
    /// connection. The single consumer is what makes broadcast delivery order
    /// match enqueue order. Run once, from process init.
    pub async fn run_broadcast_loop(&self) {
        let Some(mut rx) = self.broadcast_rx.lock().await.take() else {
            tracing::warn!("broadcast loop is already running");
            return;
        };

        tracing::info!("broadcast loop started");
        while let Some(message) = rx.recv().await {
            let mut registry = self.registry.lock().await;
            let dead: Vec<ConnectionId> = registry
                .connections
                .iter()
                .filter(|(_, sender)| sender.send(message.clone()).is_err())
                .map(|(id, _)| *id)
                .collect();

            for id in dead {
                tracing::warn!("dropping unreachable client");
                registry.evict(id);
            }
        }
    }

    /// Deliver a payload to the connection registered under `user_id`.
    ///
    /// An unknown identity is not an error: there is no queuing or retry, the
    /// payload is simply dropped. A write failure evicts the connection and is
    /// returned to the caller.
    pub async fn send_to_user(&self, user_id: &str, payload: String) -> Result<(), AppError> {
        let mut registry = self.registry.lock().await;

        let Some(&id) = registry.identities.get(user_id) else {
            tracing::debug!(user_id = %user_id, "user not connected, dropping message");
            return Ok(());
        };

        let delivered = registry
            .connections
            .get(&id)
            .map(|sender| sender.send(payload).is_ok())
            .unwrap_or(false);

        if delivered {
            return Ok(());
        }

        registry.evict(id);
        Err(AppError::Delivery(format!(
            "connection for user {user_id} is gone"
        )))
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.lock().await.connections.len()
    }

    pub async fn identified_count(&self) -> usize {
        self.registry.lock().await.identities.len()
    }

    pub async fn is_user_connected(&self, user_id: &str) -> bool {
        self.registry.lock().await.identities.contains_key(user_id)
    }
}
