use crate::models::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod broadcast;
pub mod message_types;
pub mod presence;
pub mod router;
pub mod session;

/// Unique identifier for one physical WebSocket connection
///
/// Used to tell a replaced connection apart from the one that replaced it,
/// so a late close never evicts the newer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Item queued for a connection's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(String),
    Close,
}

/// Sending half of a live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    sender: UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiver its connection drains
    pub fn channel() -> (Self, UnboundedReceiver<Outbound>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                sender: tx,
            },
            rx,
        )
    }

    /// Queue a text frame; false when the connection is gone
    pub fn send(&self, frame: String) -> bool {
        self.sender.send(Outbound::Frame(frame)).is_ok()
    }

    /// Ask the connection to close after its queued frames
    pub fn close(&self) -> bool {
        self.sender.send(Outbound::Close).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Process-wide map from authenticated user to their live connection
///
/// Holds at most one entry per user. A newer connection for the same user
/// replaces the older entry; the older connection stays open but is no
/// longer reachable through the registry.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle`, returning the entry it replaced
    pub async fn set(&self, user_id: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut guard = self.inner.write().await;
        let previous = guard.insert(user_id, handle);
        if let Some(prev) = &previous {
            tracing::debug!(user_id, replaced = %prev.id, "connection replaced in registry");
        }
        previous
    }

    pub async fn get(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.inner.read().await.get(&user_id).cloned()
    }

    /// Remove the entry for `user_id` only if it still belongs to `connection_id`.
    ///
    /// Returns true when an entry was removed.
    pub async fn remove(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get(&user_id) {
            Some(handle) if handle.id == connection_id => {
                guard.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    /// Number of registered users (for debugging/metrics)
    pub async fn online_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
